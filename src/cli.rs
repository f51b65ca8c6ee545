//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_venue::{PaperVenue, PaperVenueConfig};
use crate::domain::bar::Bar;
use crate::domain::config_validation::validate_engine_config;
use crate::domain::engine::EngineConfig;
use crate::domain::error::EngineError;
use crate::domain::indicator::crossover::CrossoverPair;
use crate::domain::indicator::{MaKind, MaSpec};
use crate::domain::intent::Intent;
use crate::domain::pattern::PatternConfig;
use crate::domain::position_manager::PositionConfig;
use crate::domain::risk::RiskLimits;
use crate::domain::session::TradingSession;
use crate::domain::signal::SignalConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::execution_port::{ExecutionPort, SessionContext};

#[derive(Parser, Debug)]
#[command(name = "futurebreakout", about = "Bar-driven trading decision engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay CSV bars through the engine against a paper venue
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data_dir: PathBuf,
        /// Instruments to replay; defaults to every CSV in the data directory
        #[arg(short, long)]
        instrument: Vec<String>,
    },
    /// Validate an engine configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Replay {
            config,
            data_dir,
            instrument,
        } => run_replay(&config, &data_dir, &instrument),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn ma_spec(
    adapter: &dyn ConfigPort,
    period_key: &str,
    kind_key: &str,
    default: MaSpec,
) -> Result<MaSpec, EngineError> {
    let period = adapter.get_int("indicators", period_key, default.period as i64);
    let period = usize::try_from(period)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| EngineError::config_invalid("indicators", period_key, "period must be at least 1"))?;
    let kind = match adapter.get_string("indicators", kind_key) {
        None => default.kind,
        Some(s) => MaKind::parse(&s).ok_or_else(|| {
            EngineError::config_invalid("indicators", kind_key, format!("unknown kind '{s}'"))
        })?,
    };
    Ok(MaSpec { period, kind })
}

fn count(adapter: &dyn ConfigPort, section: &str, key: &str, default: usize) -> Result<usize, EngineError> {
    usize::try_from(adapter.get_int(section, key, default as i64))
        .map_err(|_| EngineError::config_invalid(section, key, format!("{key} must be non-negative")))
}

/// Assembles the read-only engine parameters. Missing keys take defaults.
pub fn build_engine_config(adapter: &dyn ConfigPort) -> Result<EngineConfig, EngineError> {
    let d = EngineConfig::default();
    let default_pair = d.crossovers.first().copied().unwrap_or(CrossoverPair {
        fast: MaSpec::sma(20),
        slow: MaSpec::sma(50),
    });
    let fast = ma_spec(adapter, "fast_period", "fast_kind", default_pair.fast)?;
    let slow = ma_spec(adapter, "slow_period", "slow_kind", default_pair.slow)?;

    let pattern = PatternConfig {
        window: count(adapter, "pattern", "window", d.pattern.window)?,
        swing_radius: count(adapter, "pattern", "swing_radius", d.pattern.swing_radius)?,
        shoulder_tolerance: adapter.get_double("pattern", "shoulder_tolerance", d.pattern.shoulder_tolerance),
        neckline_tolerance: adapter.get_double("pattern", "neckline_tolerance", d.pattern.neckline_tolerance),
        min_confidence: adapter.get_double("pattern", "min_confidence", d.pattern.min_confidence),
    };

    let signal = SignalConfig {
        crossover_strength: adapter.get_double("signal", "crossover_strength", d.signal.crossover_strength),
        min_entry_strength: adapter.get_double("signal", "min_entry_strength", d.signal.min_entry_strength),
        pullback_entries: adapter.get_bool("signal", "pullback_entries", d.signal.pullback_entries),
        pullback_strength: adapter.get_double("signal", "pullback_strength", d.signal.pullback_strength),
    };

    let p = &d.position;
    let position = PositionConfig {
        pip_size: adapter.get_double("position", "pip_size", p.pip_size),
        stop_loss_pips: adapter.get_double("position", "stop_loss_pips", p.stop_loss_pips),
        take_profit_pips: adapter.get_double("position", "take_profit_pips", p.take_profit_pips),
        break_even: adapter.get_bool("position", "break_even", p.break_even),
        break_even_trigger_pips: adapter.get_double("position", "break_even_trigger_pips", p.break_even_trigger_pips),
        break_even_offset_pips: adapter.get_double("position", "break_even_offset_pips", p.break_even_offset_pips),
        trailing: adapter.get_bool("position", "trailing", p.trailing),
        trailing_start_pips: adapter.get_double("position", "trailing_start_pips", p.trailing_start_pips),
        trailing_distance_pips: adapter.get_double("position", "trailing_distance_pips", p.trailing_distance_pips),
        trailing_percent: adapter.get_double("position", "trailing_percent", p.trailing_percent),
        risk_per_trade: adapter.get_double("position", "risk_per_trade", p.risk_per_trade),
        max_exposure: adapter.get_double("position", "max_exposure", p.max_exposure),
        max_stop_distance_pips: adapter.get_double("position", "max_stop_distance_pips", p.max_stop_distance_pips),
        lot_step: adapter.get_double("position", "lot_step", p.lot_step),
        contract_multiplier: adapter.get_double("position", "contract_multiplier", p.contract_multiplier),
    };

    let explicit_target = adapter.get_double("risk", "daily_profit_target", 0.0);
    let daily_profit_target = if explicit_target > 0.0 {
        explicit_target
    } else {
        RiskLimits::target_from_balance(
            adapter.get_double("risk", "account_balance", 10_000.0),
            adapter.get_double("risk", "daily_target_pct", 3.0),
        )
    };
    let risk = RiskLimits {
        daily_loss_limit: adapter.get_double("risk", "daily_loss_limit", d.risk.daily_loss_limit),
        daily_profit_target,
        stop_on_target: adapter.get_bool("risk", "stop_on_target", d.risk.stop_on_target),
    };

    Ok(EngineConfig {
        capacity: count(adapter, "feed", "capacity", d.capacity)?,
        crossovers: vec![CrossoverPair { fast, slow }],
        cross_on_ready: adapter.get_bool("indicators", "cross_on_ready", d.cross_on_ready),
        pattern,
        signal,
        position,
        risk,
        max_spread_pips: adapter.get_double("feed", "max_spread_pips", d.max_spread_pips),
    })
}

pub fn build_venue_config(adapter: &dyn ConfigPort, engine: &EngineConfig) -> PaperVenueConfig {
    PaperVenueConfig {
        slippage_pct: adapter.get_double("venue", "slippage_pct", 0.0),
        margin_available: adapter
            .get_string("venue", "margin_available")
            .map(|_| adapter.get_double("venue", "margin_available", f64::INFINITY)),
        contract_multiplier: engine.position.contract_multiplier,
    }
}

pub fn build_session_context(adapter: &dyn ConfigPort) -> SessionContext {
    SessionContext {
        account: adapter.get_string("venue", "account"),
        server: adapter.get_string("venue", "server"),
    }
}

/// Interleaves several feeds by the timestamp of each feed's next bar. Ties
/// go to the instrument that sorts first, so replays are reproducible.
/// Each feed keeps its own row order; a row that goes back in time reaches
/// the session as-is and is rejected there.
pub fn merge_feeds(feeds: Vec<(String, Vec<Bar>)>) -> Vec<(String, Bar)> {
    let mut feeds: Vec<(String, VecDeque<Bar>)> = feeds
        .into_iter()
        .map(|(instrument, bars)| (instrument, bars.into()))
        .collect();
    feeds.sort_by(|a, b| a.0.cmp(&b.0));

    let mut merged = Vec::with_capacity(feeds.iter().map(|(_, bars)| bars.len()).sum());
    while let Some(slot) = feeds
        .iter()
        .enumerate()
        .filter_map(|(slot, (_, bars))| bars.front().map(|b| (slot, b.timestamp)))
        .min_by_key(|&(_, timestamp)| timestamp)
        .map(|(slot, _)| slot)
    {
        let (instrument, bars) = &mut feeds[slot];
        if let Some(bar) = bars.pop_front() {
            merged.push((instrument.clone(), bar));
        }
    }
    merged
}

/// Hands intents to the venue and feeds its events back into the session
/// until nothing is left in flight. Every submitted intent is printed.
pub fn dispatch(
    session: &mut TradingSession,
    venue: &mut dyn ExecutionPort,
    intents: Vec<Intent>,
) -> Vec<Intent> {
    let mut submitted = Vec::new();
    let mut queue: VecDeque<Intent> = intents.into();
    while let Some(intent) = queue.pop_front() {
        if let Err(e) = venue.submit(&intent) {
            tracing::warn!(intent = %intent.id, error = %e, "submit failed");
            continue;
        }
        submitted.push(intent);
        for (instrument, event) in venue.drain_events() {
            match session.on_event(&instrument, &event) {
                Ok(more) => queue.extend(more),
                Err(e) => tracing::warn!(%instrument, error = %e, "execution event"),
            }
        }
    }
    submitted
}

fn run_replay(config_path: &PathBuf, data_dir: &PathBuf, instruments: &[String]) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_engine_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let engine_config = match build_engine_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let data = CsvAdapter::new(data_dir.clone());
    let instruments = if instruments.is_empty() {
        match data.list_instruments() {
            Ok(found) => found,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    } else {
        instruments.to_vec()
    };
    if instruments.is_empty() {
        let err = EngineError::Data {
            reason: format!("no instruments found in {}", data_dir.display()),
        };
        eprintln!("error: {err}");
        return (&err).into();
    }

    let mut feeds = Vec::with_capacity(instruments.len());
    for instrument in &instruments {
        match data.fetch_bars(instrument) {
            Ok(bars) => {
                eprintln!("Loaded {} bars for {}", bars.len(), instrument);
                feeds.push((instrument.clone(), bars));
            }
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }
    let stream = merge_feeds(feeds);

    let mut session = TradingSession::new(engine_config.clone(), instruments.iter().cloned());
    let mut venue = PaperVenue::new(
        build_session_context(&adapter),
        build_venue_config(&adapter, &engine_config),
    );
    tracing::info!(
        instruments = instruments.len(),
        bars = stream.len(),
        account = ?venue.context().account,
        "replay started"
    );

    let mut rejected_bars = 0usize;
    for (instrument, bar) in stream {
        match session.on_bar(&instrument, bar) {
            Ok(intents) => {
                for intent in dispatch(&mut session, &mut venue, intents) {
                    println!("{intent}");
                }
            }
            Err(e) => {
                rejected_bars += 1;
                tracing::warn!(%instrument, error = %e, "bar rejected");
            }
        }
    }

    print_summary(&session, &venue, rejected_bars);
    ExitCode::SUCCESS
}

fn print_summary(session: &TradingSession, venue: &PaperVenue, rejected_bars: usize) {
    eprintln!("\n=== Replay Summary ===");
    eprintln!(
        "{:<12} {:>7} {:>6} {:>12} {:>6}",
        "Instrument", "Trades", "Wins", "Realized", "Open"
    );
    let mut total = 0.0;
    for name in session.instruments() {
        let Some(engine) = session.engine(name) else {
            continue;
        };
        let trades = engine.positions().closed_trades();
        let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
        let realized = engine.positions().realized_pnl();
        total += realized;
        eprintln!(
            "{:<12} {:>7} {:>6} {:>12.2} {:>6}",
            name,
            trades.len(),
            wins,
            realized,
            engine.positions().positions().len()
        );
    }
    eprintln!("Total realized: {total:.2}");
    eprintln!(
        "Intents submitted: {}, rejected by venue: {}, bars rejected: {}",
        venue.submitted(),
        venue.rejected(),
        rejected_bars
    );
    if session.risk().is_halted() {
        eprintln!("Trading halted for the day");
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_engine_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let config = match build_engine_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    for pair in &config.crossovers {
        eprintln!("  Crossover:  {} / {}", pair.fast, pair.slow);
    }
    eprintln!(
        "  Pattern:    window {} radius {} shoulder {:.2} neckline {:.2} min confidence {:.2}",
        config.pattern.window,
        config.pattern.swing_radius,
        config.pattern.shoulder_tolerance,
        config.pattern.neckline_tolerance,
        config.pattern.min_confidence
    );
    eprintln!(
        "  Position:   stop {} pips, target {} pips, risk {:.2} per trade",
        config.position.stop_loss_pips, config.position.take_profit_pips, config.position.risk_per_trade
    );
    eprintln!(
        "  Risk:       loss limit {:.2}, profit target {:.2}{}",
        config.risk.daily_loss_limit,
        config.risk.daily_profit_target,
        if config.risk.stop_on_target { " (halts)" } else { "" }
    );
    eprintln!("Config is valid.");
    ExitCode::SUCCESS
}
