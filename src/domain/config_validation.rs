//! Configuration validation.
//!
//! Checks every engine parameter before any engine is built. Missing keys
//! fall back to the same defaults the engine uses.

use crate::domain::engine::EngineConfig;
use crate::domain::error::EngineError;
use crate::domain::indicator::MaKind;
use crate::ports::config_port::ConfigPort;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let defaults = EngineConfig::default();
    validate_indicators(config, &defaults)?;
    validate_pattern(config, &defaults)?;
    validate_signal(config, &defaults)?;
    validate_position(config, &defaults)?;
    validate_risk(config, &defaults)?;
    validate_feed(config, &defaults)?;
    validate_venue(config)?;
    Ok(())
}

fn positive(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, EngineError> {
    let value = config.get_double(section, key, default);
    if !(value.is_finite() && value > 0.0) {
        return Err(EngineError::config_invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value)
}

fn non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, EngineError> {
    let value = config.get_double(section, key, default);
    if !(value.is_finite() && value >= 0.0) {
        return Err(EngineError::config_invalid(
            section,
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(value)
}

fn fraction(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, EngineError> {
    let value = config.get_double(section, key, default);
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::config_invalid(
            section,
            key,
            format!("{key} must be between 0 and 1"),
        ));
    }
    Ok(value)
}

fn validate_indicators(config: &dyn ConfigPort, defaults: &EngineConfig) -> Result<(), EngineError> {
    let (fast_default, slow_default) = defaults
        .crossovers
        .first()
        .map(|p| (p.fast.period as i64, p.slow.period as i64))
        .unwrap_or((20, 50));

    let fast = config.get_int("indicators", "fast_period", fast_default);
    if fast < 1 {
        return Err(EngineError::config_invalid(
            "indicators",
            "fast_period",
            "fast_period must be at least 1",
        ));
    }
    let slow = config.get_int("indicators", "slow_period", slow_default);
    if slow <= fast {
        return Err(EngineError::config_invalid(
            "indicators",
            "slow_period",
            "slow_period must be greater than fast_period",
        ));
    }

    for key in ["fast_kind", "slow_kind"] {
        if let Some(kind) = config.get_string("indicators", key) {
            if MaKind::parse(&kind).is_none() {
                return Err(EngineError::config_invalid(
                    "indicators",
                    key,
                    format!("unknown moving average kind '{kind}', expected sma or ema"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_pattern(config: &dyn ConfigPort, defaults: &EngineConfig) -> Result<(), EngineError> {
    let d = &defaults.pattern;
    let radius = config.get_int("pattern", "swing_radius", d.swing_radius as i64);
    if radius < 1 {
        return Err(EngineError::config_invalid(
            "pattern",
            "swing_radius",
            "swing_radius must be at least 1",
        ));
    }
    let window = config.get_int("pattern", "window", d.window as i64);
    if window < 4 * radius + 3 {
        return Err(EngineError::config_invalid(
            "pattern",
            "window",
            "window is too narrow to hold three swings at this swing_radius",
        ));
    }
    for (key, default) in [
        ("shoulder_tolerance", d.shoulder_tolerance),
        ("neckline_tolerance", d.neckline_tolerance),
    ] {
        let value = positive(config, "pattern", key, default)?;
        if value > 1.0 {
            return Err(EngineError::config_invalid(
                "pattern",
                key,
                format!("{key} must be in (0, 1]"),
            ));
        }
    }
    fraction(config, "pattern", "min_confidence", d.min_confidence)?;
    Ok(())
}

fn validate_signal(config: &dyn ConfigPort, defaults: &EngineConfig) -> Result<(), EngineError> {
    let d = &defaults.signal;
    fraction(config, "signal", "crossover_strength", d.crossover_strength)?;
    fraction(config, "signal", "min_entry_strength", d.min_entry_strength)?;
    fraction(config, "signal", "pullback_strength", d.pullback_strength)?;
    Ok(())
}

fn validate_position(config: &dyn ConfigPort, defaults: &EngineConfig) -> Result<(), EngineError> {
    let d = &defaults.position;
    positive(config, "position", "pip_size", d.pip_size)?;
    let stop = positive(config, "position", "stop_loss_pips", d.stop_loss_pips)?;
    non_negative(config, "position", "take_profit_pips", d.take_profit_pips)?;
    let trigger = non_negative(config, "position", "break_even_trigger_pips", d.break_even_trigger_pips)?;
    let offset = non_negative(config, "position", "break_even_offset_pips", d.break_even_offset_pips)?;
    // An offset at or past the trigger puts the stop at or beyond the price
    // that armed it.
    if config.get_bool("position", "break_even", d.break_even) && offset >= trigger {
        return Err(EngineError::config_invalid(
            "position",
            "break_even_offset_pips",
            "break_even_offset_pips must be below break_even_trigger_pips",
        ));
    }
    non_negative(config, "position", "trailing_start_pips", d.trailing_start_pips)?;
    positive(config, "position", "trailing_distance_pips", d.trailing_distance_pips)?;
    let percent = non_negative(config, "position", "trailing_percent", d.trailing_percent)?;
    if percent >= 100.0 {
        return Err(EngineError::config_invalid(
            "position",
            "trailing_percent",
            "trailing_percent must be below 100",
        ));
    }
    positive(config, "position", "risk_per_trade", d.risk_per_trade)?;
    positive(config, "position", "max_exposure", d.max_exposure)?;
    let max_distance = positive(
        config,
        "position",
        "max_stop_distance_pips",
        d.max_stop_distance_pips,
    )?;
    if stop > max_distance {
        return Err(EngineError::config_invalid(
            "position",
            "stop_loss_pips",
            "stop_loss_pips exceeds max_stop_distance_pips",
        ));
    }
    positive(config, "position", "lot_step", d.lot_step)?;
    positive(config, "position", "contract_multiplier", d.contract_multiplier)?;
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort, defaults: &EngineConfig) -> Result<(), EngineError> {
    positive(config, "risk", "daily_loss_limit", defaults.risk.daily_loss_limit)?;
    let target = non_negative(config, "risk", "daily_profit_target", 0.0)?;
    if target == 0.0 {
        positive(config, "risk", "account_balance", 10_000.0)?;
        positive(config, "risk", "daily_target_pct", 3.0)?;
    }
    Ok(())
}

fn validate_feed(config: &dyn ConfigPort, defaults: &EngineConfig) -> Result<(), EngineError> {
    let capacity = config.get_int("feed", "capacity", defaults.capacity as i64);
    let window = config.get_int("pattern", "window", defaults.pattern.window as i64);
    if capacity < window {
        return Err(EngineError::config_invalid(
            "feed",
            "capacity",
            "capacity must be at least the pattern window",
        ));
    }
    positive(config, "feed", "max_spread_pips", defaults.max_spread_pips)?;
    Ok(())
}

fn validate_venue(config: &dyn ConfigPort) -> Result<(), EngineError> {
    non_negative(config, "venue", "slippage_pct", 0.0)?;
    if config.get_string("venue", "margin_available").is_some() {
        non_negative(config, "venue", "margin_available", 0.0)?;
    }
    Ok(())
}
