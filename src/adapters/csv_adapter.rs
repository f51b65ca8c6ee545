//! CSV file market-data adapter.
//!
//! One file per instrument, `<instrument>.csv`, with a header row and the
//! columns `timestamp,open,high,low,close,volume[,spread]`.

use crate::domain::bar::Bar;
use crate::domain::error::EngineError;
use crate::ports::data_port::MarketDataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{instrument}.csv"))
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, EngineError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|e| EngineError::Data {
            reason: format!("invalid timestamp '{value}': {e}"),
        })
}

fn field<T>(record: &csv::StringRecord, index: usize, name: &str, line: u64) -> Result<T, EngineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    record
        .get(index)
        .ok_or_else(|| EngineError::Data {
            reason: format!("line {line}: missing {name} column"),
        })?
        .trim()
        .parse()
        .map_err(|e| EngineError::Data {
            reason: format!("line {line}: invalid {name} value: {e}"),
        })
}

impl MarketDataPort for CsvAdapter {
    fn fetch_bars(&self, instrument: &str) -> Result<Vec<Bar>, EngineError> {
        let path = self.csv_path(instrument);
        let content = fs::read_to_string(&path).map_err(|e| EngineError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| EngineError::Data {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let line = record.position().map_or(0, |p| p.line());

            let timestamp = parse_timestamp(record.get(0).unwrap_or_default())?;
            let open: f64 = field(&record, 1, "open", line)?;
            let high: f64 = field(&record, 2, "high", line)?;
            let low: f64 = field(&record, 3, "low", line)?;
            let close: f64 = field(&record, 4, "close", line)?;
            // Some feeds export tick volume as a float.
            let volume = field::<i64>(&record, 5, "volume", line)
                .or_else(|_| field::<f64>(&record, 5, "volume", line).map(|v| v as i64))?;
            let spread = match record.get(6).map(str::trim) {
                None | Some("") => None,
                Some(_) => Some(field::<f64>(&record, 6, "spread", line)?),
            };

            if high < low {
                return Err(EngineError::Data {
                    reason: format!("line {line}: high {high} below low {low}"),
                });
            }

            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
                spread,
            });
        }

        // Row order is kept; the engine rejects out-of-order bars itself.
        Ok(bars)
    }

    fn list_instruments(&self) -> Result<Vec<String>, EngineError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| EngineError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut instruments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            if let Some(instrument) = name.to_string_lossy().strip_suffix(".csv") {
                instruments.push(instrument.to_string());
            }
        }

        instruments.sort();
        Ok(instruments)
    }
}
