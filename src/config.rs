use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::calendar::LocalCalendar;
use crate::limits::{DEFAULT_GRANULARITY_MINUTES, MAX_UTC_OFFSET_MINUTES};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Unparsable { var: &'static str, value: String },
    #[error("UTC offset {0} minutes is out of range")]
    Offset(i32),
    #[error("slot granularity of {0} minutes must evenly divide a day")]
    Granularity(u32),
}

/// Host-facing settings, read from `BARBER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub utc_offset_minutes: i32,
    pub granularity_minutes: u32,
    /// Journal appends between compactions.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    /// Base of the link in confirmation messages; the token is appended as `?token=`.
    pub cancellation_url: String,
    /// `tracing` filter directive.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            utc_offset_minutes: 0,
            granularity_minutes: DEFAULT_GRANULARITY_MINUTES,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
            cancellation_url: "http://localhost:5173/cancelar-cita".into(),
            log_filter: "info".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset variables take defaults;
    /// tuning knobs that fail to parse fall back too, but the calendar
    /// settings must parse and validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            data_dir: lookup("BARBER_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            utc_offset_minutes: strict(&lookup, "BARBER_UTC_OFFSET_MINUTES")?
                .unwrap_or(defaults.utc_offset_minutes),
            granularity_minutes: strict(&lookup, "BARBER_SLOT_GRANULARITY")?
                .unwrap_or(defaults.granularity_minutes),
            compact_threshold: lookup("BARBER_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            compact_interval: lookup("BARBER_COMPACT_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .map_or(defaults.compact_interval, Duration::from_secs),
            cancellation_url: lookup("BARBER_CANCELLATION_URL").unwrap_or(defaults.cancellation_url),
            log_filter: lookup("BARBER_LOG").unwrap_or(defaults.log_filter),
        };
        config.calendar()?;
        Ok(config)
    }

    pub fn calendar(&self) -> Result<LocalCalendar, ConfigError> {
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Offset(self.utc_offset_minutes));
        }
        LocalCalendar::new(self.utc_offset_minutes, self.granularity_minutes)
            .ok_or(ConfigError::Granularity(self.granularity_minutes))
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("appointments.wal")
    }
}

fn strict<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Unparsable { var, value }),
    }
}
