use thiserror::Error;

/// Invalid analyzer configuration. Always fatal and raised before any scanning.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid threshold {name}: {value} days (must be zero or positive)")]
    NegativeAge { name: &'static str, value: i64 },

    #[error("Invalid threshold {name}: {value} days is out of range")]
    AgeOutOfRange { name: &'static str, value: i64 },

    #[error("Invalid price for {tier}: {value} (must be a finite, non-negative USD/GB-month rate)")]
    InvalidPrice { tier: String, value: f64 },

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
