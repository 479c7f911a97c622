use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Age and size gates used by the classifier and the multipart estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub stale_age_days: i64,
    pub ia_age_days: i64,
    pub ia_min_size_bytes: u64,
    pub glacier_age_days: i64,
    pub multipart_age_days: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stale_age_days: 90,
            ia_age_days: 30,
            ia_min_size_bytes: 128 * 1024,
            glacier_age_days: 180,
            multipart_age_days: 7,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("stale_age_days", self.stale_age_days),
            ("ia_age_days", self.ia_age_days),
            ("glacier_age_days", self.glacier_age_days),
            ("multipart_age_days", self.multipart_age_days),
        ] {
            if value < 0 {
                return Err(ConfigError::NegativeAge { name, value });
            }
            if TimeDelta::try_days(value).is_none() {
                return Err(ConfigError::AgeOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// True when `age` is strictly longer than `days` whole days.
pub(crate) fn older_than(age: TimeDelta, days: i64) -> bool {
    TimeDelta::try_days(days).is_some_and(|limit| age > limit)
}

/// Whole days elapsed, floored, never negative.
pub(crate) fn age_in_days(age: TimeDelta) -> i64 {
    age.num_days().max(0)
}
