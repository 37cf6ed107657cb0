//! Model parameters.
//!
//! Rates are events per minute; durations are minutes. The baseline values
//! are the ones the call-center study was run with.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Error;

pub const BASELINE_SEED: u64 = 978;
pub const BASELINE_CUSTOMERS: usize = 1000;
pub const INTERARRIVAL_MEAN: f64 = 14.3;
pub const FRONTDESK_SERVICE_MEAN: f64 = 7.2;
pub const FRONTDESK_SERVICE_VARIANCE: f64 = 2.7;
pub const EXPERT_SERVICE_MEAN: f64 = 10.2;
pub const RENEGING_MEAN: f64 = 60.0;
pub const BREAK_MEAN: f64 = 60.0;
pub const BREAK_DURATION: f64 = 3.0;

/// Front-desk service time, given by the mean and variance of the
/// log-normal service duration itself (not of its logarithm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontdeskService {
    pub mean: f64,
    pub variance: f64,
}

/// Expert breaks: one every `Exp(rate)` minutes, each lasting `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakConfig {
    pub rate: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallCenterConfig {
    pub seed: u64,
    /// Completed customers after which the run winds down.
    pub target_count: usize,
    pub interarrival_rate: f64,
    pub frontdesk: FrontdeskService,
    pub expert_service_rate: f64,
    /// Rate of the exponential patience of customers queued for the expert.
    pub reneging_rate: f64,
    /// `None` disables the break process.
    #[serde(default)]
    pub breaks: Option<BreakConfig>,
    #[serde(default = "single_server")]
    pub frontdesk_capacity: usize,
    #[serde(default = "single_server")]
    pub expert_capacity: usize,
}

fn single_server() -> usize {
    1
}

impl Default for CallCenterConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

impl CallCenterConfig {
    pub fn baseline() -> Self {
        CallCenterConfig {
            seed: BASELINE_SEED,
            target_count: BASELINE_CUSTOMERS,
            interarrival_rate: 1.0 / INTERARRIVAL_MEAN,
            frontdesk: FrontdeskService {
                mean: FRONTDESK_SERVICE_MEAN,
                variance: FRONTDESK_SERVICE_VARIANCE,
            },
            expert_service_rate: 1.0 / EXPERT_SERVICE_MEAN,
            reneging_rate: 1.0 / RENEGING_MEAN,
            breaks: Some(BreakConfig {
                rate: 1.0 / BREAK_MEAN,
                duration: BREAK_DURATION,
            }),
            frontdesk_capacity: 1,
            expert_capacity: 1,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_target_count(mut self, target_count: usize) -> Self {
        self.target_count = target_count;
        self
    }

    pub fn without_breaks(mut self) -> Self {
        self.breaks = None;
        self
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: CallCenterConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject parameters no run can be built from.
    pub fn validate(&self) -> Result<(), Error> {
        if self.target_count < 1 {
            return Err(Error::InvalidConfiguration(
                "target_count must be at least 1".to_string(),
            ));
        }
        positive("interarrival_rate", self.interarrival_rate)?;
        positive("frontdesk.mean", self.frontdesk.mean)?;
        positive("frontdesk.variance", self.frontdesk.variance)?;
        positive("expert_service_rate", self.expert_service_rate)?;
        positive("reneging_rate", self.reneging_rate)?;
        if let Some(breaks) = &self.breaks {
            positive("breaks.rate", breaks.rate)?;
            positive("breaks.duration", breaks.duration)?;
        }
        if self.frontdesk_capacity < 1 || self.expert_capacity < 1 {
            return Err(Error::InvalidConfiguration(
                "server capacities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "{name} must be a positive finite number, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_is_valid() {
        let config = CallCenterConfig::baseline();
        config.validate().unwrap();
        assert_eq!(config.seed, 978);
        assert_eq!(config.target_count, 1000);
        assert_eq!(config.breaks.map(|b| b.duration), Some(3.0));
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        let mut config = CallCenterConfig::baseline();
        config.interarrival_rate = 0.0;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));

        let mut config = CallCenterConfig::baseline();
        config.reneging_rate = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_target_and_zero_capacity_are_rejected() {
        assert!(CallCenterConfig::baseline().with_target_count(0).validate().is_err());

        let mut config = CallCenterConfig::baseline();
        config.expert_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn breaks_are_only_checked_when_enabled() {
        let mut config = CallCenterConfig::baseline();
        config.breaks = Some(BreakConfig {
            rate: 0.0,
            duration: 3.0,
        });
        assert!(config.validate().is_err());
        assert!(config.without_breaks().validate().is_ok());
    }

    #[test]
    fn parses_toml_with_defaults() {
        let text = r#"
            seed = 7
            target_count = 50
            interarrival_rate = 0.1
            expert_service_rate = 0.2
            reneging_rate = 0.05

            [frontdesk]
            mean = 5.0
            variance = 1.0
        "#;

        let config = CallCenterConfig::from_toml_str(text).unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.target_count, 50);
        assert_eq!(config.breaks, None);
        assert_eq!(config.frontdesk_capacity, 1);
        assert_eq!(config.expert_capacity, 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = r#"
            seed = 7
            target_count = 50
            interarrival_rate = 0.1
            expert_service_rate = 0.2
            reneging_rate = 0.05
            servers = 3

            [frontdesk]
            mean = 5.0
            variance = 1.0
        "#;
        assert!(matches!(
            CallCenterConfig::from_toml_str(text),
            Err(Error::ConfigParse(_))
        ));
    }
}
