//! Verification run configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};
use crate::producer::ProducerSpec;

/// Default delay between two polling rounds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default application name of the agent fleet.
pub const DEFAULT_AGENT_APP_NAME: &str = "fluentd-gcp";

/// Immutable configuration of one verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Producers whose lines must be ingested.
    pub producers: Vec<ProducerSpec>,

    /// Maximum wall-clock time of each wait call.
    #[serde(rename = "ingestion_timeout_secs", with = "duration_secs")]
    pub ingestion_timeout: Duration,

    /// Delay between polling rounds.
    #[serde(
        rename = "poll_interval_secs",
        with = "duration_secs",
        default = "default_poll_interval"
    )]
    pub poll_interval: Duration,

    /// Tolerated fraction of lost lines, in `[0, 1]`.
    pub max_allowed_lost_fraction: f64,

    /// Tolerated restart count of the most restarted agent instance.
    pub max_allowed_agent_restarts: u32,

    /// Agent application inspected by the health checks.
    #[serde(default = "default_agent_app_name")]
    pub agent_app_name: String,

    /// Whether to wait for a first sign of life before the completeness wait.
    #[serde(default = "default_require_liveness")]
    pub require_liveness: bool,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
}

fn default_agent_app_name() -> String {
    DEFAULT_AGENT_APP_NAME.to_string()
}

fn default_require_liveness() -> bool {
    true
}

/// Serde adapter for durations written as (possibly fractional) seconds.
///
/// Whole seconds serialise as integers so existing files round-trip
/// unchanged; sub-second values serialise as floats.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() == 0 {
            serializer.serialize_u64(value.as_secs())
        } else {
            serializer.serialize_f64(value.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}s: {e}")))
    }
}

impl VerificationConfig {
    pub fn new(
        producers: Vec<ProducerSpec>,
        ingestion_timeout: Duration,
        max_allowed_lost_fraction: f64,
        max_allowed_agent_restarts: u32,
    ) -> Self {
        Self {
            producers,
            ingestion_timeout,
            poll_interval: default_poll_interval(),
            max_allowed_lost_fraction,
            max_allowed_agent_restarts,
            agent_app_name: DEFAULT_AGENT_APP_NAME.to_string(),
            require_liveness: true,
        }
    }

    /// Override the delay between polling rounds.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the agent application name.
    pub fn with_agent_app_name(mut self, name: impl Into<String>) -> Self {
        self.agent_app_name = name.into();
        self
    }

    /// Skip the liveness wait.
    pub fn without_liveness(mut self) -> Self {
        self.require_liveness = false;
        self
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: &Path) -> VerifyResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sum of expected lines across every producer.
    pub fn total_expected_lines(&self) -> u64 {
        self.producers.iter().map(|p| p.expected_lines).sum()
    }

    /// Reject configurations that cannot produce a meaningful verdict.
    pub fn validate(&self) -> VerifyResult<()> {
        if self.producers.is_empty() {
            return Err(VerifyError::Config("no producers configured".to_string()));
        }

        let mut seen = HashSet::new();
        for producer in &self.producers {
            if !seen.insert(producer.name.as_str()) {
                return Err(VerifyError::Config(format!(
                    "duplicate producer name '{}'",
                    producer.name
                )));
            }
        }

        if self.total_expected_lines() == 0 {
            return Err(VerifyError::Config(
                "producers expect zero lines in total".to_string(),
            ));
        }

        let fraction = self.max_allowed_lost_fraction;
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(VerifyError::Config(format!(
                "max_allowed_lost_fraction must be within [0, 1], got {fraction}"
            )));
        }

        if self.poll_interval.is_zero() {
            return Err(VerifyError::Config(
                "poll_interval must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn producers() -> Vec<ProducerSpec> {
        vec![
            ProducerSpec::new("p0", None, 100, Duration::from_secs(60)),
            ProducerSpec::new("p1", None, 50, Duration::from_secs(60)),
        ]
    }

    #[test]
    fn test_defaults_and_totals() {
        let config = VerificationConfig::new(producers(), Duration::from_secs(600), 0.01, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.ingestion_timeout, Duration::from_secs(600));
        assert_eq!(config.total_expected_lines(), 150);
        assert_eq!(config.agent_app_name, DEFAULT_AGENT_APP_NAME);
        assert!(config.require_liveness);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_producers() {
        let config = VerificationConfig::new(vec![], Duration::from_secs(1), 0.0, 0);
        assert!(matches!(config.validate(), Err(VerifyError::Config(_))));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut specs = producers();
        specs[1].name = "p0".to_string();
        let config = VerificationConfig::new(specs, Duration::from_secs(1), 0.0, 0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate producer name 'p0'"));
    }

    #[test]
    fn test_rejects_zero_total_expected() {
        let specs = vec![ProducerSpec::new("p0", None, 0, Duration::from_secs(1))];
        let config = VerificationConfig::new(specs, Duration::from_secs(1), 0.0, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_fraction_out_of_range() {
        for fraction in [-0.1, 1.5, f64::NAN] {
            let config = VerificationConfig::new(producers(), Duration::from_secs(1), fraction, 0);
            assert!(config.validate().is_err(), "accepted {fraction}");
        }
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let config = VerificationConfig::new(producers(), Duration::from_secs(1), 0.0, 0)
            .with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "producers": [
                    {{"name": "p0", "placement": "node-a", "expected_lines": 10, "run_duration_secs": 5}}
                ],
                "ingestion_timeout_secs": 120,
                "max_allowed_lost_fraction": 0.02,
                "max_allowed_agent_restarts": 1
            }}"#
        )
        .unwrap();

        let config = VerificationConfig::from_json_file(file.path()).unwrap();
        assert_eq!(
            config.poll_interval,
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
        );
        assert_eq!(config.ingestion_timeout, Duration::from_secs(120));
        assert_eq!(config.producers[0].run_duration, Duration::from_secs(5));
        assert_eq!(config.producers[0].placement.as_ref().unwrap().as_str(), "node-a");
        assert!(config.require_liveness);
    }

    #[test]
    fn test_sub_second_durations_are_kept() {
        let config = VerificationConfig::new(
            vec![ProducerSpec::new("p0", None, 3, Duration::from_millis(1500))],
            Duration::from_millis(900),
            0.0,
            0,
        )
        .with_poll_interval(Duration::from_millis(500));

        assert_eq!(config.ingestion_timeout, Duration::from_millis(900));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.producers[0].run_duration, Duration::from_millis(1500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fractional_seconds_in_json() {
        let config: VerificationConfig = serde_json::from_str(
            r#"{
                "producers": [{"name": "p0", "expected_lines": 1, "run_duration_secs": 1.5}],
                "ingestion_timeout_secs": 0.9,
                "poll_interval_secs": 0.25,
                "max_allowed_lost_fraction": 0.0,
                "max_allowed_agent_restarts": 0
            }"#,
        )
        .unwrap();
        assert_eq!(config.ingestion_timeout, Duration::from_millis(900));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.producers[0].run_duration, Duration::from_millis(1500));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["ingestion_timeout_secs"], 0.9);
        assert_eq!(json["producers"][0]["run_duration_secs"], 1.5);

        let whole = VerificationConfig::new(producers(), Duration::from_secs(120), 0.0, 0);
        let json = serde_json::to_value(&whole).unwrap();
        assert_eq!(json["ingestion_timeout_secs"], 120);
        assert_eq!(json["poll_interval_secs"], 30);
    }

    #[test]
    fn test_negative_duration_in_json_is_rejected() {
        let parsed = serde_json::from_str::<VerificationConfig>(
            r#"{
                "producers": [{"name": "p0", "expected_lines": 1, "run_duration_secs": 1}],
                "ingestion_timeout_secs": -1,
                "max_allowed_lost_fraction": 0.0,
                "max_allowed_agent_restarts": 0
            }"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"producers": [], "ingestion_timeout_secs": 1,
                "max_allowed_lost_fraction": 0.0, "max_allowed_agent_restarts": 0}}"#
        )
        .unwrap();
        assert!(matches!(
            VerificationConfig::from_json_file(file.path()),
            Err(VerifyError::Config(_))
        ));
    }
}
