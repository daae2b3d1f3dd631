//! Configuration management for the governance orchestrator.
//!
//! Sources are layered in this order, later ones winning:
//! 1. Built-in defaults
//! 2. `config/orchestrator.{yaml,toml,json}` (optional) or an explicit file
//! 3. `GOVERNANCE__*` environment variables, `__` separating sections
//!    (e.g. `GOVERNANCE__SERVER__PORT=9090`)
//!
//! ```rust,ignore
//! use governance_orchestrator::config::OrchestratorConfig;
//!
//! let config = OrchestratorConfig::load(None)?;
//! ```

pub mod error;

pub use error::{ConfigResult, ConfigurationError};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GOVERNANCE";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Remote service endpoints.
    #[serde(default)]
    pub services: ServicesConfig,
    /// Pipeline execution tuning.
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    /// Health scoring baselines.
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Execution history retention.
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OrchestratorConfig {
    /// Load and validate configuration.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let config = Self::load_unchecked(path)?;

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;

        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked(path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/orchestrator").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check every section and report all problems at once.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigurationError::invalid(
                "server.port must not be 0",
                "Set GOVERNANCE__SERVER__PORT to a free TCP port, e.g. 8080",
            ));
        }
        if self.server.timeout_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "server.timeout_secs must be positive",
                "Set GOVERNANCE__SERVER__TIMEOUT_SECS, e.g. 60",
            ));
        }

        for (name, value) in [
            ("classification_url", &self.services.classification_url),
            ("ml_url", &self.services.ml_url),
            ("ai_url", &self.services.ai_url),
        ] {
            let env_var = format!("{ENV_PREFIX}__SERVICES__{}", name.to_uppercase());
            if value.trim().is_empty() {
                errors.push(ConfigurationError::missing_required(
                    format!("services.{name}"),
                    "Calling the remote governance services",
                    env_var,
                ));
            } else if let Err(e) = url::Url::parse(value) {
                errors.push(ConfigurationError::invalid(
                    format!("services.{name} '{value}' is not a valid URL: {e}"),
                    format!("Set {env_var} to an absolute URL such as http://host:8080"),
                ));
            }
        }

        if self.execution.real_time_timeout_secs == 0 || self.execution.batch_timeout_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "execution timeouts must be positive",
                "Set GOVERNANCE__EXECUTION__REAL_TIME_TIMEOUT_SECS and \
                 GOVERNANCE__EXECUTION__BATCH_TIMEOUT_SECS to values above 0",
            ));
        } else if self.execution.real_time_timeout_secs > self.execution.batch_timeout_secs {
            errors.push(ConfigurationError::incompatible(
                format!(
                    "execution.real_time_timeout_secs={}",
                    self.execution.real_time_timeout_secs
                ),
                format!(
                    "execution.batch_timeout_secs={}",
                    self.execution.batch_timeout_secs
                ),
                "Real-time classification must not wait longer than batch classification",
            ));
        }
        if self.execution.sample_floor > self.execution.sample_ceiling {
            errors.push(ConfigurationError::incompatible(
                format!("execution.sample_floor={}", self.execution.sample_floor),
                format!("execution.sample_ceiling={}", self.execution.sample_ceiling),
                "The sampling floor must not exceed the ceiling",
            ));
        }
        if !(self.execution.sample_ratio > 0.0 && self.execution.sample_ratio <= 1.0) {
            errors.push(ConfigurationError::invalid(
                format!(
                    "execution.sample_ratio is {}",
                    self.execution.sample_ratio
                ),
                "Set GOVERNANCE__EXECUTION__SAMPLE_RATIO to a value in (0, 1]",
            ));
        }

        if !(self.validation.capacity_ratio > 0.0 && self.validation.capacity_ratio <= 1.0) {
            errors.push(ConfigurationError::invalid(
                format!(
                    "validation.capacity_ratio is {}",
                    self.validation.capacity_ratio
                ),
                "Set GOVERNANCE__VALIDATION__CAPACITY_RATIO to a value in (0, 1]",
            ));
        }

        for (name, value) in [
            ("v1_accuracy", self.consensus.v1_accuracy),
            ("v2_accuracy", self.consensus.v2_accuracy),
            ("v3_accuracy", self.consensus.v3_accuracy),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ConfigurationError::invalid(
                    format!("consensus.{name} is {value}"),
                    format!(
                        "Set {ENV_PREFIX}__CONSENSUS__{} between 0 and 1",
                        name.to_uppercase()
                    ),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.optimizer.headroom) {
            errors.push(ConfigurationError::invalid(
                format!("optimizer.headroom is {}", self.optimizer.headroom),
                "Set GOVERNANCE__OPTIMIZER__HEADROOM to a value between 0 and 1",
            ));
        }

        if self.retention.max_entries == 0 {
            errors.push(ConfigurationError::invalid(
                "retention.max_entries must be positive",
                "Set GOVERNANCE__RETENTION__MAX_ENTRIES, e.g. 1000",
            ));
        }
        if self.retention.prune_interval_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "retention.prune_interval_secs must be positive",
                "Set GOVERNANCE__RETENTION__PRUNE_INTERVAL_SECS, e.g. 300",
            ));
        }

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            errors.push(ConfigurationError::invalid(
                format!("logging.level '{}' is unknown", self.logging.level),
                "Use one of: trace, debug, info, warn, error",
            ));
        }

        ConfigurationError::collect(errors)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Remote service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Classification service, which also serves platform telemetry.
    #[serde(default = "default_classification_url")]
    pub classification_url: String,
    #[serde(default = "default_ml_url")]
    pub ml_url: String,
    #[serde(default = "default_ai_url")]
    pub ai_url: String,
    /// Bearer token sent to every service.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Default per-request timeout in seconds.
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

fn default_classification_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_ml_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_ai_url() -> String {
    "http://localhost:8083".to_string()
}

fn default_service_timeout() -> u64 {
    30
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            classification_url: default_classification_url(),
            ml_url: default_ml_url(),
            ai_url: default_ai_url(),
            api_key: None,
            timeout_secs: default_service_timeout(),
        }
    }
}

/// Pipeline execution tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Classify timeout for real-time workflows.
    #[serde(default = "default_real_time_timeout")]
    pub real_time_timeout_secs: u64,
    /// Classify timeout for batch workflows.
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
    /// Memory budget for one classification batch, in megabytes.
    #[serde(default = "default_memory_budget")]
    pub memory_budget_mb: u64,
    /// Datasets larger than this are sampled.
    #[serde(default = "default_sampling_threshold")]
    pub sampling_threshold: usize,
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,
    #[serde(default = "default_sample_floor")]
    pub sample_floor: usize,
    #[serde(default = "default_sample_ceiling")]
    pub sample_ceiling: usize,
    /// Record field used to stratify samples.
    #[serde(default = "default_stratify_field")]
    pub stratify_field: String,
}

fn default_real_time_timeout() -> u64 {
    30
}

fn default_batch_timeout() -> u64 {
    300
}

fn default_memory_budget() -> u64 {
    512
}

fn default_sampling_threshold() -> usize {
    10_000
}

fn default_sample_ratio() -> f64 {
    0.1
}

fn default_sample_floor() -> usize {
    1_000
}

fn default_sample_ceiling() -> usize {
    50_000
}

fn default_stratify_field() -> String {
    "category".to_string()
}

impl ExecutionConfig {
    /// Remote classify timeout for the given mode.
    #[must_use]
    pub fn classify_timeout(&self, real_time: bool) -> Duration {
        if real_time {
            Duration::from_secs(self.real_time_timeout_secs)
        } else {
            Duration::from_secs(self.batch_timeout_secs)
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            real_time_timeout_secs: default_real_time_timeout(),
            batch_timeout_secs: default_batch_timeout(),
            memory_budget_mb: default_memory_budget(),
            sampling_threshold: default_sampling_threshold(),
            sample_ratio: default_sample_ratio(),
            sample_floor: default_sample_floor(),
            sample_ceiling: default_sample_ceiling(),
            stratify_field: default_stratify_field(),
        }
    }
}

/// Pre-flight validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Rules estimated above this cost produce a warning.
    #[serde(default = "default_max_rule_cost")]
    pub max_rule_cost: f64,
    /// Allowed distance between the requested and historical quality threshold.
    #[serde(default = "default_quality_drift_tolerance")]
    pub quality_drift_tolerance: f64,
    /// Share of available capacity a workflow may claim.
    #[serde(default = "default_capacity_ratio")]
    pub capacity_ratio: f64,
}

fn default_max_rule_cost() -> f64 {
    100.0
}

fn default_quality_drift_tolerance() -> f64 {
    0.2
}

fn default_capacity_ratio() -> f64 {
    0.8
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_rule_cost: default_max_rule_cost(),
            quality_drift_tolerance: default_quality_drift_tolerance(),
            capacity_ratio: default_capacity_ratio(),
        }
    }
}

/// Per-version accuracies used by weighted consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_v1_accuracy")]
    pub v1_accuracy: f64,
    #[serde(default = "default_v2_accuracy")]
    pub v2_accuracy: f64,
    #[serde(default = "default_v3_accuracy")]
    pub v3_accuracy: f64,
}

fn default_v1_accuracy() -> f64 {
    0.85
}

fn default_v2_accuracy() -> f64 {
    0.9
}

fn default_v3_accuracy() -> f64 {
    0.88
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            v1_accuracy: default_v1_accuracy(),
            v2_accuracy: default_v2_accuracy(),
            v3_accuracy: default_v3_accuracy(),
        }
    }
}

/// Baselines for health scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Response time at which the performance score reaches zero.
    #[serde(default = "default_max_response_time")]
    pub max_response_time_ms: f64,
    /// Error rate at which the performance score reaches zero.
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
    /// Throughput that earns a full score.
    #[serde(default = "default_target_throughput")]
    pub target_throughput: f64,
    /// CPU utilization (percent) scoring highest.
    #[serde(default = "default_cpu_peak")]
    pub cpu_peak: f64,
    /// Memory utilization (percent) scoring highest.
    #[serde(default = "default_memory_peak")]
    pub memory_peak: f64,
}

fn default_max_response_time() -> f64 {
    5_000.0
}

fn default_max_error_rate() -> f64 {
    0.10
}

fn default_target_throughput() -> f64 {
    1_000.0
}

fn default_cpu_peak() -> f64 {
    70.0
}

fn default_memory_peak() -> f64 {
    80.0
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_response_time_ms: default_max_response_time(),
            max_error_rate: default_max_error_rate(),
            target_throughput: default_target_throughput(),
            cpu_peak: default_cpu_peak(),
            memory_peak: default_memory_peak(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Spare capacity kept above predicted peak utilization.
    #[serde(default = "default_headroom")]
    pub headroom: f64,
}

fn default_headroom() -> f64 {
    0.2
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            headroom: default_headroom(),
        }
    }
}

/// Execution history retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Finished executions older than this are pruned.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

fn default_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_max_entries() -> usize {
    1_000
}

fn default_prune_interval() -> u64 {
    300
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            max_entries: default_max_entries(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.real_time_timeout_secs, 30);
        assert_eq!(config.execution.batch_timeout_secs, 300);
        assert!((config.optimizer.headroom - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_aggregates_problems() {
        let mut config = OrchestratorConfig::default();
        config.server.port = 0;
        config.optimizer.headroom = 1.5;
        config.services.ml_url = "not a url".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(err.count(), 3);
        let msg = err.to_string();
        assert!(msg.contains("server.port"));
        assert!(msg.contains("GOVERNANCE__SERVICES__ML_URL"));
    }

    #[test]
    fn test_validate_timeout_ordering() {
        let mut config = OrchestratorConfig::default();
        config.execution.real_time_timeout_secs = 600;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::Incompatible { .. }));
    }

    #[test]
    fn test_classify_timeout() {
        let config = ExecutionConfig::default();
        assert_eq!(config.classify_timeout(true), Duration::from_secs(30));
        assert_eq!(config.classify_timeout(false), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_value(serde_json::json!({"server": {"port": 9090}})).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.retention.max_entries, 1_000);
    }
}
