//! System health scoring.
//!
//! Five metric groups are fetched concurrently from the [`PlatformMonitor`].
//! A group that cannot be fetched degrades to a conservative default and is
//! listed in [`SystemHealthMetrics::degraded_sources`]; monitoring never fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use governance_services::platform::{
    CapacitySnapshot, ComplianceSnapshot, PerformanceSnapshot, PlatformMonitor, SecuritySnapshot,
    ServiceAvailability, ThreatLevel,
};
use governance_services::ServiceResponse;
use serde::{Deserialize, Serialize};

use crate::config::HealthConfig;

const AVAILABILITY_WEIGHT: f64 = 0.4;
const PERFORMANCE_WEIGHT: f64 = 0.3;
const CAPACITY_WEIGHT: f64 = 0.2;
const SECURITY_WEIGHT: f64 = 0.1;

const HEALTHY_SCORE: f64 = 0.8;
const DEGRADED_SCORE: f64 = 0.6;

/// Security score lost per active threat.
const THREAT_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    /// Bucket an overall score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= HEALTHY_SCORE {
            Self::Healthy
        } else if score >= DEGRADED_SCORE {
            Self::Degraded
        } else {
            Self::Critical
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Component scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub availability: f64,
    pub performance: f64,
    pub capacity: f64,
    pub security: f64,
}

/// Snapshot produced by [`HealthMonitor::monitor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthMetrics {
    /// Bucketed from `score`.
    pub overall: HealthStatus,
    pub score: f64,
    pub components: ComponentScores,
    pub availability: ServiceAvailability,
    pub performance: PerformanceSnapshot,
    pub capacity: CapacitySnapshot,
    pub security: SecuritySnapshot,
    pub compliance: ComplianceSnapshot,
    /// Metric groups replaced by defaults.
    pub degraded_sources: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// Scores platform health.
#[derive(Clone)]
pub struct HealthMonitor {
    platform: Arc<dyn PlatformMonitor>,
    config: HealthConfig,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    #[must_use]
    pub fn new(platform: Arc<dyn PlatformMonitor>, config: HealthConfig) -> Self {
        Self { platform, config }
    }

    /// Collect metrics and score them.
    pub async fn monitor(&self) -> SystemHealthMetrics {
        let (availability, performance, capacity, security, compliance) = futures::join!(
            self.platform.service_availability(),
            self.platform.performance(),
            self.platform.capacity(),
            self.platform.security(),
            self.platform.compliance(),
        );

        let mut degraded = Vec::new();
        let availability = or_default(availability, "availability", &mut degraded, || {
            ServiceAvailability {
                total_services: 0,
                healthy_services: 0,
            }
        });
        let performance = or_default(performance, "performance", &mut degraded, || {
            PerformanceSnapshot {
                avg_response_time_ms: 5_000.0,
                error_rate: 0.10,
                throughput: 0.0,
            }
        });
        let capacity = or_default(capacity, "capacity", &mut degraded, || CapacitySnapshot {
            cpu_utilization: 100.0,
            memory_utilization: 100.0,
            storage_utilization: 100.0,
        });
        let security = or_default(security, "security", &mut degraded, || SecuritySnapshot {
            threat_level: ThreatLevel::Medium,
            active_threats: 0,
        });
        let compliance = or_default(compliance, "compliance", &mut degraded, || {
            ComplianceSnapshot {
                compliance_score: 50.0,
                open_violations: 0,
            }
        });

        let components = ComponentScores {
            availability: availability_score(&availability),
            performance: self.performance_score(&performance),
            capacity: self.capacity_score(&capacity),
            security: security_score(&security, &compliance),
        };
        let score = overall_score(&components);
        let overall = HealthStatus::from_score(score);

        tracing::info!(
            overall = %overall,
            score = format!("{score:.3}"),
            degraded_sources = ?degraded,
            "System health evaluated"
        );

        SystemHealthMetrics {
            overall,
            score,
            components,
            availability,
            performance,
            capacity,
            security,
            compliance,
            degraded_sources: degraded,
            checked_at: Utc::now(),
        }
    }

    fn performance_score(&self, performance: &PerformanceSnapshot) -> f64 {
        let latency = unit(1.0 - performance.avg_response_time_ms / self.config.max_response_time_ms);
        let errors = unit(1.0 - performance.error_rate / self.config.max_error_rate);
        let throughput = unit(performance.throughput / self.config.target_throughput);
        latency * errors * throughput
    }

    fn capacity_score(&self, capacity: &CapacitySnapshot) -> f64 {
        let cpu = band(capacity.cpu_utilization, self.config.cpu_peak);
        let memory = band(capacity.memory_utilization, self.config.memory_peak);
        (cpu + memory) / 2.0
    }
}

fn or_default<T>(
    response: ServiceResponse<T>,
    source: &str,
    degraded: &mut Vec<String>,
    default: impl FnOnce() -> T,
) -> T {
    match response {
        ServiceResponse::Success(value) => value,
        ServiceResponse::Failure { error, .. } => {
            tracing::warn!(source, error = %error, "Health metrics unavailable, using defaults");
            degraded.push(source.to_string());
            default()
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Healthy services over total, `0.0` when nothing is registered.
fn availability_score(availability: &ServiceAvailability) -> f64 {
    if availability.total_services == 0 {
        return 0.0;
    }
    unit(f64::from(availability.healthy_services) / f64::from(availability.total_services))
}

/// Peaks at `peak` percent, linear down to zero at 0% and 100%.
fn band(utilization: f64, peak: f64) -> f64 {
    let u = utilization.clamp(0.0, 100.0);
    if u <= peak {
        if peak <= 0.0 {
            1.0
        } else {
            u / peak
        }
    } else if peak >= 100.0 {
        1.0
    } else {
        (100.0 - u) / (100.0 - peak)
    }
}

fn security_score(security: &SecuritySnapshot, compliance: &ComplianceSnapshot) -> f64 {
    let threats = (1.0 - THREAT_PENALTY * f64::from(security.active_threats)).max(0.0);
    unit(security.threat_level.weight() * threats * compliance.compliance_score / 100.0)
}

fn overall_score(components: &ComponentScores) -> f64 {
    AVAILABILITY_WEIGHT * components.availability
        + PERFORMANCE_WEIGHT * components.performance
        + CAPACITY_WEIGHT * components.capacity
        + SECURITY_WEIGHT * components.security
}
