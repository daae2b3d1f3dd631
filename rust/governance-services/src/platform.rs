//! Platform telemetry contract.
//!
//! Utilization in [`CapacitySnapshot`] is a percentage (`0..=100`), while the
//! history and forecast series use fractions (`0.0..=1.0`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::response::ServiceResponse;

/// Service availability counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAvailability {
    pub total_services: u32,
    pub healthy_services: u32,
}

/// Request performance figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub avg_response_time_ms: f64,
    /// Fraction of failed requests.
    pub error_rate: f64,
    /// Requests per second.
    pub throughput: f64,
}

/// Infrastructure utilization in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
    #[serde(default)]
    pub storage_utilization: f64,
}

/// Threat level reported by the security subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Weight applied to the security score.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 0.7,
            Self::High => 0.3,
            Self::Critical => 0.0,
        }
    }
}

/// Security posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySnapshot {
    pub threat_level: ThreatLevel,
    pub active_threats: u32,
}

/// Compliance posture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    /// Score between 0 and 100.
    pub compliance_score: f64,
    #[serde(default)]
    pub open_violations: u32,
}

/// Allocation of one resource class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub allocated: f64,
    /// Fraction of `allocated` currently in use.
    pub utilized: f64,
    /// Floor below which the allocation must never drop.
    pub reserved: f64,
    pub cost: f64,
}

/// Allocation across the four resource classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub cpu: ResourceAllocation,
    pub memory: ResourceAllocation,
    pub storage: ResourceAllocation,
    pub network: ResourceAllocation,
}

/// One point of utilization history, fractions of allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub memory: f64,
    pub storage: f64,
    pub network: f64,
}

/// Predicted peak utilization per resource, fractions of allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadForecast {
    pub cpu: f64,
    pub memory: f64,
    pub storage: f64,
    pub network: f64,
    #[serde(default)]
    pub horizon_hours: u32,
}

/// Source of health, capacity and allocation telemetry.
#[async_trait]
pub trait PlatformMonitor: Send + Sync {
    async fn service_availability(&self) -> ServiceResponse<ServiceAvailability>;

    async fn performance(&self) -> ServiceResponse<PerformanceSnapshot>;

    async fn capacity(&self) -> ServiceResponse<CapacitySnapshot>;

    async fn security(&self) -> ServiceResponse<SecuritySnapshot>;

    async fn compliance(&self) -> ServiceResponse<ComplianceSnapshot>;

    /// Current system load as a fraction (`1.0` = saturated).
    async fn system_load(&self) -> ServiceResponse<f64>;

    async fn current_allocation(&self) -> ServiceResponse<AllocationSnapshot>;

    async fn utilization_history(&self) -> ServiceResponse<Vec<UtilizationSample>>;

    async fn workload_forecast(&self) -> ServiceResponse<WorkloadForecast>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threat_weights() {
        assert!((ThreatLevel::Low.weight() - 1.0).abs() < f64::EPSILON);
        assert!((ThreatLevel::Medium.weight() - 0.7).abs() < f64::EPSILON);
        assert!(ThreatLevel::Critical.weight().abs() < f64::EPSILON);
    }

    #[test]
    fn test_threat_level_serialization() {
        let json = serde_json::to_string(&ThreatLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
    }
}
