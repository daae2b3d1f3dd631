//! Resource allocation recommendations.
//!
//! For every resource class the predicted peak utilization is the larger of
//! the history's 95th percentile and the workload forecast. The recommended
//! allocation keeps configured headroom above that peak and never drops
//! below the reserved floor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use governance_services::platform::{
    AllocationSnapshot, PlatformMonitor, ResourceAllocation, UtilizationSample, WorkloadForecast,
};
use governance_services::ServiceResponse;
use serde::{Deserialize, Serialize};

use crate::config::OptimizerConfig;
use crate::error::OrchestratorError;

/// Allocation changes smaller than this fraction are not planned.
const MIN_CHANGE: f64 = 0.01;
const MAX_SAFE_REDUCTION: f64 = 0.30;
const MAX_SAFE_VOLATILITY: f64 = 0.15;
const MAX_SAFE_UTILIZATION: f64 = 0.90;
const PEAK_PERCENTILE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cpu,
    Memory,
    Storage,
    Network,
}

impl ResourceKind {
    pub const ALL: [Self; 4] = [Self::Cpu, Self::Memory, Self::Storage, Self::Network];

    fn allocation(self, snapshot: &AllocationSnapshot) -> &ResourceAllocation {
        match self {
            Self::Cpu => &snapshot.cpu,
            Self::Memory => &snapshot.memory,
            Self::Storage => &snapshot.storage,
            Self::Network => &snapshot.network,
        }
    }

    fn allocation_mut(self, snapshot: &mut AllocationSnapshot) -> &mut ResourceAllocation {
        match self {
            Self::Cpu => &mut snapshot.cpu,
            Self::Memory => &mut snapshot.memory,
            Self::Storage => &mut snapshot.storage,
            Self::Network => &mut snapshot.network,
        }
    }

    fn sample(self, sample: &UtilizationSample) -> f64 {
        match self {
            Self::Cpu => sample.cpu,
            Self::Memory => sample.memory,
            Self::Storage => sample.storage,
            Self::Network => sample.network,
        }
    }

    fn forecast(self, forecast: &WorkloadForecast) -> f64 {
        match self {
            Self::Cpu => forecast.cpu,
            Self::Memory => forecast.memory,
            Self::Storage => forecast.storage,
            Self::Network => forecast.network,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Memory => write!(f, "memory"),
            Self::Storage => write!(f, "storage"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Recommendation for one resource class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecommendation {
    pub resource: ResourceKind,
    pub current_allocation: f64,
    pub recommended_allocation: f64,
    pub current_utilization: f64,
    pub predicted_utilization: f64,
    /// Standard deviation of the utilization history.
    pub volatility: f64,
    pub current_cost: f64,
    pub recommended_cost: f64,
    /// Never negative.
    pub potential_savings: f64,
}

impl ResourceRecommendation {
    /// Relative allocation change, positive for scale-ups.
    #[must_use]
    pub fn change_ratio(&self) -> f64 {
        if self.current_allocation <= 0.0 {
            return 0.0;
        }
        (self.recommended_allocation - self.current_allocation) / self.current_allocation
    }

    /// `utilization` of the current allocation expressed against the
    /// recommended one.
    fn rescaled(&self, utilization: f64) -> f64 {
        if self.recommended_allocation > 0.0 {
            utilization * self.current_allocation / self.recommended_allocation
        } else {
            utilization
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    ScaleUp,
    ScaleDown,
}

/// One numbered step of the implementation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: u32,
    pub resource: ResourceKind,
    pub action: PlanAction,
    pub from: f64,
    pub to: f64,
    pub savings: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRating {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub resource: ResourceKind,
    pub description: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall: RiskRating,
    pub factors: Vec<RiskFactor>,
    /// One entry per factor, in factor order.
    pub mitigation: Vec<String>,
}

/// Expected change of spare capacity for one resource class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceImpact {
    pub resource: ResourceKind,
    /// Spare fraction of the current allocation at predicted peak.
    pub current_headroom: f64,
    /// Spare fraction of the recommended allocation at predicted peak.
    pub expected_headroom: f64,
}

/// Output of [`ResourceOptimizer::optimize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOptimizationResult {
    pub current_allocation: AllocationSnapshot,
    /// Allocation after applying every recommendation. `utilized` is the
    /// current load against the new allocation.
    pub recommended_allocation: AllocationSnapshot,
    pub recommendations: Vec<ResourceRecommendation>,
    pub current_cost: f64,
    pub recommended_cost: f64,
    pub potential_savings: f64,
    pub implementation_plan: Vec<PlanStep>,
    pub risk_assessment: RiskAssessment,
    pub performance_impact: Vec<PerformanceImpact>,
    /// Inputs that could not be fetched.
    pub degraded_sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Computes allocation recommendations from platform telemetry.
#[derive(Clone)]
pub struct ResourceOptimizer {
    platform: Arc<dyn PlatformMonitor>,
    headroom: f64,
}

impl std::fmt::Debug for ResourceOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceOptimizer")
            .field("headroom", &self.headroom)
            .finish_non_exhaustive()
    }
}

impl ResourceOptimizer {
    #[must_use]
    pub fn new(platform: Arc<dyn PlatformMonitor>, config: &OptimizerConfig) -> Self {
        Self {
            platform,
            headroom: config.headroom.max(0.0),
        }
    }

    /// Fails only when the current allocation is unavailable.
    pub async fn optimize(&self) -> Result<ResourceOptimizationResult, OrchestratorError> {
        let (allocation, history, forecast) = futures::join!(
            self.platform.current_allocation(),
            self.platform.utilization_history(),
            self.platform.workload_forecast(),
        );
        let allocation = allocation.into_result("current_allocation").map_err(|e| {
            OrchestratorError::Unavailable(format!("resource allocation data unavailable: {e}"))
        })?;

        let mut degraded = Vec::new();
        let history = match history {
            ServiceResponse::Success(samples) => samples,
            ServiceResponse::Failure { error, .. } => {
                tracing::warn!(error = %error, "Utilization history unavailable");
                degraded.push("utilization_history".to_string());
                Vec::new()
            }
        };
        let forecast = match forecast {
            ServiceResponse::Success(forecast) => Some(forecast),
            ServiceResponse::Failure { error, .. } => {
                tracing::warn!(error = %error, "Workload forecast unavailable");
                degraded.push("workload_forecast".to_string());
                None
            }
        };

        let recommendations: Vec<ResourceRecommendation> = ResourceKind::ALL
            .iter()
            .map(|&kind| {
                let series: Vec<f64> = history.iter().map(|s| kind.sample(s)).collect();
                let forecast = forecast.as_ref().map(|f| kind.forecast(f));
                self.recommend(kind, kind.allocation(&allocation), &series, forecast)
            })
            .collect();

        let current_cost: f64 = recommendations.iter().map(|r| r.current_cost).sum();
        let recommended_cost: f64 = recommendations.iter().map(|r| r.recommended_cost).sum();
        let result = ResourceOptimizationResult {
            recommended_allocation: recommended_snapshot(&allocation, &recommendations),
            current_allocation: allocation,
            current_cost,
            recommended_cost,
            potential_savings: (current_cost - recommended_cost).max(0.0),
            implementation_plan: implementation_plan(&recommendations),
            risk_assessment: assess_risks(&recommendations),
            performance_impact: recommendations.iter().map(performance_impact).collect(),
            recommendations,
            degraded_sources: degraded,
            generated_at: Utc::now(),
        };

        tracing::info!(
            potential_savings = format!("{:.2}", result.potential_savings),
            steps = result.implementation_plan.len(),
            risk = ?result.risk_assessment.overall,
            "Resource optimization computed"
        );
        Ok(result)
    }

    fn recommend(
        &self,
        resource: ResourceKind,
        allocation: &ResourceAllocation,
        history: &[f64],
        forecast: Option<f64>,
    ) -> ResourceRecommendation {
        let predicted = [percentile(history, PEAK_PERCENTILE), forecast]
            .into_iter()
            .flatten()
            .reduce(f64::max)
            .unwrap_or(allocation.utilized)
            .max(0.0);

        let recommended = (allocation.allocated * predicted * (1.0 + self.headroom))
            .max(allocation.reserved);
        let recommended_cost = if allocation.allocated > 0.0 {
            allocation.cost * recommended / allocation.allocated
        } else {
            allocation.cost
        };

        ResourceRecommendation {
            resource,
            current_allocation: allocation.allocated,
            recommended_allocation: recommended,
            current_utilization: allocation.utilized,
            predicted_utilization: predicted,
            volatility: std_dev(history),
            current_cost: allocation.cost,
            recommended_cost,
            potential_savings: (allocation.cost - recommended_cost).max(0.0),
        }
    }
}

/// Nearest-rank percentile, `None` for an empty series.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "rank is within 1..=len"
)]
fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (p * sorted.len() as f64).ceil().max(1.0) as usize;
    sorted.get(rank.min(sorted.len()) - 1).copied()
}

/// Population standard deviation, `0.0` below two samples.
#[allow(clippy::cast_precision_loss, reason = "sample counts are far below 2^52")]
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Scale-ups first, then scale-downs by savings descending.
fn implementation_plan(recommendations: &[ResourceRecommendation]) -> Vec<PlanStep> {
    let (mut ups, mut downs): (Vec<_>, Vec<_>) = recommendations
        .iter()
        .filter(|r| r.change_ratio().abs() >= MIN_CHANGE)
        .partition(|r| r.change_ratio() > 0.0);
    ups.sort_by(|a, b| b.change_ratio().total_cmp(&a.change_ratio()));
    downs.sort_by(|a, b| b.potential_savings.total_cmp(&a.potential_savings));

    let steps = ups
        .into_iter()
        .map(|r| (r, PlanAction::ScaleUp))
        .chain(downs.into_iter().map(|r| (r, PlanAction::ScaleDown)));
    (1..)
        .zip(steps)
        .map(|(step, (r, action))| PlanStep {
            step,
            resource: r.resource,
            action,
            from: r.current_allocation,
            to: r.recommended_allocation,
            savings: r.potential_savings,
        })
        .collect()
}

fn assess_risks(recommendations: &[ResourceRecommendation]) -> RiskAssessment {
    let mut factors = Vec::new();
    for r in recommendations {
        let reduction = -r.change_ratio();
        if reduction > MAX_SAFE_REDUCTION {
            factors.push(RiskFactor {
                resource: r.resource,
                description: format!(
                    "{} allocation drops by {:.0}%",
                    r.resource,
                    reduction * 100.0
                ),
                mitigation: format!("Reduce {} in stages and watch saturation between steps", r.resource),
            });
        }
        if r.volatility > MAX_SAFE_VOLATILITY {
            factors.push(RiskFactor {
                resource: r.resource,
                description: format!(
                    "{} utilization is volatile (std-dev {:.2})",
                    r.resource, r.volatility
                ),
                mitigation: format!("Enable autoscaling for {} before applying the change", r.resource),
            });
        }
        if r.predicted_utilization > MAX_SAFE_UTILIZATION {
            factors.push(RiskFactor {
                resource: r.resource,
                description: format!(
                    "{} is predicted to peak at {:.0}% of its allocation",
                    r.resource,
                    r.predicted_utilization * 100.0
                ),
                mitigation: format!("Apply the {} scale-up ahead of the forecast peak", r.resource),
            });
        }
    }

    let overall = match factors.len() {
        0 => RiskRating::Low,
        1 => RiskRating::Medium,
        _ => RiskRating::High,
    };
    let mitigation = factors.iter().map(|f| f.mitigation.clone()).collect();
    RiskAssessment {
        overall,
        factors,
        mitigation,
    }
}

fn recommended_snapshot(
    current: &AllocationSnapshot,
    recommendations: &[ResourceRecommendation],
) -> AllocationSnapshot {
    let mut snapshot = *current;
    for r in recommendations {
        let slot = r.resource.allocation_mut(&mut snapshot);
        *slot = ResourceAllocation {
            allocated: r.recommended_allocation,
            utilized: r.rescaled(r.current_utilization),
            reserved: slot.reserved,
            cost: r.recommended_cost,
        };
    }
    snapshot
}

fn performance_impact(r: &ResourceRecommendation) -> PerformanceImpact {
    PerformanceImpact {
        resource: r.resource,
        current_headroom: 1.0 - r.predicted_utilization,
        expected_headroom: 1.0 - r.rescaled(r.predicted_utilization),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocation(allocated: f64, utilized: f64, reserved: f64, cost: f64) -> ResourceAllocation {
        ResourceAllocation {
            allocated,
            utilized,
            reserved,
            cost,
        }
    }

    fn recommendation(resource: ResourceKind, from: f64, to: f64, savings: f64) -> ResourceRecommendation {
        ResourceRecommendation {
            resource,
            current_allocation: from,
            recommended_allocation: to,
            current_utilization: 0.5,
            predicted_utilization: 0.5,
            volatility: 0.0,
            current_cost: 0.0,
            recommended_cost: 0.0,
            potential_savings: savings,
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=20).map(|v| f64::from(v) / 100.0).collect();
        assert_eq!(percentile(&values, 0.95), Some(0.19));
        assert_eq!(percentile(&[0.4], 0.95), Some(0.4));
        assert_eq!(percentile(&[], 0.95), None);
    }

    #[test]
    fn test_std_dev() {
        assert!(std_dev(&[0.5]).abs() < f64::EPSILON);
        assert!((std_dev(&[0.2, 0.4]) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_recommendation_respects_reserved_floor() {
        let optimizer = ResourceOptimizer {
            platform: Arc::new(NoPlatform),
            headroom: 0.2,
        };
        let r = optimizer.recommend(
            ResourceKind::Cpu,
            &allocation(100.0, 0.1, 40.0, 1_000.0),
            &[0.1, 0.1],
            None,
        );
        assert!((r.recommended_allocation - 40.0).abs() < 1e-9);
        assert!((r.recommended_cost - 400.0).abs() < 1e-9);
        assert!((r.potential_savings - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_up_never_reports_negative_savings() {
        let optimizer = ResourceOptimizer {
            platform: Arc::new(NoPlatform),
            headroom: 0.2,
        };
        let r = optimizer.recommend(
            ResourceKind::Memory,
            &allocation(100.0, 0.9, 0.0, 1_000.0),
            &[0.9, 0.95],
            Some(1.0),
        );
        assert!((r.recommended_allocation - 120.0).abs() < 1e-9);
        assert!(r.potential_savings.abs() < f64::EPSILON);
    }

    #[test]
    fn test_recommended_snapshot_keeps_reserved_and_rescales_load() {
        let current = AllocationSnapshot {
            cpu: allocation(100.0, 0.2, 10.0, 1_000.0),
            memory: allocation(50.0, 0.5, 5.0, 500.0),
            storage: allocation(10.0, 0.5, 1.0, 100.0),
            network: allocation(10.0, 0.9, 1.0, 100.0),
        };
        let mut cpu = recommendation(ResourceKind::Cpu, 100.0, 40.0, 600.0);
        cpu.current_utilization = 0.2;
        cpu.recommended_cost = 400.0;

        let snapshot = recommended_snapshot(&current, &[cpu]);

        assert!((snapshot.cpu.allocated - 40.0).abs() < 1e-9);
        assert!((snapshot.cpu.utilized - 0.5).abs() < 1e-9);
        assert!((snapshot.cpu.reserved - 10.0).abs() < 1e-9);
        assert!((snapshot.cpu.cost - 400.0).abs() < 1e-9);
        assert_eq!(snapshot.memory, current.memory);
    }

    #[test]
    fn test_plan_orders_scale_ups_before_savings() {
        let plan = implementation_plan(&[
            recommendation(ResourceKind::Cpu, 100.0, 50.0, 10.0),
            recommendation(ResourceKind::Memory, 100.0, 150.0, 0.0),
            recommendation(ResourceKind::Storage, 100.0, 60.0, 30.0),
            recommendation(ResourceKind::Network, 100.0, 100.5, 0.0),
        ]);

        let order: Vec<(u32, ResourceKind)> = plan.iter().map(|s| (s.step, s.resource)).collect();
        assert_eq!(
            order,
            vec![
                (1, ResourceKind::Memory),
                (2, ResourceKind::Storage),
                (3, ResourceKind::Cpu),
            ]
        );
        assert_eq!(plan[0].action, PlanAction::ScaleUp);
    }

    #[test]
    fn test_risk_levels() {
        let calm = recommendation(ResourceKind::Cpu, 100.0, 90.0, 1.0);
        assert_eq!(assess_risks(&[calm]).overall, RiskRating::Low);

        let steep = recommendation(ResourceKind::Cpu, 100.0, 50.0, 1.0);
        assert_eq!(assess_risks(&[steep.clone()]).overall, RiskRating::Medium);

        let mut hot = recommendation(ResourceKind::Memory, 100.0, 100.0, 0.0);
        hot.predicted_utilization = 0.95;
        let assessment = assess_risks(&[steep, hot]);
        assert_eq!(assessment.overall, RiskRating::High);
        assert_eq!(assessment.factors.len(), 2);
        assert!(assessment.factors.iter().all(|f| !f.mitigation.is_empty()));
        assert_eq!(assessment.mitigation.len(), 2);
        assert_eq!(assessment.mitigation[1], assessment.factors[1].mitigation);
    }

    struct NoPlatform;

    #[async_trait::async_trait]
    impl PlatformMonitor for NoPlatform {
        async fn service_availability(
            &self,
        ) -> ServiceResponse<governance_services::platform::ServiceAvailability> {
            ServiceResponse::failure("offline", true)
        }

        async fn performance(
            &self,
        ) -> ServiceResponse<governance_services::platform::PerformanceSnapshot> {
            ServiceResponse::failure("offline", true)
        }

        async fn capacity(&self) -> ServiceResponse<governance_services::platform::CapacitySnapshot> {
            ServiceResponse::failure("offline", true)
        }

        async fn security(&self) -> ServiceResponse<governance_services::platform::SecuritySnapshot> {
            ServiceResponse::failure("offline", true)
        }

        async fn compliance(
            &self,
        ) -> ServiceResponse<governance_services::platform::ComplianceSnapshot> {
            ServiceResponse::failure("offline", true)
        }

        async fn system_load(&self) -> ServiceResponse<f64> {
            ServiceResponse::failure("offline", true)
        }

        async fn current_allocation(&self) -> ServiceResponse<AllocationSnapshot> {
            ServiceResponse::failure("offline", true)
        }

        async fn utilization_history(&self) -> ServiceResponse<Vec<UtilizationSample>> {
            ServiceResponse::failure("offline", true)
        }

        async fn workload_forecast(&self) -> ServiceResponse<WorkloadForecast> {
            ServiceResponse::failure("offline", true)
        }
    }

    #[tokio::test]
    async fn test_missing_allocation_is_an_error() {
        let optimizer = ResourceOptimizer::new(Arc::new(NoPlatform), &OptimizerConfig::default());
        let err = optimizer.optimize().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Unavailable(_)));
    }
}
