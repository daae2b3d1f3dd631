//! Consensus over the results of the three workflow versions.
//!
//! Items are grouped by subject id in first-appearance order (v1, then v2,
//! then v3). When one version proposes several items for a subject, only its
//! most confident item per label counts.

use std::collections::HashMap;

use governance_services::ClassificationItem;
use serde_json::json;

use super::configs::ConsensusAlgorithm;
use super::execution::VersionResults;
use crate::config::ConsensusConfig;

const VERSIONS: [&str; 3] = ["v1", "v2", "v3"];

/// Versions that must agree on a label for majority consensus.
const MAJORITY: usize = 2;

/// Source recorded on consensus items.
pub const CONSENSUS_SOURCE: &str = "consensus";

/// One version's best item for a subject and label.
#[derive(Debug, Clone, Copy)]
struct Proposal<'a> {
    version: usize,
    item: &'a ClassificationItem,
}

/// Merges version results.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusEngine {
    /// Historical accuracy of v1, v2 and v3.
    accuracies: [f64; 3],
}

impl ConsensusEngine {
    #[must_use]
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            accuracies: [config.v1_accuracy, config.v2_accuracy, config.v3_accuracy],
        }
    }

    /// Combine version results under `algorithm`.
    #[must_use]
    pub fn combine(
        &self,
        results: &VersionResults,
        algorithm: ConsensusAlgorithm,
    ) -> Vec<ClassificationItem> {
        group_by_subject(results)
            .into_iter()
            .filter_map(|(subject, proposals)| {
                let (label, confidence, winner) = match algorithm {
                    ConsensusAlgorithm::Majority => majority(&proposals)?,
                    ConsensusAlgorithm::Weighted => {
                        let winner = best_by(&proposals, |p| {
                            self.accuracies[p.version] * p.item.confidence
                        })?;
                        (winner.item.label.as_str(), winner.item.confidence, winner)
                    }
                    ConsensusAlgorithm::ConfidenceBased => {
                        let winner = best_by(&proposals, |p| p.item.confidence)?;
                        (winner.item.label.as_str(), winner.item.confidence, winner)
                    }
                };

                let supporting: Vec<&str> = VERSIONS
                    .iter()
                    .enumerate()
                    .filter(|(v, _)| {
                        proposals
                            .iter()
                            .any(|p| p.version == *v && p.item.label == label)
                    })
                    .map(|(_, name)| *name)
                    .collect();
                #[allow(clippy::cast_precision_loss, reason = "at most three versions")]
                let agreement = supporting.len() as f64 / VERSIONS.len() as f64;

                let mut item = ClassificationItem::new(subject, label, confidence, CONSENSUS_SOURCE);
                item.category.clone_from(&winner.item.category);
                item.attributes.clone_from(&winner.item.attributes);
                item.attributes.insert(
                    "consensus".to_string(),
                    json!({
                        "algorithm": algorithm.to_string(),
                        "supporting_versions": supporting,
                        "agreement": agreement,
                    }),
                );
                Some(item)
            })
            .collect()
    }

    /// Mean of `confidence × agreement` over consensus items, `0.0` when empty.
    #[must_use]
    pub fn quality_score(items: &[ClassificationItem]) -> f64 {
        if items.is_empty() {
            return 0.0;
        }
        let total: f64 = items
            .iter()
            .map(|item| {
                let agreement = item
                    .attributes
                    .get("consensus")
                    .and_then(|c| c.get("agreement"))
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);
                item.confidence * agreement
            })
            .sum();
        #[allow(clippy::cast_precision_loss, reason = "item counts are far below 2^52")]
        let count = items.len() as f64;
        total / count
    }
}

/// Subjects in first-appearance order with their deduplicated proposals.
fn group_by_subject(results: &VersionResults) -> Vec<(&str, Vec<Proposal<'_>>)> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<Proposal<'_>>> = HashMap::new();

    for (version, items) in [&results.v1, &results.v2, &results.v3].into_iter().enumerate() {
        for item in items {
            let proposals = groups.entry(item.id.as_str()).or_insert_with(|| {
                order.push(item.id.as_str());
                Vec::new()
            });
            match proposals
                .iter_mut()
                .find(|p| p.version == version && p.item.label == item.label)
            {
                Some(existing) if existing.item.confidence < item.confidence => existing.item = item,
                Some(_) => {}
                None => proposals.push(Proposal { version, item }),
            }
        }
    }

    order
        .into_iter()
        .filter_map(|subject| groups.remove(subject).map(|p| (subject, p)))
        .collect()
}

/// Label proposed by at least two versions. Ties go to more versions, then
/// higher mean confidence, then first appearance.
fn majority<'a>(proposals: &[Proposal<'a>]) -> Option<(&'a str, f64, Proposal<'a>)> {
    let mut labels: Vec<&'a str> = Vec::new();
    for p in proposals {
        if !labels.contains(&p.item.label.as_str()) {
            labels.push(p.item.label.as_str());
        }
    }

    let mut best: Option<(usize, f64, &'a str)> = None;
    for label in labels {
        let agreeing: Vec<&Proposal<'a>> =
            proposals.iter().filter(|p| p.item.label == label).collect();
        let versions = agreeing.len();
        if versions < MAJORITY {
            continue;
        }
        #[allow(clippy::cast_precision_loss, reason = "at most three versions")]
        let mean = agreeing.iter().map(|p| p.item.confidence).sum::<f64>() / versions as f64;
        let better = best.is_none_or(|(v, c, _)| versions > v || (versions == v && mean > c));
        if better {
            best = Some((versions, mean, label));
        }
    }

    let (_, confidence, label) = best?;
    let winner = best_by(
        &proposals
            .iter()
            .copied()
            .filter(|p| p.item.label == label)
            .collect::<Vec<_>>(),
        |p| p.item.confidence,
    )?;
    Some((label, confidence, winner))
}

/// Proposal with the highest key; the first one wins ties.
fn best_by<'a>(proposals: &[Proposal<'a>], key: impl Fn(&Proposal<'a>) -> f64) -> Option<Proposal<'a>> {
    let mut best: Option<(f64, Proposal<'a>)> = None;
    for p in proposals {
        let k = key(p);
        if best.is_none_or(|(b, _)| k > b) {
            best = Some((k, *p));
        }
    }
    best.map(|(_, p)| p)
}
