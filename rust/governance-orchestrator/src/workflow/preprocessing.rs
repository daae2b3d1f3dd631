//! Record cleaning, quality scoring, sampling and per-framework preparation.

use std::collections::{BTreeSet, HashMap};

use governance_services::classification::{DataFormat, FrameworkKind};
use serde_json::{Map, Value};

use crate::config::ExecutionConfig;

/// Target edge length of images handed to vision frameworks.
pub const VISION_TARGET_SIZE: u32 = 224;

/// Records ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    pub records: Vec<Value>,
    /// Record count before sampling.
    pub original_count: usize,
    /// Completeness of the cleaned records, within `[0, 1]`.
    pub quality_score: f64,
    pub sampled: bool,
}

/// Clean, score and sample raw records.
#[must_use]
pub fn prepare(records: Vec<Value>, format: DataFormat, config: &ExecutionConfig) -> PreparedData {
    let cleaned = clean_records(records, format);
    let quality_score = completeness_score(&cleaned);
    let original_count = cleaned.len();
    let target = sample_target(original_count, config);

    if target < original_count {
        let records = stratified_sample(&cleaned, target, &config.stratify_field);
        PreparedData {
            records,
            original_count,
            quality_score,
            sampled: true,
        }
    } else {
        PreparedData {
            records: cleaned,
            original_count,
            quality_score,
            sampled: false,
        }
    }
}

/// Normalize raw records into JSON objects with an `id`.
///
/// Text records become `{"text": ...}`, CSV cells are trimmed with empty
/// cells dropped, and null fields are removed. Empty records are discarded.
#[must_use]
pub fn clean_records(records: Vec<Value>, format: DataFormat) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|record| {
            let object = match (format, record) {
                (DataFormat::Text, Value::String(text)) => {
                    let text = text.trim();
                    if text.is_empty() {
                        return None;
                    }
                    let mut object = Map::new();
                    object.insert("text".to_string(), Value::from(text));
                    object
                }
                (_, Value::Object(object)) => object,
                _ => return None,
            };

            let object: Map<String, Value> = object
                .into_iter()
                .filter_map(|(key, value)| match value {
                    Value::Null => None,
                    Value::String(s) if format == DataFormat::Csv => {
                        let trimmed = s.trim();
                        (!trimmed.is_empty()).then(|| (key, Value::from(trimmed)))
                    }
                    other => Some((key, other)),
                })
                .collect();

            (!object.is_empty()).then_some(object)
        })
        .enumerate()
        .map(|(i, mut object)| {
            object
                .entry("id")
                .or_insert_with(|| Value::from(format!("rec-{i}")));
            Value::Object(object)
        })
        .collect()
}

/// Fraction of filled fields over the union of keys, `0.0` for no records.
#[must_use]
#[allow(clippy::cast_precision_loss, reason = "record and key counts are far below 2^52")]
pub fn completeness_score(records: &[Value]) -> f64 {
    let keys: BTreeSet<&str> = records
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|o| o.keys().map(String::as_str))
        .collect();
    if records.is_empty() || keys.is_empty() {
        return 0.0;
    }

    let filled: usize = records
        .iter()
        .filter_map(Value::as_object)
        .map(|o| {
            keys.iter()
                .filter(|k| o.get(**k).is_some_and(is_filled))
                .count()
        })
        .sum();

    filled as f64 / (records.len() * keys.len()) as f64
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Number of records to keep out of `count`.
///
/// Above the sampling threshold: `min(max(floor, ceil(ratio * count)), ceiling)`.
#[must_use]
pub fn sample_target(count: usize, config: &ExecutionConfig) -> usize {
    if count <= config.sampling_threshold {
        return count;
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        reason = "ratio is within (0, 1] so the product fits in usize"
    )]
    let proportional = (config.sample_ratio * count as f64).ceil() as usize;
    proportional
        .max(config.sample_floor)
        .min(config.sample_ceiling)
        .min(count)
}

/// Proportional stratified sample of exactly `target` records.
///
/// Strata are the values of `field` (records without it form their own
/// stratum). Quotas use largest-remainder allocation with a floor of one
/// record per stratum whenever `target` covers every stratum, and picks
/// inside a stratum are evenly spaced.
#[must_use]
pub fn stratified_sample(records: &[Value], target: usize, field: &str) -> Vec<Value> {
    let total = records.len();
    if target >= total {
        return records.to_vec();
    }
    if target == 0 {
        return Vec::new();
    }

    let mut order: Vec<Option<String>> = Vec::new();
    let mut strata: HashMap<Option<String>, Vec<usize>> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        let key = record.get(field).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        strata
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(i);
    }

    // (stratum position, quota, remainder)
    let mut quotas: Vec<(usize, usize, usize)> = order
        .iter()
        .enumerate()
        .map(|(pos, key)| {
            let size = strata.get(key).map_or(0, Vec::len);
            let exact = target * size;
            (pos, exact / total, exact % total)
        })
        .collect();

    let allocated: usize = quotas.iter().map(|q| q.1).sum();
    let mut by_remainder: Vec<usize> = (0..quotas.len()).collect();
    by_remainder.sort_by(|&a, &b| quotas[b].2.cmp(&quotas[a].2).then(a.cmp(&b)));
    for &idx in by_remainder.iter().take(target - allocated) {
        quotas[idx].1 += 1;
    }

    // Every class keeps at least one record when the target allows it. The
    // slot comes from the largest stratum.
    if target >= quotas.len() {
        for idx in 0..quotas.len() {
            if quotas[idx].1 > 0 {
                continue;
            }
            let donor = (0..quotas.len())
                .filter(|&d| quotas[d].1 > 1)
                .max_by(|&a, &b| quotas[a].1.cmp(&quotas[b].1).then(b.cmp(&a)));
            if let Some(donor) = donor {
                quotas[donor].1 -= 1;
                quotas[idx].1 = 1;
            }
        }
    }

    let mut picked: Vec<usize> = Vec::with_capacity(target);
    for (pos, quota, _) in quotas {
        let Some(members) = strata.get(&order[pos]) else {
            continue;
        };
        let size = members.len();
        picked.extend((0..quota).map(|i| members[i * size / quota]));
    }
    picked.sort_unstable();
    picked.into_iter().map(|i| records[i].clone()).collect()
}

/// Framework-specific preparation of cleaned records.
///
/// - NLP: string fields are tokenized into a `tokens` array
/// - structured: numeric fields are min-max normalized to `[0, 1]`
/// - vision: target dimensions are attached
#[must_use]
pub fn prepare_for(kind: FrameworkKind, records: &[Value]) -> Vec<Value> {
    match kind {
        FrameworkKind::Nlp => records.iter().map(tokenize).collect(),
        FrameworkKind::Structured => normalize(records),
        FrameworkKind::Vision => records
            .iter()
            .map(|record| {
                let mut record = record.clone();
                if let Some(object) = record.as_object_mut() {
                    object.insert("target_width".to_string(), Value::from(VISION_TARGET_SIZE));
                    object.insert("target_height".to_string(), Value::from(VISION_TARGET_SIZE));
                }
                record
            })
            .collect(),
        FrameworkKind::RuleBased => records.to_vec(),
    }
}

fn tokenize(record: &Value) -> Value {
    let mut record = record.clone();
    if let Some(object) = record.as_object_mut() {
        let tokens: Vec<Value> = object
            .iter()
            .filter(|(key, _)| key.as_str() != "id")
            .filter_map(|(_, value)| value.as_str())
            .flat_map(|text| text.split(|c: char| !c.is_alphanumeric()))
            .filter(|token| !token.is_empty())
            .map(|token| Value::from(token.to_lowercase()))
            .collect();
        object.insert("tokens".to_string(), Value::Array(tokens));
    }
    record
}

fn normalize(records: &[Value]) -> Vec<Value> {
    let mut ranges: HashMap<String, (f64, f64)> = HashMap::new();
    for object in records.iter().filter_map(Value::as_object) {
        for (key, value) in object {
            if key == "id" {
                continue;
            }
            if let Some(n) = value.as_f64() {
                let range = ranges.entry(key.clone()).or_insert((n, n));
                range.0 = range.0.min(n);
                range.1 = range.1.max(n);
            }
        }
    }

    records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            if let Some(object) = record.as_object_mut() {
                for (key, value) in object.iter_mut() {
                    let (Some(n), Some((min, max))) = (value.as_f64(), ranges.get(key)) else {
                        continue;
                    };
                    let span = max - min;
                    let normalized = if span > 0.0 { (n - min) / span } else { 0.0 };
                    *value = Value::from(normalized);
                }
            }
            record
        })
        .collect()
}
