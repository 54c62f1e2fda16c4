use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::issue::IssueId;

/// Largest weight a single observation may carry; collaborators are asked for 0..=100.
pub const MAX_WEIGHT: f64 = 1_000_000.0;

/// One source's `(weight, score)` judgment about a company on one issue.
///
/// `weight` is a confidence mass in `0.0..=MAX_WEIGHT` (zero means "no opinion") and `score`
/// lies within `0.0..=100.0`, where 50 is net-neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    weight: f64,
    score: f64,
}

impl Observation {
    /// Construct an observation, validating weight and score bounds.
    pub fn new(weight: f64, score: f64) -> Result<Self, ObservationError> {
        if !weight.is_finite() || !(0.0..=MAX_WEIGHT).contains(&weight) {
            return Err(ObservationError::InvalidWeight { weight });
        }
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(ObservationError::InvalidScore { score });
        }
        Ok(Self { weight, score })
    }

    /// Zero-weight observation; contributes nothing when aggregated.
    pub fn no_opinion() -> Self {
        Self {
            weight: 0.0,
            score: 0.0,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Errors emitted while validating observations at collaborator boundaries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ObservationError {
    #[error("observation weight must be within 0.0..={max} (got {weight})", max = MAX_WEIGHT)]
    InvalidWeight { weight: f64 },
    #[error("observation score must be within 0.0..=100.0 (got {score})")]
    InvalidScore { score: f64 },
    #[error("observation entry is malformed: {0}")]
    Malformed(String),
}

/// Aggregated outcome for one issue: summed weight and weighted mean score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IssueResult {
    pub confidence: f64,
    pub score: f64,
}

/// Per-source evidence for one company, possibly several observations per issue.
pub type EvidenceBundle = BTreeMap<IssueId, Vec<Observation>>;

/// One-shot judgment per issue, as returned by scoring collaborators.
pub type EvidenceMap = BTreeMap<IssueId, Observation>;

/// Lift a one-observation-per-issue map into a bundle.
pub fn bundle_from_map(map: EvidenceMap) -> EvidenceBundle {
    map.into_iter()
        .map(|(issue, observation)| (issue, vec![observation]))
        .collect()
}

/// Total evidence mass carried by a bundle.
pub fn total_weight(bundle: &EvidenceBundle) -> f64 {
    bundle
        .values()
        .flat_map(|observations| observations.iter().map(Observation::weight))
        .sum()
}

/// Arguments a model supplies when it calls an `<ISSUE>_INDEX` function.
///
/// `significance` is accepted for documents produced by the older schema.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationArgs {
    #[serde(alias = "significance")]
    pub weight: f64,
    #[serde(default)]
    pub score: Option<f64>,
}

impl ObservationArgs {
    /// A call without a score carries no opinion regardless of its weight.
    pub fn into_observation(self) -> Result<Observation, ObservationError> {
        match self.score {
            Some(score) => Observation::new(self.weight, score),
            None => Ok(Observation::no_opinion()),
        }
    }
}

/// Parse a loosely typed `issue -> [weight, score] | {weight, score} | [..]` document.
///
/// Unknown issues and malformed entries are logged and dropped instead of failing the whole
/// document.
pub fn bundle_from_json(value: &Value) -> EvidenceBundle {
    let mut bundle = EvidenceBundle::new();
    let Some(object) = value.as_object() else {
        warn!("evidence document is not a JSON object; ignoring");
        return bundle;
    };
    for (key, entry) in object {
        let issue = match IssueId::from_function_name(key) {
            Ok(issue) => issue,
            Err(err) => {
                warn!(%err, "dropping evidence for unknown issue");
                continue;
            }
        };
        let observations = bundle.entry(issue).or_default();
        for candidate in entry_candidates(entry) {
            match observation_from_value(candidate) {
                Ok(observation) => observations.push(observation),
                Err(err) => warn!(issue = %issue, %err, "dropping malformed observation"),
            }
        }
    }
    bundle.retain(|_, observations| !observations.is_empty());
    bundle
}

fn entry_candidates(entry: &Value) -> Vec<&Value> {
    match entry {
        Value::Array(items) if items.iter().all(|item| item.is_array() || item.is_object()) => {
            items.iter().collect()
        }
        other => vec![other],
    }
}

fn observation_from_value(value: &Value) -> Result<Observation, ObservationError> {
    match value {
        Value::Array(pair) => {
            let [weight, score] = pair.as_slice() else {
                return Err(ObservationError::Malformed(format!(
                    "expected [weight, score], got {} element(s)",
                    pair.len()
                )));
            };
            let weight = number(weight)?;
            let score = number(score)?;
            Observation::new(weight, score)
        }
        Value::Object(_) => {
            let args: ObservationArgs = serde_json::from_value(value.clone())
                .map_err(|err| ObservationError::Malformed(err.to_string()))?;
            args.into_observation()
        }
        other => Err(ObservationError::Malformed(format!(
            "expected array or object, got {other}"
        ))),
    }
}

fn number(value: &Value) -> Result<f64, ObservationError> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| ObservationError::Malformed(format!("{number} is not representable"))),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ObservationError::Malformed(format!("`{text}` is not numeric"))),
        other => Err(ObservationError::Malformed(format!(
            "`{other}` is not numeric"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn observation_rejects_negative_weight() {
        let err = Observation::new(-1.0, 50.0).expect_err("negative weight is invalid");
        assert!(matches!(err, ObservationError::InvalidWeight { weight } if weight == -1.0));
    }

    #[test]
    fn observation_rejects_weights_above_cap() {
        assert!(Observation::new(MAX_WEIGHT, 50.0).is_ok());
        let err = Observation::new(1e306, 50.0).expect_err("huge weight is invalid");
        assert!(matches!(err, ObservationError::InvalidWeight { .. }));
        let bundle = bundle_from_json(&json!({"PAY": [[1e306, 50], [2, 40]]}));
        assert_eq!(bundle[&IssueId::Pay].len(), 1);
        assert_eq!(bundle[&IssueId::Pay][0].weight(), 2.0);
    }

    #[test]
    fn observation_rejects_out_of_range_score() {
        assert!(matches!(
            Observation::new(10.0, 101.0),
            Err(ObservationError::InvalidScore { .. })
        ));
        assert!(matches!(
            Observation::new(10.0, f64::NAN),
            Err(ObservationError::InvalidScore { .. })
        ));
    }

    #[test]
    fn missing_score_means_no_opinion() {
        let args: ObservationArgs = serde_json::from_value(json!({"weight": 40})).unwrap();
        assert_eq!(args.into_observation().unwrap(), Observation::no_opinion());
    }

    #[test]
    fn significance_alias_is_accepted() {
        let args: ObservationArgs =
            serde_json::from_value(json!({"significance": 30, "score": 55})).unwrap();
        let observation = args.into_observation().unwrap();
        assert_eq!(observation.weight(), 30.0);
        assert_eq!(observation.score(), 55.0);
    }

    #[test]
    fn json_bundle_drops_malformed_entries() {
        let bundle = bundle_from_json(&json!({
            "ENV": [80, 75],
            "PAY": [[50, 65], {"weight": 10, "score": 40}],
            "DEI_L": ["high", 20],
            "QUEER": [1, 2, 3],
            "WATER": [10, 10],
            "BIPOC": "n/a",
            "CHARITY": ["12.5", "70"]
        }));

        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle[&IssueId::Environment].len(), 1);
        assert_eq!(bundle[&IssueId::Pay].len(), 2);
        assert_eq!(bundle[&IssueId::Charity][0].weight(), 12.5);
        assert!(!bundle.contains_key(&IssueId::DeiLeadership));
        assert!(!bundle.contains_key(&IssueId::Queer));
    }

    #[test]
    fn non_object_document_yields_empty_bundle() {
        assert!(bundle_from_json(&json!([1, 2])).is_empty());
    }

    #[test]
    fn total_weight_sums_all_observations() {
        let bundle = bundle_from_json(&json!({"ENV": [80, 75], "PAY": [[50, 65], [5, 1]]}));
        assert_eq!(total_weight(&bundle), 135.0);
    }
}
