use std::collections::BTreeMap;

use tracing::trace;

use crate::evidence::{EvidenceBundle, IssueResult, Observation};
use crate::issue::IssueId;

/// Combine per-source bundles into one confidence-weighted score per issue.
///
/// For every issue, `confidence = Σweight` and `score = Σ(weight·score) / Σweight`, both
/// rounded to three decimals. Issues whose total weight is not positive are omitted: absence
/// encodes "no evidence found". Observations are summed in a canonical order so the output
/// does not depend on the order of `bundles`.
pub fn aggregate<'a, I>(bundles: I) -> BTreeMap<IssueId, IssueResult>
where
    I: IntoIterator<Item = &'a EvidenceBundle>,
{
    let mut combined: BTreeMap<IssueId, Vec<Observation>> = BTreeMap::new();
    for bundle in bundles {
        for (issue, observations) in bundle {
            combined
                .entry(*issue)
                .or_default()
                .extend(observations.iter().copied());
        }
    }

    combined
        .into_iter()
        .filter_map(|(issue, mut observations)| {
            observations.sort_by(|a, b| {
                a.weight()
                    .total_cmp(&b.weight())
                    .then_with(|| a.score().total_cmp(&b.score()))
            });
            let total_weight: f64 = observations.iter().map(Observation::weight).sum();
            if total_weight <= 0.0 {
                trace!(%issue, "no weighted evidence; omitting issue");
                return None;
            }
            let weighted_sum: f64 = observations
                .iter()
                .map(|observation| observation.weight() * observation.score())
                .sum();
            Some((
                issue,
                IssueResult {
                    confidence: round3(total_weight),
                    score: round3(weighted_sum / total_weight),
                },
            ))
        })
        .collect()
}

/// Round to three decimals. Values too large to carry a fractional part are returned as is.
fn round3(value: f64) -> f64 {
    let scaled = value * 1000.0;
    if !scaled.is_finite() || scaled.abs() >= 2f64.powi(52) {
        return value;
    }
    scaled.round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::MAX_WEIGHT;
    use proptest::prelude::*;

    fn obs(weight: f64, score: f64) -> Observation {
        Observation::new(weight, score).unwrap()
    }

    fn bundle(entries: &[(IssueId, f64, f64)]) -> EvidenceBundle {
        let mut bundle = EvidenceBundle::new();
        for (issue, weight, score) in entries {
            bundle.entry(*issue).or_default().push(obs(*weight, *score));
        }
        bundle
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let bundles: Vec<EvidenceBundle> = Vec::new();
        assert!(aggregate(&bundles).is_empty());
    }

    #[test]
    fn zero_weight_issue_is_omitted() {
        let bundles = vec![
            bundle(&[(IssueId::Pay, 0.0, 90.0), (IssueId::Environment, 2.0, 40.0)]),
            bundle(&[(IssueId::Pay, 0.0, 10.0)]),
        ];
        let result = aggregate(&bundles);
        assert!(!result.contains_key(&IssueId::Pay));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn single_observation_is_returned_unchanged() {
        let bundles = vec![bundle(&[(IssueId::Charity, 40.0, 72.5)])];
        let result = aggregate(&bundles);
        assert_eq!(
            result[&IssueId::Charity],
            IssueResult {
                confidence: 40.0,
                score: 72.5
            }
        );
    }

    #[test]
    fn equal_weights_average_scores() {
        let bundles = vec![
            bundle(&[(IssueId::Environment, 1.0, 80.0)]),
            bundle(&[(IssueId::Environment, 1.0, 60.0)]),
        ];
        let result = aggregate(&bundles);
        assert_eq!(
            result[&IssueId::Environment],
            IssueResult {
                confidence: 2.0,
                score: 70.0
            }
        );
    }

    #[test]
    fn heavier_sources_dominate() {
        let bundles = vec![
            bundle(&[(IssueId::Pay, 90.0, 60.0), (IssueId::Pay, 50.0, 65.0)]),
            bundle(&[(IssueId::Pay, 50.0, 60.0)]),
        ];
        let result = aggregate(&bundles);
        assert_eq!(result[&IssueId::Pay].confidence, 190.0);
        assert_eq!(result[&IssueId::Pay].score, 61.316);
    }

    #[test]
    fn rounding_never_overflows() {
        assert_eq!(round3(1e306), 1e306);
        assert_eq!(round3(f64::MAX), f64::MAX);
        assert_eq!(round3(12.34567), 12.346);
    }

    #[test]
    fn capped_weights_stay_finite() {
        let bundles = vec![
            bundle(&[(IssueId::Pay, MAX_WEIGHT, 40.0), (IssueId::Pay, MAX_WEIGHT, 60.0)]),
            bundle(&[(IssueId::Environment, MAX_WEIGHT, 50.0)]),
        ];
        let result = aggregate(&bundles);
        assert_eq!(
            result[&IssueId::Pay],
            IssueResult {
                confidence: 2.0 * MAX_WEIGHT,
                score: 50.0
            }
        );
        assert_eq!(result[&IssueId::Environment].confidence, MAX_WEIGHT);
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("null"));
    }

    fn observation_strategy() -> impl Strategy<Value = (usize, f64, f64)> {
        (0usize..IssueId::ALL.len(), 0.0f64..100.0, 0.0f64..=100.0)
    }

    fn bundles_strategy() -> impl Strategy<Value = Vec<EvidenceBundle>> {
        proptest::collection::vec(proptest::collection::vec(observation_strategy(), 0..8), 0..5)
            .prop_map(|raw| {
                raw.into_iter()
                    .map(|entries| {
                        let mut bundle = EvidenceBundle::new();
                        for (idx, weight, score) in entries {
                            bundle
                                .entry(IssueId::ALL[idx])
                                .or_default()
                                .push(obs(weight, score));
                        }
                        bundle
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn score_stays_within_observed_range(bundles in bundles_strategy()) {
            let result = aggregate(&bundles);
            for (issue, outcome) in result {
                let scores: Vec<f64> = bundles
                    .iter()
                    .filter_map(|bundle| bundle.get(&issue))
                    .flatten()
                    .filter(|observation| observation.weight() > 0.0)
                    .map(Observation::score)
                    .collect();
                let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
                let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(outcome.score >= min - 1e-3 && outcome.score <= max + 1e-3);
                prop_assert!(outcome.confidence >= 0.0);
            }
        }
    }

    proptest! {
        #[test]
        fn order_of_bundles_does_not_matter(
            (bundles, shuffled) in bundles_strategy()
                .prop_flat_map(|bundles| (Just(bundles.clone()), Just(bundles).prop_shuffle()))
        ) {
            prop_assert_eq!(aggregate(&bundles), aggregate(&shuffled));
        }
    }
}
