use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::competitors::Competitor;
use crate::evidence::IssueResult;
use crate::issue::IssueId;

/// Aggregated scores for one analyzed company, as persisted in the output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub canonical_name: String,
    pub full_name: String,
    pub metrics: BTreeMap<IssueId, IssueResult>,
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    /// Links consulted while gathering evidence.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

/// Lower-cased company name with everything outside `[a-z0-9]` removed.
pub fn canonical_name(company: &str) -> String {
    company
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_keep_only_ascii_alphanumerics() {
        assert_eq!(canonical_name("Apple"), "apple");
        assert_eq!(canonical_name("  Procter & Gamble Co. "), "proctergambleco");
        assert_eq!(canonical_name("3M"), "3m");
        assert_eq!(canonical_name("Nestlé"), "nestl");
        assert_eq!(canonical_name("!!"), "");
    }

    #[test]
    fn record_serializes_issue_keys_in_catalogue_order() {
        let record = CompanyRecord {
            canonical_name: "acme".into(),
            full_name: "Acme".into(),
            metrics: BTreeMap::from([
                (
                    IssueId::Environment,
                    IssueResult {
                        confidence: 1.0,
                        score: 2.0,
                    },
                ),
                (
                    IssueId::DeiLeadership,
                    IssueResult {
                        confidence: 3.0,
                        score: 4.0,
                    },
                ),
            ]),
            competitors: vec![Competitor::Name("Globex".into())],
            sources: Vec::new(),
            timestamp: 42,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"canonical_name":"acme","full_name":"Acme","metrics":{"DEI_L":{"confidence":3.0,"score":4.0},"ENV":{"confidence":1.0,"score":2.0}},"competitors":["Globex"],"sources":[],"timestamp":42}"#
        );
        let parsed: CompanyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
