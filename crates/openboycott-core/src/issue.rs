use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix the LLM tool declarations append to each issue id.
pub const FUNCTION_SUFFIX: &str = "_INDEX";

/// Tracked social/environmental issue. The catalogue is closed and fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueId {
    #[serde(rename = "DEI_L")]
    DeiLeadership,
    #[serde(rename = "DEI_H")]
    DeiHiring,
    #[serde(rename = "QUEER")]
    Queer,
    #[serde(rename = "BIPOC")]
    Bipoc,
    #[serde(rename = "PAY")]
    Pay,
    #[serde(rename = "ENV")]
    Environment,
    #[serde(rename = "CHARITY")]
    Charity,
    #[serde(rename = "POLI")]
    Politics,
}

impl IssueId {
    /// Every issue, in catalogue order.
    pub const ALL: [IssueId; 8] = [
        IssueId::DeiLeadership,
        IssueId::DeiHiring,
        IssueId::Queer,
        IssueId::Bipoc,
        IssueId::Pay,
        IssueId::Environment,
        IssueId::Charity,
        IssueId::Politics,
    ];

    /// Short identifier used in output documents and prompts.
    pub fn code(self) -> &'static str {
        match self {
            IssueId::DeiLeadership => "DEI_L",
            IssueId::DeiHiring => "DEI_H",
            IssueId::Queer => "QUEER",
            IssueId::Bipoc => "BIPOC",
            IssueId::Pay => "PAY",
            IssueId::Environment => "ENV",
            IssueId::Charity => "CHARITY",
            IssueId::Politics => "POLI",
        }
    }

    /// Human-readable description, also used as the search phrase.
    pub fn description(self) -> &'static str {
        match self {
            IssueId::DeiLeadership => "DEI in leadership",
            IssueId::DeiHiring => "DEI in hiring",
            IssueId::Queer => "LGBTQ support",
            IssueId::Bipoc => "BIPOC support",
            IssueId::Pay => "Fair wages",
            IssueId::Environment => "Environmental impact",
            IssueId::Charity => "Charitable donations",
            IssueId::Politics => "Progressive political engagement",
        }
    }

    /// Name of the function declaration the model calls to report this issue.
    pub fn function_name(self) -> String {
        format!("{}{}", self.code(), FUNCTION_SUFFIX)
    }

    /// Resolve a model function-call name (`ENV_INDEX`) or a bare code (`ENV`).
    pub fn from_function_name(name: &str) -> Result<Self, UnknownIssue> {
        let trimmed = name.trim();
        let code = trimmed.strip_suffix(FUNCTION_SUFFIX).unwrap_or(trimmed);
        code.parse()
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for IssueId {
    type Err = UnknownIssue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        IssueId::ALL
            .into_iter()
            .find(|issue| issue.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownIssue(wanted.to_string()))
    }
}

/// Raised when a collaborator reports an issue outside the catalogue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown issue id `{0}`")]
pub struct UnknownIssue(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_from_str() {
        for issue in IssueId::ALL {
            assert_eq!(issue.code().parse::<IssueId>().unwrap(), issue);
        }
    }

    #[test]
    fn function_names_resolve_back_to_issue() {
        assert_eq!(
            IssueId::from_function_name("ENV_INDEX").unwrap(),
            IssueId::Environment
        );
        assert_eq!(
            IssueId::from_function_name("dei_l").unwrap(),
            IssueId::DeiLeadership
        );
        assert_eq!(IssueId::Pay.function_name(), "PAY_INDEX");
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let err = "WATER".parse::<IssueId>().unwrap_err();
        assert_eq!(err, UnknownIssue("WATER".into()));
    }

    #[test]
    fn serializes_as_short_code() {
        let json = serde_json::to_string(&IssueId::Environment).unwrap();
        assert_eq!(json, "\"ENV\"");
        let back: IssueId = serde_json::from_str("\"DEI_H\"").unwrap();
        assert_eq!(back, IssueId::DeiHiring);
    }
}
