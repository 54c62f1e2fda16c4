//! Fixed substitute data served by sources in [`FetchMode::Offline`](super::FetchMode).

use crate::evidence::{EvidenceBundle, Observation};
use crate::issue::IssueId;

fn bundle(entries: &[(IssueId, f64, f64)]) -> EvidenceBundle {
    entries
        .iter()
        .filter_map(|(issue, weight, score)| {
            Observation::new(*weight, *score)
                .ok()
                .map(|observation| (*issue, vec![observation]))
        })
        .collect()
}

pub fn financial() -> EvidenceBundle {
    bundle(&[(IssueId::Environment, 80.0, 75.0), (IssueId::Pay, 50.0, 65.0)])
}

pub fn search(company: &str) -> EvidenceBundle {
    if company.trim().is_empty() {
        return EvidenceBundle::new();
    }
    bundle(&[
        (IssueId::DeiLeadership, 50.0, 20.0),
        (IssueId::DeiHiring, 60.0, 30.0),
        (IssueId::Queer, 70.0, 40.0),
        (IssueId::Bipoc, 80.0, 50.0),
        (IssueId::Pay, 90.0, 60.0),
    ])
}

pub fn grounded(company: &str) -> EvidenceBundle {
    if company.trim().is_empty() {
        return EvidenceBundle::new();
    }
    bundle(&[
        (IssueId::DeiLeadership, 50.0, 75.0),
        (IssueId::DeiHiring, 50.0, 80.0),
        (IssueId::Queer, 50.0, 70.0),
        (IssueId::Bipoc, 50.0, 65.0),
        (IssueId::Pay, 50.0, 60.0),
        (IssueId::Environment, 50.0, 85.0),
    ])
}
