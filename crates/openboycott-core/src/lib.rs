pub mod aggregate;
pub mod clock;
pub mod competitors;
pub mod error;
pub mod evidence;
mod http;
pub mod issue;
pub mod llm;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod retry;
pub mod settings;
pub mod sink;
pub mod sources;
pub mod web;

pub use aggregate::aggregate;
pub use clock::{duration_until, Clock, ManualClock, SystemClock};
pub use competitors::{Competitor, CompetitorLookup};
pub use error::FetchError;
pub use evidence::{
    bundle_from_json, EvidenceBundle, EvidenceMap, IssueResult, Observation, ObservationError,
};
pub use issue::IssueId;
pub use pipeline::{analyze, CompanyOutcome, CompanyPipeline};
pub use record::{canonical_name, CompanyRecord};
pub use report::{render_batch, OutputFormat};
pub use retry::{Classify, ErrorClass, RetryPolicy};
pub use settings::{Credentials, ScoutSettings};
pub use sink::JsonFileSink;
pub use sources::{EvidenceSource, FetchMode, SourceEvidence};
