//! flagxp Core Library
//!
//! Finds feature flags added in a code review and registers an experiment for
//! each one with the experiment service, subscribing the review's
//! participants.
//!
//! Pipeline: [`ReviewSource`] → [`extract`] → [`payload::build`] →
//! [`ExperimentClient`], driven by [`run_review`].

pub mod conduit;
pub mod error;
pub mod extract;
pub mod fakes;
pub mod obs;
pub mod payload;
pub mod publish;
pub mod review;
pub mod run;
pub mod telemetry;

pub use conduit::{ConduitClient, ConduitConfig};
pub use error::{FetchError, PublishError, Result};
pub use extract::{collect_candidates, extract, is_added_line, scan_diff, CandidateSet, FlagKind};
pub use payload::{build, ExperimentDocument, TreatmentGroup};
pub use publish::{ExperimentClient, PublishOutcome, PublisherConfig};
pub use review::{collect_subscribers, ReviewId, ReviewIdError, ReviewRecord, ReviewSource};
pub use run::{run_review, ExperimentReport, RunOptions, RunSummary, StepStatus};
pub use telemetry::init_tracing;

/// flagxp version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
