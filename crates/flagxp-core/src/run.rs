//! One pass over one review: fetch, extract, build, publish, subscribe.
//!
//! Fetch failures abort the run before anything is published. Publish
//! failures are contained to the candidate they happened on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::Result;
use crate::extract::{CandidateSet, FlagKind};
use crate::obs;
use crate::payload;
use crate::publish::{ExperimentClient, PublishOutcome};
use crate::review::{collect_subscribers, ReviewId, ReviewSource};

pub const DEFAULT_PLATFORM: &str = "rider";
pub const DEFAULT_AUTOMATION_EMAIL: &str = "infra+jenkins@uber.com";

/// Per-run knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// App targeted by the rollout segment
    pub platform: String,
    /// Address never subscribed to experiments
    pub automation_email: String,
    /// Build and log documents without sending anything
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            platform: DEFAULT_PLATFORM.to_string(),
            automation_email: DEFAULT_AUTOMATION_EMAIL.to_string(),
            dry_run: false,
        }
    }
}

/// What happened to one publish step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// The service answered.
    Completed { outcome: PublishOutcome },
    /// The request never got an answer.
    Failed { error: String },
    DryRun,
    /// Not attempted because an earlier step failed.
    Skipped,
}

/// Outcome for one flag candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub flag: String,
    pub kind: FlagKind,
    pub create: StepStatus,
    pub subscribe: StepStatus,
}

impl ExperimentReport {
    fn failed(&self) -> bool {
        matches!(self.create, StepStatus::Failed { .. })
            || matches!(self.subscribe, StepStatus::Failed { .. })
    }
}

/// Machine-readable result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub review: ReviewId,
    pub subscribers: usize,
    pub experiments: Vec<ExperimentReport>,
    /// Create accepted
    pub created: usize,
    /// Create answered 404 or 406
    pub existing: usize,
    /// Create answered another non-200 status
    pub rejected: usize,
    /// Subscribe answered a non-200 status other than 404 or 406
    pub subscribe_rejected: usize,
    /// A transport failure on either step
    pub failed: usize,
    /// Dry-run candidates
    pub planned: usize,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(review: ReviewId, subscribers: usize, experiments: Vec<ExperimentReport>) -> Self {
        let (mut created, mut existing, mut rejected, mut failed, mut planned) = (0, 0, 0, 0, 0);
        let mut subscribe_rejected = 0;

        for report in &experiments {
            if report.failed() {
                failed += 1;
                continue;
            }
            match &report.create {
                StepStatus::Completed { outcome } => match outcome {
                    PublishOutcome::Accepted => created += 1,
                    PublishOutcome::NotFound | PublishOutcome::AlreadyExists => existing += 1,
                    PublishOutcome::Rejected { .. } => rejected += 1,
                },
                StepStatus::DryRun => planned += 1,
                StepStatus::Failed { .. } | StepStatus::Skipped => {}
            }
            if let StepStatus::Completed {
                outcome: PublishOutcome::Rejected { .. },
            } = &report.subscribe
            {
                subscribe_rejected += 1;
            }
        }

        Self {
            review,
            subscribers,
            experiments,
            created,
            existing,
            rejected,
            subscribe_rejected,
            failed,
            planned,
            finished_at: Utc::now(),
        }
    }
}

/// Run the whole pipeline for one review.
///
/// Candidates are processed in flag-name order, each exactly once.
pub async fn run_review(
    source: &dyn ReviewSource,
    client: &ExperimentClient,
    review: ReviewId,
    options: &RunOptions,
) -> Result<RunSummary> {
    run_inner(source, client, review, options)
        .instrument(obs::review_span(review))
        .await
}

async fn run_inner(
    source: &dyn ReviewSource,
    client: &ExperimentClient,
    review: ReviewId,
    options: &RunOptions,
) -> Result<RunSummary> {
    let record = source.fetch_review(review).await?;
    obs::emit_review_fetched(review, record.diffs.len(), record.participants().count());

    let mut candidates = CandidateSet::new();
    for diff_id in &record.diffs {
        let raw = source.fetch_raw_diff(*diff_id).await?;
        candidates.add_diff(&raw);
    }

    if candidates.is_empty() {
        tracing::info!(review = %review, "no feature flags added in this review");
        let summary = RunSummary::new(review, 0, Vec::new());
        obs::emit_run_finished(review, &summary);
        return Ok(summary);
    }

    let subscribers = collect_subscribers(source, &record, &options.automation_email).await?;
    obs::emit_subscribers_resolved(subscribers.len());

    let mut reports = Vec::with_capacity(candidates.len());
    for (flag, kind) in candidates.iter() {
        reports.push(publish_candidate(client, flag, kind, &subscribers, options).await);
    }

    let summary = RunSummary::new(review, subscribers.len(), reports);
    obs::emit_run_finished(review, &summary);
    Ok(summary)
}

async fn publish_candidate(
    client: &ExperimentClient,
    flag: &str,
    kind: FlagKind,
    subscribers: &[String],
    options: &RunOptions,
) -> ExperimentReport {
    obs::emit_candidate(flag, kind);
    let document = payload::build(flag, &options.platform, kind.as_str());

    let report = |create, subscribe| ExperimentReport {
        flag: flag.to_string(),
        kind,
        create,
        subscribe,
    };

    if options.dry_run {
        let rendered = serde_json::to_string(&document).unwrap_or_default();
        obs::emit_dry_run(flag, &rendered);
        return report(StepStatus::DryRun, StepStatus::DryRun);
    }

    let create = match client.create_experiment(&document).await {
        Ok(outcome) => StepStatus::Completed { outcome },
        Err(err) => {
            obs::emit_publish_failed("create", flag, &err);
            let failed = StepStatus::Failed {
                error: err.to_string(),
            };
            return report(failed, StepStatus::Skipped);
        }
    };

    let subscribe = match client.add_subscribers(flag, subscribers).await {
        Ok(outcome) => StepStatus::Completed { outcome },
        Err(err) => {
            obs::emit_publish_failed("subscribe", flag, &err);
            StepStatus::Failed {
                error: err.to_string(),
            }
        }
    };

    report(create, subscribe)
}
