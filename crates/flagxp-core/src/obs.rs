//! Structured lifecycle events for a flagxp run.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Benign publish outcomes log at `info!`/`debug!`; rejected ones at `warn!`.

use tracing::{debug, info, warn};

use crate::extract::FlagKind;
use crate::publish::PublishOutcome;
use crate::review::ReviewId;
use crate::run::RunSummary;

/// Review-scoped span for a whole run.
///
/// Attach it with `tracing::Instrument` rather than entering it, since the run
/// awaits between events.
///
/// ```ignore
/// run(review).instrument(review_span(ReviewId(1234))).await;
/// // all events inside carry review = "D1234"
/// ```
pub fn review_span(review: ReviewId) -> tracing::Span {
    tracing::info_span!("flagxp.run", review = %review)
}

/// Emit event: review fetched.
pub fn emit_review_fetched(review: ReviewId, diffs: usize, participants: usize) {
    info!(
        event = "review.fetched",
        review = %review,
        diffs = diffs,
        participants = participants,
    );
}

/// Emit event: subscriber list resolved.
pub fn emit_subscribers_resolved(count: usize) {
    info!(event = "subscribers.resolved", count = count);
}

/// Emit event: a flag candidate will be processed.
pub fn emit_candidate(flag: &str, kind: FlagKind) {
    info!(event = "candidate.found", flag = %flag, kind = %kind);
}

/// Emit event: dry run, nothing sent for this candidate.
pub fn emit_dry_run(flag: &str, document: &str) {
    info!(event = "candidate.dry_run", flag = %flag, document = %document);
}

/// Emit event: the experiment service answered a request.
pub fn emit_publish_outcome(step: &str, flag: &str, outcome: &PublishOutcome) {
    match outcome {
        PublishOutcome::Accepted => {
            info!(event = "publish.accepted", step = %step, flag = %flag, status = 200u16);
        }
        PublishOutcome::NotFound => {
            info!(event = "publish.not_found", step = %step, flag = %flag, status = 404u16);
        }
        PublishOutcome::AlreadyExists => {
            debug!(event = "publish.already_exists", step = %step, flag = %flag, status = 406u16);
        }
        PublishOutcome::Rejected { status, message } => {
            warn!(
                event = "publish.rejected",
                step = %step,
                flag = %flag,
                status = *status,
                message = %message,
            );
        }
    }
}

/// Emit event: transport failure talking to the experiment service.
pub fn emit_publish_failed(step: &str, flag: &str, error: &dyn std::fmt::Display) {
    warn!(event = "publish.failed", step = %step, flag = %flag, error = %error);
}

/// Emit event: run finished with per-outcome counts.
pub fn emit_run_finished(review: ReviewId, summary: &RunSummary) {
    info!(
        event = "run.finished",
        review = %review,
        candidates = summary.experiments.len(),
        created = summary.created,
        existing = summary.existing,
        rejected = summary.rejected,
        subscribe_rejected = summary.subscribe_rejected,
        failed = summary.failed,
        planned = summary.planned,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_span_create() {
        let span = review_span(ReviewId(1));
        let _entered = span.enter();
    }

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        emit_candidate("f", FlagKind::Standard);
        emit_publish_outcome("create", "f", &PublishOutcome::AlreadyExists);
        emit_publish_outcome(
            "create",
            "f",
            &PublishOutcome::Rejected {
                status: 500,
                message: "boom".to_string(),
            },
        );
        emit_publish_failed("subscribe", "f", &"connection refused");
    }
}
