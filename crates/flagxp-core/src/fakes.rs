//! In-memory review source (testing only)
//!
//! `MemoryReviewSource` satisfies the [`ReviewSource`] contract without
//! spawning `arc`, and records which diffs and users were looked up.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{FetchError, Result};
use crate::review::{ReviewId, ReviewRecord, ReviewSource};

/// Review source backed by hash maps.
#[derive(Debug, Default)]
pub struct MemoryReviewSource {
    reviews: HashMap<u64, ReviewRecord>,
    diffs: HashMap<u64, String>,
    emails: HashMap<String, String>,
    diff_lookups: Mutex<Vec<u64>>,
}

impl MemoryReviewSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a review with an author, reviewers, ccs and diffs.
    pub fn with_review(
        mut self,
        id: u64,
        author: &str,
        reviewers: &[&str],
        ccs: &[&str],
        diffs: &[u64],
    ) -> Self {
        let record = ReviewRecord {
            id,
            author_phid: author.to_string(),
            reviewers: reviewers.iter().map(|s| s.to_string()).collect(),
            ccs: ccs.iter().map(|s| s.to_string()).collect(),
            diffs: diffs.iter().copied().collect::<BTreeSet<_>>(),
        };
        self.reviews.insert(id, record);
        self
    }

    pub fn with_diff(mut self, diff_id: u64, raw: &str) -> Self {
        self.diffs.insert(diff_id, raw.to_string());
        self
    }

    pub fn with_user(mut self, phid: &str, email: &str) -> Self {
        self.emails.insert(phid.to_string(), email.to_string());
        self
    }

    /// Diff ids fetched so far, in call order.
    pub fn diff_lookups(&self) -> Vec<u64> {
        self.diff_lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewSource for MemoryReviewSource {
    async fn fetch_review(&self, id: ReviewId) -> Result<ReviewRecord> {
        self.reviews
            .get(&id.0)
            .cloned()
            .ok_or(FetchError::ReviewNotFound(id.0))
    }

    async fn fetch_raw_diff(&self, diff_id: u64) -> Result<String> {
        self.diff_lookups.lock().unwrap().push(diff_id);
        self.diffs
            .get(&diff_id)
            .cloned()
            .ok_or_else(|| FetchError::EmptyResponse {
                method: format!("differential.getrawdiff({diff_id})"),
            })
    }

    async fn resolve_email(&self, phid: &str) -> Result<Option<String>> {
        Ok(self.emails.get(phid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::collect_subscribers;

    const BOT: &str = "infra+jenkins@uber.com";

    #[tokio::test]
    async fn test_unknown_review_is_not_found() {
        let source = MemoryReviewSource::new();
        let err = source.fetch_review(ReviewId(5)).await.unwrap_err();
        assert!(matches!(err, FetchError::ReviewNotFound(5)));
    }

    #[tokio::test]
    async fn test_subscribers_skip_gaps_and_automation() {
        let source = MemoryReviewSource::new()
            .with_review(1, "D", &["A", "B"], &["C"], &[])
            .with_user("A", "a@example.com")
            .with_user("C", BOT)
            .with_user("D", "d@example.com");
        let record = source.fetch_review(ReviewId(1)).await.unwrap();

        let emails = collect_subscribers(&source, &record, BOT).await.unwrap();
        assert_eq!(emails, vec!["d@example.com", "a@example.com"]);
    }

    #[tokio::test]
    async fn test_subscribers_are_deduplicated() {
        let source = MemoryReviewSource::new()
            .with_review(1, "D", &["A", "D"], &["A"], &[])
            .with_user("A", "a@example.com")
            .with_user("D", "d@example.com");
        let record = source.fetch_review(ReviewId(1)).await.unwrap();

        let emails = collect_subscribers(&source, &record, BOT).await.unwrap();
        assert_eq!(emails, vec!["d@example.com", "a@example.com"]);
    }

    #[tokio::test]
    async fn test_automation_address_compared_case_insensitively() {
        let source = MemoryReviewSource::new()
            .with_review(1, "D", &[], &["C"], &[])
            .with_user("C", "Infra+Jenkins@Uber.com")
            .with_user("D", "d@example.com");
        let record = source.fetch_review(ReviewId(1)).await.unwrap();

        let emails = collect_subscribers(&source, &record, BOT).await.unwrap();
        assert_eq!(emails, vec!["d@example.com"]);
    }

    #[tokio::test]
    async fn test_diff_lookups_recorded() {
        let source = MemoryReviewSource::new().with_diff(3, "+ x");
        source.fetch_raw_diff(3).await.unwrap();
        assert!(source.fetch_raw_diff(4).await.is_err());
        assert_eq!(source.diff_lookups(), vec![3, 4]);
    }
}
