//! Review records and the review-system seam.
//!
//! [`ReviewSource`] is the only way the rest of the crate talks to the review
//! system. [`ConduitClient`](crate::conduit::ConduitClient) implements it over
//! `arc call-conduit`; [`MemoryReviewSource`](crate::fakes::MemoryReviewSource)
//! implements it for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::Result;

/// Numeric id of a review (a Differential revision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReviewId(pub u64);

/// Error parsing a [`ReviewId`] from user input.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid review id {input:?}: expected a number like 1234 or D1234")]
pub struct ReviewIdError {
    pub input: String,
}

impl FromStr for ReviewId {
    type Err = ReviewIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('D')
            .or_else(|| trimmed.strip_prefix('d'))
            .unwrap_or(trimmed);
        digits.parse::<u64>().map(ReviewId).map_err(|_| ReviewIdError {
            input: s.to_string(),
        })
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// One review as returned by `differential.query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(deserialize_with = "de_numeric_id")]
    pub id: u64,

    #[serde(rename = "authorPHID")]
    pub author_phid: String,

    #[serde(default, deserialize_with = "de_phid_list")]
    pub reviewers: Vec<String>,

    #[serde(default, deserialize_with = "de_phid_list")]
    pub ccs: Vec<String>,

    /// Diff ids, ascending.
    #[serde(default, deserialize_with = "de_numeric_ids")]
    pub diffs: BTreeSet<u64>,
}

impl ReviewRecord {
    /// Everyone who should hear about experiments created from this review:
    /// the author, then reviewers, then ccs.
    pub fn participants(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.author_phid.as_str())
            .chain(self.reviewers.iter().map(String::as_str))
            .chain(self.ccs.iter().map(String::as_str))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumericId {
    Number(u64),
    Text(String),
}

impl NumericId {
    fn into_u64<E: serde::de::Error>(self) -> std::result::Result<u64, E> {
        match self {
            NumericId::Number(n) => Ok(n),
            NumericId::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected numeric id, got {s:?}"))),
        }
    }
}

fn de_numeric_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    NumericId::deserialize(deserializer)?.into_u64()
}

fn de_numeric_ids<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<NumericId>::deserialize(deserializer)?
        .into_iter()
        .map(NumericId::into_u64::<D::Error>)
        .collect()
}

// Conduit renders an empty PHID collection as `[]` and a populated one as a
// `{phid: phid}` object.
#[derive(Deserialize)]
#[serde(untagged)]
enum PhidList {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

fn de_phid_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match PhidList::deserialize(deserializer)? {
        PhidList::List(phids) => phids,
        PhidList::Map(phids) => phids.into_values().collect(),
    })
}

/// Read access to the review system.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Fetch a review. A review that does not exist is
    /// [`FetchError::ReviewNotFound`](crate::error::FetchError::ReviewNotFound).
    async fn fetch_review(&self, id: ReviewId) -> Result<ReviewRecord>;

    /// Fetch the raw unified diff text of one diff.
    async fn fetch_raw_diff(&self, diff_id: u64) -> Result<String>;

    /// Resolve a user PHID to an email. `Ok(None)` when the user no longer
    /// exists.
    async fn resolve_email(&self, phid: &str) -> Result<Option<String>>;
}

/// Resolve the subscriber list for a review.
///
/// Unresolvable participants are skipped, the automation address is dropped
/// (compared case-insensitively), and duplicates keep their first position.
pub async fn collect_subscribers(
    source: &dyn ReviewSource,
    record: &ReviewRecord,
    automation_email: &str,
) -> Result<Vec<String>> {
    let mut emails: Vec<String> = Vec::new();

    for phid in record.participants() {
        let Some(email) = source.resolve_email(phid).await? else {
            debug!(phid = %phid, "participant did not resolve to an email, skipping");
            continue;
        };

        if email.eq_ignore_ascii_case(automation_email) {
            continue;
        }
        if !emails.iter().any(|e| e.eq_ignore_ascii_case(&email)) {
            emails.push(email);
        }
    }

    Ok(emails)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_review_id_parse() {
        assert_eq!("1234".parse::<ReviewId>(), Ok(ReviewId(1234)));
        assert_eq!("D1234".parse::<ReviewId>(), Ok(ReviewId(1234)));
        assert_eq!(" d42 ".parse::<ReviewId>(), Ok(ReviewId(42)));
        assert!("".parse::<ReviewId>().is_err());
        assert!("D".parse::<ReviewId>().is_err());
        assert!("abc".parse::<ReviewId>().is_err());
        assert!("-3".parse::<ReviewId>().is_err());
    }

    #[test]
    fn test_review_id_display() {
        assert_eq!(ReviewId(77).to_string(), "D77");
    }

    #[test]
    fn test_review_record_accepts_string_ids_and_lists() {
        let record: ReviewRecord = serde_json::from_value(json!({
            "id": "1234",
            "authorPHID": "PHID-USER-author",
            "reviewers": ["PHID-USER-a", "PHID-USER-b"],
            "ccs": [],
            "diffs": ["20", "7", 13],
            "title": "ignored"
        }))
        .unwrap();

        assert_eq!(record.id, 1234);
        assert_eq!(record.reviewers, vec!["PHID-USER-a", "PHID-USER-b"]);
        assert!(record.ccs.is_empty());
        assert_eq!(record.diffs.iter().copied().collect::<Vec<_>>(), vec![7, 13, 20]);
    }

    #[test]
    fn test_review_record_accepts_phid_maps() {
        let record: ReviewRecord = serde_json::from_value(json!({
            "id": 9,
            "authorPHID": "PHID-USER-author",
            "reviewers": {"PHID-USER-a": "PHID-USER-a"},
            "ccs": {"PHID-USER-c": "PHID-USER-c"},
            "diffs": []
        }))
        .unwrap();

        assert_eq!(record.reviewers, vec!["PHID-USER-a"]);
        assert_eq!(record.ccs, vec!["PHID-USER-c"]);
    }

    #[test]
    fn test_review_record_rejects_non_numeric_diff() {
        let result: std::result::Result<ReviewRecord, _> = serde_json::from_value(json!({
            "id": 9,
            "authorPHID": "PHID-USER-author",
            "diffs": ["abc"]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_participants_order() {
        let record = ReviewRecord {
            id: 1,
            author_phid: "D".to_string(),
            reviewers: vec!["A".to_string(), "B".to_string()],
            ccs: vec!["C".to_string()],
            diffs: BTreeSet::new(),
        };
        let order: Vec<&str> = record.participants().collect();
        assert_eq!(order, vec!["D", "A", "B", "C"]);
    }
}
