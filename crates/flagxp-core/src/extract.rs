//! Feature-flag extraction from raw diff text.
//!
//! Two call shapes are recognised:
//! - `isFeatureFlagEnabled(a.b.FLAG, true)` - a standard flag check
//! - `isOptimisticFeatureFlagEnabled(a.b.FLAG)` - an optimistic flag check
//!
//! Matched identifiers are normalised to their lower-cased last segment, so
//! `foo.bar.MY_FLAG` and `MY_FLAG` collapse into the same candidate.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The flavour of flag check a candidate was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    #[serde(rename = "feature_flag")]
    Standard,
    #[serde(rename = "optimistic_feature_flag")]
    Optimistic,
}

impl FlagKind {
    /// Label sent to the experiment service as the rollout's experiment type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Standard => "feature_flag",
            FlagKind::Optimistic => "optimistic_feature_flag",
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn standard_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"isFeatureFlagEnabled\s*\(\s*([\w.]+)\s*,\s*true\s*\)")
            .expect("standard flag pattern is valid")
    })
}

fn optimistic_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"isOptimisticFeatureFlagEnabled\s*\(\s*([\w.]+)\s*\)")
            .expect("optimistic flag pattern is valid")
    })
}

/// Reduce a dotted flag expression to its canonical name.
///
/// Returns `None` when the expression ends in a dot and has no usable name.
pub fn normalize_flag(expression: &str) -> Option<String> {
    let last = expression.rsplit('.').next().unwrap_or(expression);
    if last.is_empty() {
        None
    } else {
        Some(last.to_lowercase())
    }
}

/// Look for a flag check on a single line.
///
/// The standard pattern wins when both would match. Callers must only pass
/// added lines; see [`is_added_line`].
pub fn extract(line: &str) -> Option<(FlagKind, String)> {
    if let Some(caps) = standard_pattern().captures(line) {
        return normalize_flag(&caps[1]).map(|name| (FlagKind::Standard, name));
    }
    if let Some(caps) = optimistic_pattern().captures(line) {
        return normalize_flag(&caps[1]).map(|name| (FlagKind::Optimistic, name));
    }
    None
}

/// Whether a unified-diff line is an addition.
///
/// The `+++` half of a file header also starts with `+`; [`scan_diff`] skips
/// those by looking at the line before.
pub fn is_added_line(line: &str) -> bool {
    line.starts_with('+')
}

/// `+++ b/path` only counts as a header directly after `--- a/path`.
fn is_new_file_header(previous: Option<&str>, line: &str) -> bool {
    line.starts_with("+++ ") && previous.is_some_and(|p| p.starts_with("--- "))
}

/// Extract every flag check from the added lines of one raw diff, in order.
pub fn scan_diff(raw_diff: &str) -> Vec<(FlagKind, String)> {
    let mut found = Vec::new();
    let mut previous = None;
    for line in raw_diff.lines() {
        if is_added_line(line) && !is_new_file_header(previous, line) {
            found.extend(extract(line));
        }
        previous = Some(line);
    }
    found
}

/// Unique experiment candidates keyed by normalised flag name.
///
/// Iteration is in flag-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    flags: BTreeMap<String, FlagKind>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a flag. The latest kind wins; the previous kind is returned when
    /// it differed.
    pub fn insert(&mut self, kind: FlagKind, name: String) -> Option<FlagKind> {
        match self.flags.insert(name, kind) {
            Some(previous) if previous != kind => Some(previous),
            _ => None,
        }
    }

    /// Merge every flag found in one raw diff.
    pub fn add_diff(&mut self, raw_diff: &str) {
        for (kind, name) in scan_diff(raw_diff) {
            if let Some(previous) = self.insert(kind, name.clone()) {
                warn!(
                    event = "candidate.kind_changed",
                    flag = %name,
                    previous = %previous,
                    current = %kind,
                    "flag checked with two different kinds; keeping the later one"
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<FlagKind> {
        self.flags.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FlagKind)> + '_ {
        self.flags.iter().map(|(name, kind)| (name.as_str(), *kind))
    }
}

/// Build the candidate set for a sequence of raw diffs, scanned in order.
pub fn collect_candidates<'a, I>(raw_diffs: I) -> CandidateSet
where
    I: IntoIterator<Item = &'a str>,
{
    let mut candidates = CandidateSet::new();
    for raw_diff in raw_diffs {
        candidates.add_diff(raw_diff);
    }
    candidates
}
