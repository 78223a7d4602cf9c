//! Conduit client backed by `arc call-conduit`.
//!
//! Each call spawns `arc call-conduit --conduit-uri <uri> <method>`, writes the
//! JSON parameters to stdin and parses the JSON envelope from stdout.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tracing::debug;

use crate::error::{FetchError, Result};
use crate::review::{ReviewId, ReviewRecord, ReviewSource};

pub const DEFAULT_CONDUIT_URI: &str = "https://code.uberinternal.com/";
pub const DEFAULT_ARC_BIN: &str = "arc";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Conduit client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConduitConfig {
    /// Conduit endpoint passed to `--conduit-uri`
    pub conduit_uri: String,
    /// Path or name of the `arc` executable
    pub arc_bin: PathBuf,
    /// Upper bound on a single call
    pub timeout: Duration,
}

impl Default for ConduitConfig {
    fn default() -> Self {
        ConduitConfig {
            conduit_uri: DEFAULT_CONDUIT_URI.to_string(),
            arc_bin: PathBuf::from(DEFAULT_ARC_BIN),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConduitConfig {
    pub fn with_conduit_uri(mut self, uri: &str) -> Self {
        self.conduit_uri = uri.to_string();
        self
    }

    pub fn with_arc_bin(mut self, arc_bin: impl Into<PathBuf>) -> Self {
        self.arc_bin = arc_bin.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response envelope printed by `arc call-conduit`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    #[serde(default, alias = "error_code")]
    error: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    email: String,
}

/// [`ReviewSource`] that shells out to `arc call-conduit`.
#[derive(Debug, Clone)]
pub struct ConduitClient {
    config: ConduitConfig,
}

impl ConduitClient {
    pub fn new(config: ConduitConfig) -> Self {
        ConduitClient { config }
    }

    /// Invoke one Conduit method and decode its `response` field.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<T> {
        let program = self.config.arc_bin.display().to_string();
        debug!(method = %method, program = %program, "calling conduit");

        let mut child = Command::new(&self.config.arc_bin)
            .args(["call-conduit", "--conduit-uri", &self.config.conduit_uri, method])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FetchError::Spawn { program, source })?;

        let body = serde_json::to_vec(params)?;
        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(stdin) = stdin {
                write_params(stdin, &body).await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| FetchError::Timeout {
                method: method.to_string(),
                timeout: self.config.timeout,
            })??;

        if !output.status.success() {
            return Err(FetchError::CommandFailed {
                method: method.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let envelope: Envelope<T> = serde_json::from_slice(&output.stdout)?;
        if let Some(code) = envelope.error {
            return Err(FetchError::Conduit {
                method: method.to_string(),
                code,
                message: envelope.error_message.unwrap_or_default(),
            });
        }

        envelope.response.ok_or_else(|| FetchError::EmptyResponse {
            method: method.to_string(),
        })
    }
}

/// Feed the parameters to `arc` and close its stdin.
///
/// `arc` may exit before reading anything (bad credentials, usage errors). The
/// resulting broken pipe is ignored so the exit status and stderr get reported.
async fn write_params(mut stdin: ChildStdin, body: &[u8]) -> std::io::Result<()> {
    let written = async {
        stdin.write_all(body).await?;
        stdin.shutdown().await
    }
    .await;

    match written {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("arc closed stdin before reading the parameters");
            Ok(())
        }
        other => other,
    }
}

#[async_trait]
impl ReviewSource for ConduitClient {
    async fn fetch_review(&self, id: ReviewId) -> Result<ReviewRecord> {
        let records: Vec<ReviewRecord> = self
            .call("differential.query", &json!({ "ids": [id.0] }))
            .await?;
        records
            .into_iter()
            .next()
            .ok_or(FetchError::ReviewNotFound(id.0))
    }

    async fn fetch_raw_diff(&self, diff_id: u64) -> Result<String> {
        self.call("differential.getrawdiff", &json!({ "diffID": diff_id }))
            .await
    }

    async fn resolve_email(&self, phid: &str) -> Result<Option<String>> {
        let users: Vec<UserRecord> = self.call("user.query", &json!({ "phids": [phid] })).await?;
        Ok(users.into_iter().next().map(|user| user.email))
    }
}
