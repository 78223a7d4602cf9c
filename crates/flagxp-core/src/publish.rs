//! Experiment service client.
//!
//! Two calls, both fire-and-forget:
//! - `POST /experiment/management/` creates an experiment from an
//!   [`ExperimentDocument`]
//! - `POST /follow/{experiment}` subscribes emails to it
//!
//! Any HTTP response is classified into a [`PublishOutcome`]; only transport
//! failures are errors.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::obs;
use crate::payload::ExperimentDocument;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:4465";
pub const DEFAULT_REQUESTER_EMAIL: &str = "xp@uber.com";
pub const DEFAULT_SOURCE_TAG: &str = "web-toolshed";
pub const NOTIFY_SQUELCH: &str = "squelch";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";
const MAX_MESSAGE_LEN: usize = 512;

/// Experiment service client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Service root, e.g. `http://localhost:4465`
    pub base_url: String,
    /// Sent as `X-Auth-Params-Email`
    pub requester_email: String,
    /// Sent as `X-Uber-Source`
    pub source_tag: String,
    /// Sent as `X-Uber-Notify`
    pub notify: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            base_url: DEFAULT_SERVICE_URL.to_string(),
            requester_email: DEFAULT_REQUESTER_EMAIL.to_string(),
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            notify: NOTIFY_SQUELCH.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PublisherConfig {
    /// Config for a specific service root
    pub fn new(base_url: &str) -> Self {
        PublisherConfig {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_requester_email(mut self, email: &str) -> Self {
        self.requester_email = email.to_string();
        self
    }

    pub fn with_source_tag(mut self, tag: &str) -> Self {
        self.source_tag = tag.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How the experiment service answered a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// HTTP 200
    Accepted,
    /// HTTP 404: the server-side management lookup found nothing
    NotFound,
    /// HTTP 406: the experiment exists already
    AlreadyExists,
    /// Any other status
    Rejected { status: u16, message: String },
}

impl PublishOutcome {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            200 => PublishOutcome::Accepted,
            404 => PublishOutcome::NotFound,
            406 => PublishOutcome::AlreadyExists,
            _ => PublishOutcome::Rejected { status, message },
        }
    }

    /// Accepted or a benign conflict.
    pub fn is_benign(&self) -> bool {
        !self.is_warning()
    }

    /// Whether this outcome is reported at warning level.
    pub fn is_warning(&self) -> bool {
        matches!(self, PublishOutcome::Rejected { .. })
    }
}

#[derive(Debug, Serialize)]
struct SubscribeBody<'a> {
    subscribers: &'a [String],
}

/// Client for the experiment service
#[derive(Debug, Clone)]
pub struct ExperimentClient {
    http: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
}

impl ExperimentClient {
    pub fn new(config: PublisherConfig) -> Result<Self, PublishError> {
        let base_url = parse_base_url(&config.base_url)?;
        let headers = request_headers(&config)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("flagxp/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| PublishError::Client(e.to_string()))?;

        Ok(ExperimentClient {
            http,
            base_url,
            headers,
        })
    }

    /// `{base}/experiment/management/`
    pub fn management_url(&self) -> Result<Url, PublishError> {
        self.join("experiment/management/")
    }

    /// `{base}/follow/{experiment_name}`
    pub fn follow_url(&self, experiment_name: &str) -> Result<Url, PublishError> {
        let mut url = self.join("follow/")?;
        url.path_segments_mut()
            .map_err(|_| PublishError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .push(experiment_name);
        Ok(url)
    }

    /// Create an experiment.
    pub async fn create_experiment(
        &self,
        document: &ExperimentDocument,
    ) -> Result<PublishOutcome, PublishError> {
        let url = self.management_url()?;
        let body = serde_json::to_vec(document).map_err(|e| PublishError::Client(e.to_string()))?;
        let outcome = self.post(url, body).await?;
        obs::emit_publish_outcome("create", &document.experiment_name, &outcome);
        Ok(outcome)
    }

    /// Subscribe emails to an experiment.
    pub async fn add_subscribers(
        &self,
        experiment_name: &str,
        emails: &[String],
    ) -> Result<PublishOutcome, PublishError> {
        let url = self.follow_url(experiment_name)?;
        let body = serde_json::to_vec(&SubscribeBody {
            subscribers: emails,
        })
        .map_err(|e| PublishError::Client(e.to_string()))?;
        let outcome = self.post(url, body).await?;
        obs::emit_publish_outcome("subscribe", experiment_name, &outcome);
        Ok(outcome)
    }

    async fn post(&self, url: Url, body: Vec<u8>) -> Result<PublishOutcome, PublishError> {
        tracing::debug!(url = %url, "posting to experiment service");

        let response = self
            .http
            .post(url.clone())
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|source| PublishError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(PublishOutcome::Accepted);
        }

        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let text = response.text().await.unwrap_or_default();
        let message = match text.trim() {
            "" => reason,
            body => truncate(body, MAX_MESSAGE_LEN),
        };
        Ok(PublishOutcome::from_status(status.as_u16(), message))
    }

    fn join(&self, path: &str) -> Result<Url, PublishError> {
        self.base_url
            .join(path)
            .map_err(|e| PublishError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, PublishError> {
    let mut url = Url::parse(raw).map_err(|e| PublishError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(PublishError::InvalidUrl {
            url: raw.to_string(),
            reason: "cannot be a base".to_string(),
        });
    }
    // Url::join drops the last path segment unless it ends with '/'.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn request_headers(config: &PublisherConfig) -> Result<HeaderMap, PublishError> {
    let pairs = [
        (CONTENT_TYPE, JSON_CONTENT_TYPE),
        (
            HeaderName::from_static("x-auth-params-email"),
            config.requester_email.as_str(),
        ),
        (
            HeaderName::from_static("x-uber-source"),
            config.source_tag.as_str(),
        ),
        (
            HeaderName::from_static("x-uber-notify"),
            config.notify.as_str(),
        ),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let value = HeaderValue::from_str(value)
            .map_err(|e| PublishError::Client(format!("invalid {name} header: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
