//! flagxp - register experiments for feature flags added in a review
//!
//! ```text
//! flagxp D1234
//! flagxp 1234 --service-url http://xp.internal:4465 --dry-run
//! ```
//!
//! Logs go to stderr; the run summary is printed to stdout as JSON. Exits
//! non-zero only when the review cannot be read.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use flagxp_core::conduit::{DEFAULT_ARC_BIN, DEFAULT_CONDUIT_URI};
use flagxp_core::publish::{DEFAULT_REQUESTER_EMAIL, DEFAULT_SERVICE_URL, DEFAULT_SOURCE_TAG};
use flagxp_core::run::{DEFAULT_AUTOMATION_EMAIL, DEFAULT_PLATFORM};
use flagxp_core::{
    run_review, ConduitClient, ConduitConfig, ExperimentClient, PublisherConfig, ReviewId,
    RunOptions,
};

#[derive(Parser, Debug)]
#[command(name = "flagxp")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Register experiments for feature flags added in a code review",
    long_about = None
)]
struct Cli {
    /// Review to scan (1234 or D1234)
    review: ReviewId,

    /// Experiment service root URL
    #[arg(long, env = "FLAGXP_SERVICE_URL", default_value = DEFAULT_SERVICE_URL)]
    service_url: String,

    /// Conduit endpoint used by `arc call-conduit`
    #[arg(long, env = "FLAGXP_CONDUIT_URI", default_value = DEFAULT_CONDUIT_URI)]
    conduit_uri: String,

    /// Path to the `arc` executable
    #[arg(long, env = "FLAGXP_ARC_BIN", default_value = DEFAULT_ARC_BIN)]
    arc_bin: PathBuf,

    /// App targeted by the rollout segment
    #[arg(long, env = "FLAGXP_PLATFORM", default_value = DEFAULT_PLATFORM)]
    platform: String,

    /// Requester identity sent to the experiment service
    #[arg(long, env = "FLAGXP_REQUESTER_EMAIL", default_value = DEFAULT_REQUESTER_EMAIL)]
    requester_email: String,

    /// Source system tag sent to the experiment service
    #[arg(long, env = "FLAGXP_SOURCE_TAG", default_value = DEFAULT_SOURCE_TAG)]
    source_tag: String,

    /// Address never subscribed to experiments
    #[arg(long, env = "FLAGXP_AUTOMATION_EMAIL", default_value = DEFAULT_AUTOMATION_EMAIL)]
    automation_email: String,

    /// Timeout for each conduit call and HTTP request, in seconds
    #[arg(long, env = "FLAGXP_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Build experiment documents and log them without sending anything
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn conduit_config(&self) -> ConduitConfig {
        ConduitConfig::default()
            .with_conduit_uri(&self.conduit_uri)
            .with_arc_bin(&self.arc_bin)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig::new(&self.service_url)
            .with_requester_email(&self.requester_email)
            .with_source_tag(&self.source_tag)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            platform: self.platform.clone(),
            automation_email: self.automation_email.clone(),
            dry_run: self.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    flagxp_core::init_tracing(cli.json, level);

    let source = ConduitClient::new(cli.conduit_config());
    let client = ExperimentClient::new(cli.publisher_config())
        .context("Failed to configure experiment service client")?;

    let summary = run_review(&source, &client, cli.review, &cli.run_options())
        .await
        .with_context(|| format!("Failed to read review {}", cli.review))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
