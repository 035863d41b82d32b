//! parallel-scale-down CLI library

pub mod error;

pub use error::{Error, Result};

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use scaledown_common::config::{ScaleDownSettings, TargetsFile, DEFAULT_POLL_INTERVAL};
use scaledown_common::retry::RetryConfig;
use scaledown_common::telemetry::LogFormat;
use scaledown_engine::{create_client, KubeScaleClient, Orchestrator, RunReport};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const RULE: &str = "---------------------------------------------------";

/// Scale down deployments and statefulsets in parallel
#[derive(Parser, Debug)]
#[command(name = "parallel-scale-down")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the input yaml file containing list of deployments and statefulsets
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Path to a kubeconfig file (defaults to in-cluster, KUBECONFIG, then ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Fail targets that have not converged after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Seconds between replica count polls
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval: u64,

    /// Attempts per target before giving up on conflicting writes
    #[arg(long, default_value_t = RetryConfig::default().max_attempts)]
    pub max_conflict_attempts: u32,

    /// Also wait for observed replicas on targets already at their desired count
    #[arg(long)]
    pub verify_at_target: bool,

    /// Log output format (plain or json)
    #[arg(long, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Orchestrator settings derived from the flags
    pub fn settings(&self) -> ScaleDownSettings {
        ScaleDownSettings {
            retry: RetryConfig::with_max_attempts(self.max_conflict_attempts),
            poll_interval: Duration::from_secs(self.poll_interval),
            timeout: self.timeout.map(Duration::from_secs),
            verify_at_target: self.verify_at_target,
        }
    }

    /// Run the scale down
    pub async fn run(self) -> Result<()> {
        let targets = TargetsFile::load(&self.file)?.into_targets()?;
        let settings = self.settings();
        settings.validate()?;

        let client = create_client(self.kubeconfig.as_deref()).await?;
        let orchestrator = Orchestrator::new(Arc::new(KubeScaleClient::new(client)), settings)?;

        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        println!("Starting parallel scale down...");
        let report = orchestrator.run(targets, cancel).await?;

        write_summary(&report, &mut std::io::stdout().lock())?;

        let failed = report.failures().len();
        if failed == 0 {
            Ok(())
        } else {
            Err(Error::ScaleDownFailed { failed })
        }
    }
}

/// Cancel `cancel` when the process receives Ctrl-C
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling in-flight scale downs");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });
}

/// Print the human-readable result of a run
pub fn write_summary(report: &RunReport, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    let failures = report.failures();
    if failures.is_empty() {
        writeln!(
            out,
            "All deployments and statefulsets are scaled down to target."
        )?;
        writeln!(out, "Ready to start the maintenance.")?;
    } else {
        writeln!(out, "The following resources failed to scale down:")?;
        for (address, cause) in failures {
            writeln!(out, "- {}: {}", address, cause)?;
        }
    }
    writeln!(out, "{}", RULE)
}
