use crate::output;

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use pipeline_planner::runners::AvailabilityProbe;
use pipeline_planner::{Configuration, DockerProbe};

/// Check whether the Docker backend is available
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Configuration file (default: ~/.pipeline-planner/config.yaml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ProbeArgs) -> Result<()> {
    let config = Configuration::load_or_default(args.config.as_deref())?;
    let probe = DockerProbe::new(Duration::from_secs(config.runner.probe_timeout_secs));

    output::status("Probing", "docker");
    let status = probe.refresh(&CancellationToken::new()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.available {
        let version = status.version.as_deref().unwrap_or("unknown version");
        match &status.platform {
            Some(platform) => output::success(&format!("Docker {} ({})", version, platform)),
            None => output::success(&format!("Docker {}", version)),
        }
        return Ok(());
    }

    output::error(&format!(
        "Docker is unavailable: {}",
        status.error_message.as_deref().unwrap_or("no details")
    ));
    if let Some(reason) = status.error_kind {
        output::info(reason.remediation());
    }
    std::process::exit(1);
}
