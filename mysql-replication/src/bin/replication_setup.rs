//! Replication setup - configure MySQL master-slave replication across containers
//!
//! Points every slave container at the master with GTID auto-positioning and
//! prints the filtered slave status. Exits non-zero when the master cannot
//! be resolved, any command fails, or a slave's threads are not running.

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{init_logging, DockerCli};
use mysql_replication::{Config, ReplicationReport, ReplicationSetup};
use tracing::{info, warn};

/// Configure and check MySQL master-slave replication
#[derive(Parser)]
#[command(name = "replication-setup")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print the replication report as JSON instead of filtered status lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Default, Clone, Copy)]
enum Commands {
    /// Configure replication on every slave, then report (default)
    #[default]
    Setup,

    /// Report current replication state without changing anything
    Status,
}

fn print_report(report: &ReplicationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging("replication-setup");

    let config = Config::from_env()?;
    let docker = DockerCli::from_env();
    let setup = ReplicationSetup::new(&docker, &config);
    let command = cli.command.unwrap_or_default();

    let work = async {
        match command {
            Commands::Setup => setup.run().await,
            Commands::Status => setup.status().await,
        }
    };

    let report = tokio::select! {
        report = work => report?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted - slaves may be left partially configured");
            std::process::exit(130);
        }
    };

    print_report(&report, cli.json)?;
    report.ensure_healthy()?;

    info!(slaves = report.replicas.len(), "Replication healthy");
    Ok(())
}
