//! School database initializer
//!
//! Resets the school database on the master and every shard, imports the
//! schema dumps, and prints the resulting tables on a sample of nodes.

use anyhow::Result;
use clap::Parser;
use common::{init_logging, DockerCli};
use school_db_init::{Config, Initializer};
use std::path::PathBuf;
use tracing::warn;

/// Reset and load the school database on the master and its shards
#[derive(Parser)]
#[command(name = "school-db-init")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Master schema file (overrides SCHOOL_MASTER_SQL)
    #[arg(long)]
    master_sql: Option<PathBuf>,

    /// Shard schema file (overrides SCHOOL_SHARD_SQL)
    #[arg(long)]
    shard_sql: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging("school-db-init");

    let mut config = Config::from_env()?;
    if let Some(path) = cli.master_sql {
        config.master_sql = path;
    }
    if let Some(path) = cli.shard_sql {
        config.shard_sql = path;
    }

    let docker = DockerCli::from_env();
    let init = Initializer::new(&docker, &config);

    let report = tokio::select! {
        report = init.run() => report?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted - databases may be left partially initialized");
            std::process::exit(130);
        }
    };

    print!("{}", report.render_text());
    Ok(())
}
