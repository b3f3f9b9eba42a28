//! Initializer configuration from environment variables

use anyhow::Result;
use common::{ConfigExt, MysqlCredentials, RetryPolicy};
use std::path::PathBuf;

/// Configuration for the school database initializer
pub struct Config {
    pub master: String,
    /// Replicas of `master`; checked for convergence, never written to.
    pub slaves: Vec<String>,
    pub shards: Vec<String>,
    pub database: String,
    pub master_sql: PathBuf,
    pub shard_sql: PathBuf,
    pub root: MysqlCredentials,
    pub ready: RetryPolicy,
    pub replication_wait: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            master: String::env_or("MYSQL_MASTER_CONTAINER", "master"),
            slaves: String::env_list("MYSQL_SLAVE_CONTAINERS", "slave1,slave2"),
            shards: String::env_list("MYSQL_SHARD_CONTAINERS", "shard0,shard1,shard2"),
            database: String::env_or("SCHOOL_DATABASE", "school"),
            master_sql: String::env_or("SCHOOL_MASTER_SQL", "sql/school_master.sql").into(),
            shard_sql: String::env_or("SCHOOL_SHARD_SQL", "sql/school_shard.sql").into(),
            root: MysqlCredentials::root_from_env()?,
            ready: RetryPolicy::from_secs(
                u64::env_parse("MYSQL_READY_TIMEOUT", 60),
                u64::env_parse("MYSQL_READY_INTERVAL", 2),
            ),
            replication_wait: RetryPolicy::from_secs(
                u64::env_parse("REPLICATION_TIMEOUT", 60),
                u64::env_parse("REPLICATION_CHECK_INTERVAL", 2),
            ),
        })
    }

    /// Master, then its slaves, then the shards.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.master.as_str())
            .chain(self.slaves.iter().map(String::as_str))
            .chain(self.shards.iter().map(String::as_str))
    }
}
