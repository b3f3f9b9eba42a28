//! Replication setup configuration from environment variables

use anyhow::Result;
use common::{ConfigExt, MysqlCredentials, RetryPolicy};

/// Configuration for the replication orchestrator
pub struct Config {
    pub master: String,
    pub master_port: u16,
    pub slaves: Vec<String>,
    pub root: MysqlCredentials,
    /// Account the slaves use to stream from the master.
    pub replication: MysqlCredentials,
    pub ready: RetryPolicy,
    pub replication_wait: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            master: String::env_or("MYSQL_MASTER_CONTAINER", "master"),
            master_port: u16::env_parse("MYSQL_MASTER_PORT", 3306),
            slaves: String::env_list("MYSQL_SLAVE_CONTAINERS", "slave1,slave2"),
            root: MysqlCredentials::root_from_env()?,
            replication: MysqlCredentials::new(
                String::env_or("MYSQL_REPL_USER", "repl"),
                String::env_required("MYSQL_REPL_PASSWORD")?,
            ),
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

    /// Master first, then slaves in configured order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.master.as_str()).chain(self.slaves.iter().map(String::as_str))
    }
}
