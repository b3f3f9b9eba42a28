//! Schema reset, import, and verification on a single node

use crate::InitError;
use anyhow::{Context, Result};
use common::{poll_until, quote_ident, quote_literal, ContainerRuntime, MysqlClient, RetryPolicy};
use std::collections::BTreeSet;
use tracing::{info, warn};

pub struct SchemaManager<'a, R> {
    mysql: MysqlClient<'a, R>,
    database: &'a str,
    replication_wait: RetryPolicy,
}

impl<'a, R: ContainerRuntime> SchemaManager<'a, R> {
    pub fn new(mysql: MysqlClient<'a, R>, database: &'a str, replication_wait: RetryPolicy) -> Self {
        Self {
            mysql,
            database,
            replication_wait,
        }
    }

    pub fn mysql(&self) -> &MysqlClient<'a, R> {
        &self.mysql
    }

    pub fn reset_sql(&self) -> String {
        let db = quote_ident(self.database);
        format!(
            "DROP DATABASE IF EXISTS {db};\n\
             CREATE DATABASE {db} DEFAULT CHARACTER SET utf8mb4;\n"
        )
    }

    /// Drop and recreate the database, then confirm it has no tables.
    pub async fn reset(&self, node: &str) -> Result<()> {
        info!(node = %node, database = %self.database, "Resetting database");
        self.mysql
            .execute(node, &self.reset_sql())
            .await
            .context(format!("Failed to reset {} on {}", self.database, node))?;
        self.verify_tables(node, &BTreeSet::new()).await?;
        Ok(())
    }

    /// Pipe `script` into the database and confirm the resulting tables.
    pub async fn import(&self, node: &str, script: &str, expected: &BTreeSet<String>) -> Result<()> {
        info!(node = %node, bytes = script.len(), "Importing schema");
        self.mysql
            .execute_in(node, self.database, script.as_bytes())
            .await
            .context(format!("Failed to import schema into {}", node))?;
        let tables = self.verify_tables(node, expected).await?;
        info!(node = %node, tables = tables.len(), "Import verified");
        Ok(())
    }

    /// Current tables; error unless they equal `expected`.
    ///
    /// An empty `expected` reports leftovers as `SchemaNotEmpty`.
    pub async fn verify_tables(
        &self,
        node: &str,
        expected: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let found = self.mysql.show_tables(node, self.database).await?;
        if found == *expected {
            return Ok(found);
        }

        if expected.is_empty() {
            return Err(InitError::SchemaNotEmpty {
                node: node.to_string(),
                database: self.database.to_string(),
                tables: found.into_iter().collect(),
            }
            .into());
        }

        Err(InitError::TableMismatch {
            node: node.to_string(),
            missing: expected.difference(&found).cloned().collect(),
            unexpected: found.difference(expected).cloned().collect(),
        }
        .into())
    }

    pub async fn tables(&self, node: &str) -> Result<BTreeSet<String>> {
        self.mysql.show_tables(node, self.database).await
    }

    /// Wait until every slave has applied the master's transactions and
    /// shows `expected` tables.
    pub async fn wait_for_replicas(
        &self,
        master: &str,
        slaves: &[String],
        expected: &BTreeSet<String>,
    ) -> Result<()> {
        if slaves.is_empty() {
            return Ok(());
        }

        let gtid = self.mysql.gtid_executed(master).await?;
        if gtid.is_empty() {
            warn!(master = %master, "Master reports no executed GTIDs; checking tables only");
        }

        for slave in slaves {
            if !gtid.is_empty() {
                self.wait_for_gtid(slave, &gtid).await?;
            }

            let waited = poll_until(
                &format!("tables on {}", slave),
                &self.replication_wait,
                || async move {
                    let found = self.tables(slave).await?;
                    Ok::<_, anyhow::Error>(Some(()).filter(|_| found == *expected))
                },
            )
            .await;

            if let Err(e) = waited {
                self.verify_tables(slave, expected)
                    .await
                    .context(e.to_string())?;
            }
            info!(node = %slave, "Replica converged");
        }
        Ok(())
    }

    async fn wait_for_gtid(&self, slave: &str, gtid: &str) -> Result<()> {
        let timeout = self.replication_wait.timeout.as_secs().max(1);
        let applied = self
            .mysql
            .query_scalar(
                slave,
                &format!(
                    "SELECT WAIT_FOR_EXECUTED_GTID_SET({}, {});",
                    quote_literal(gtid),
                    timeout
                ),
            )
            .await
            .context(format!("Failed to wait for GTIDs on {}", slave))?;

        if applied != "0" {
            return Err(InitError::ReplicaLagging {
                node: slave.to_string(),
                gtid: gtid.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
