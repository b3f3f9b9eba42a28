//! MySQL client helpers
//!
//! Thin layer over `ContainerRuntime::exec_mysql` for the handful of
//! statements the orchestrators issue.

use crate::config::ConfigExt;
use crate::runtime::{ContainerRuntime, MysqlInvocation};
use crate::wait::{poll_until, RetryPolicy};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

/// A MySQL account.
#[derive(Clone)]
pub struct MysqlCredentials {
    pub user: String,
    pub password: String,
}

impl MysqlCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Root account from `MYSQL_ROOT_USER` / `MYSQL_ROOT_PASSWORD`.
    pub fn root_from_env() -> Result<Self> {
        Ok(Self::new(
            String::env_or("MYSQL_ROOT_USER", "root"),
            String::env_required("MYSQL_ROOT_PASSWORD")?,
        ))
    }
}

impl fmt::Debug for MysqlCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Quote a value as a single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote an identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Runs SQL on containers as one account.
pub struct MysqlClient<'a, R> {
    runtime: &'a R,
    credentials: &'a MysqlCredentials,
}

impl<'a, R: ContainerRuntime> MysqlClient<'a, R> {
    pub fn new(runtime: &'a R, credentials: &'a MysqlCredentials) -> Self {
        Self {
            runtime,
            credentials,
        }
    }

    pub fn runtime(&self) -> &'a R {
        self.runtime
    }

    /// Run statements with no default database, plain output.
    pub async fn execute(&self, container: &str, sql: &str) -> Result<String> {
        self.exec(container, None, false, sql.as_bytes()).await
    }

    /// Run a script against `database`, plain output.
    pub async fn execute_in(&self, container: &str, database: &str, sql: &[u8]) -> Result<String> {
        self.exec(container, Some(database), false, sql).await
    }

    /// Run a query in batch mode and split the output into rows of columns.
    pub async fn query_rows(&self, container: &str, sql: &str) -> Result<Vec<Vec<String>>> {
        let out = self.exec(container, None, true, sql.as_bytes()).await?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.split('\t').map(str::to_string).collect())
            .collect())
    }

    /// First column of the first row, empty if the query returned nothing.
    pub async fn query_scalar(&self, container: &str, sql: &str) -> Result<String> {
        let rows = self.query_rows(container, sql).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or_default())
    }

    /// Succeeds when the server answers a trivial query.
    pub async fn ping(&self, container: &str) -> Result<()> {
        let one = self.query_scalar(container, "SELECT 1;").await?;
        if one == "1" {
            Ok(())
        } else {
            anyhow::bail!("unexpected ping reply from {}: {:?}", container, one)
        }
    }

    /// Poll until `container` answers queries.
    pub async fn wait_ready(&self, container: &str, policy: &RetryPolicy) -> Result<()> {
        info!(node = %container, timeout = ?policy.timeout, "Waiting for MySQL");
        poll_until(&format!("MySQL on {}", container), policy, || async move {
            self.ping(container).await.map(Some)
        })
        .await?;
        info!(node = %container, "MySQL is ready");
        Ok(())
    }

    /// Tables in `database`.
    pub async fn show_tables(&self, container: &str, database: &str) -> Result<BTreeSet<String>> {
        let rows = self
            .query_rows(
                container,
                &format!("SHOW TABLES FROM {};", quote_ident(database)),
            )
            .await
            .context(format!("Failed to list tables of {} on {}", database, container))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    /// The server's executed GTID set.
    ///
    /// Batch mode escapes the newlines MySQL puts between UUIDs, so they are
    /// stripped here to give a set usable in SQL.
    pub async fn gtid_executed(&self, container: &str) -> Result<String> {
        let raw = self
            .query_scalar(container, "SELECT @@GLOBAL.gtid_executed;")
            .await
            .context(format!("Failed to read gtid_executed on {}", container))?;
        Ok(normalize_gtid_set(&raw))
    }

    async fn exec(
        &self,
        container: &str,
        database: Option<&str>,
        batch: bool,
        input: &[u8],
    ) -> Result<String> {
        let invocation = MysqlInvocation {
            credentials: self.credentials,
            database,
            batch,
        };
        self.runtime.exec_mysql(container, &invocation, input).await
    }
}

/// Remove escaped or literal line breaks from a GTID set.
pub fn normalize_gtid_set(raw: &str) -> String {
    raw.replace("\\n", "")
        .replace('\n', "")
        .trim()
        .to_string()
}
