//! Slave status filtering and reporting

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;

/// `SHOW SLAVE STATUS\G` fields worth showing an operator.
pub const STATUS_FIELDS: [&str; 5] = [
    "Slave_IO_Running",
    "Slave_SQL_Running",
    "Seconds_Behind_Master",
    "Last_IO_Error",
    "Last_SQL_Error",
];

/// Lines carrying this marker are client noise, not status.
pub const WARNING_MARKER: &str = "Warning";

/// Keep the lines of a vertical status dump that mention one of
/// `STATUS_FIELDS`, dropping any that contain `WARNING_MARKER`.
///
/// Matching is by substring, so `Slave_SQL_Running_State` and
/// `Last_IO_Error_Timestamp` are kept along with their base fields.
pub fn filter_status_lines(raw: &str) -> Vec<&str> {
    raw.lines()
        .filter(|line| STATUS_FIELDS.iter().any(|field| line.contains(field)))
        .filter(|line| !line.contains(WARNING_MARKER))
        .collect()
}

/// Parsed replication thread state of one slave.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlaveStatus {
    pub io_running: String,
    pub sql_running: String,
    /// `None` when MySQL reports NULL (threads not running).
    pub seconds_behind_master: Option<u64>,
    pub last_io_error: String,
    pub last_sql_error: String,
}

impl SlaveStatus {
    /// Parse `SHOW SLAVE STATUS\G` output.
    ///
    /// Returns `None` when the output has no `Slave_IO_Running` field, which
    /// is what a server with no replication configured prints.
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: HashMap<&str, &str> = raw
            .lines()
            .filter_map(|line| line.trim().split_once(':'))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();

        let field = |name: &str| fields.get(name).map(|v| v.to_string()).unwrap_or_default();

        Some(Self {
            io_running: fields.get("Slave_IO_Running")?.to_string(),
            sql_running: field("Slave_SQL_Running"),
            seconds_behind_master: fields
                .get("Seconds_Behind_Master")
                .and_then(|v| v.parse().ok()),
            last_io_error: field("Last_IO_Error"),
            last_sql_error: field("Last_SQL_Error"),
        })
    }

    /// Both replication threads running.
    pub fn is_healthy(&self) -> bool {
        self.io_running == "Yes" && self.sql_running == "Yes"
    }

    /// The IO error if any, else the SQL error if any.
    pub fn last_error(&self) -> Option<&str> {
        [&self.last_io_error, &self.last_sql_error]
            .into_iter()
            .find(|e| !e.is_empty())
            .map(String::as_str)
    }
}

/// Replication state of one slave at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaReport {
    pub node: String,
    pub checked_at: DateTime<Utc>,
    pub healthy: bool,
    pub status: Option<SlaveStatus>,
    pub status_lines: Vec<String>,
}

impl ReplicaReport {
    pub fn from_raw(node: &str, raw: &str) -> Self {
        let status = SlaveStatus::parse(raw);
        Self {
            node: node.to_string(),
            checked_at: Utc::now(),
            healthy: status.as_ref().is_some_and(SlaveStatus::is_healthy),
            status,
            status_lines: filter_status_lines(raw)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Outcome of a setup or status run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub master: String,
    pub master_address: Option<String>,
    pub gtid_executed: String,
    pub replicas: Vec<ReplicaReport>,
}

impl ReplicationReport {
    /// Names of slaves whose threads are not both running.
    pub fn unhealthy(&self) -> Vec<String> {
        self.replicas
            .iter()
            .filter(|r| !r.healthy)
            .map(|r| r.node.clone())
            .collect()
    }

    /// Error listing unhealthy slaves, if any.
    pub fn ensure_healthy(&self) -> Result<(), crate::ReplicationError> {
        let nodes = self.unhealthy();
        if nodes.is_empty() {
            Ok(())
        } else {
            Err(crate::ReplicationError::ReplicasUnhealthy { nodes })
        }
    }

    /// Human-readable dump: master summary, then each slave's filtered lines.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Master {} ({})",
            self.master,
            self.master_address.as_deref().unwrap_or("address unknown")
        );
        let _ = writeln!(out, "GTID executed: {}", self.gtid_executed);
        for replica in &self.replicas {
            let _ = writeln!(out, "--- {} ---", replica.node);
            if replica.status_lines.is_empty() {
                let _ = writeln!(out, "  (replication not configured)");
            }
            for line in &replica.status_lines {
                let _ = writeln!(out, "{}", line);
            }
        }
        out
    }
}
