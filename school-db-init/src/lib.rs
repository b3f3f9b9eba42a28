//! School database initializer
//!
//! Resets the `school` schema on a replicated master and on independent
//! shard nodes, imports the schema dumps, and verifies that every node ends
//! up with exactly the tables the dumps declare.

pub mod config;
pub mod dump;
pub mod encoding;
pub mod init;
pub mod schema;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use encoding::{EncodingError, NormalizedSql, SourceEncoding};
pub use init::{InitReport, Initializer, NodeRole, NodeTables, PreparedSql};
pub use schema::SchemaManager;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Failed to decode {}: {source}", .path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: EncodingError,
    },

    #[error("{} declares no tables", .path.display())]
    NoTablesDeclared { path: PathBuf },

    #[error("{node}: database {database} still has tables after reset: {}", .tables.join(", "))]
    SchemaNotEmpty {
        node: String,
        database: String,
        tables: Vec<String>,
    },

    #[error(
        "{node}: table set mismatch (missing: [{}], unexpected: [{}])",
        .missing.join(", "),
        .unexpected.join(", ")
    )]
    TableMismatch {
        node: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("{node} did not apply GTID set {gtid} in time")]
    ReplicaLagging { node: String, gtid: String },
}
