//! MySQL master-slave replication setup
//!
//! Configures GTID auto-positioned replication from a set of slave
//! containers to a master container, then verifies that every slave's IO
//! and SQL threads are running.

pub mod config;
pub mod setup;
pub mod status;

pub use config::Config;
pub use setup::ReplicationSetup;
pub use status::{filter_status_lines, ReplicaReport, ReplicationReport, SlaveStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Could not resolve network address of master container {container}")]
    MasterAddressUnresolved {
        container: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    #[error("Replication is not running on: {}", .nodes.join(", "))]
    ReplicasUnhealthy { nodes: Vec<String> },
}
