//! Shared utilities for school-db-ops components
//!
//! This crate provides common functionality used by the replication
//! orchestrator and the database initializer:
//! - Structured logging initialization
//! - Environment variable parsing helpers
//! - Command execution utilities
//! - Container runtime and MySQL client access
//! - Bounded polling in place of fixed sleeps

pub mod command;
pub mod config;
pub mod logging;
pub mod mysql;
pub mod runtime;
pub mod wait;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::CommandError;
pub use config::ConfigExt;
pub use logging::init_logging;
pub use mysql::{quote_ident, quote_literal, MysqlClient, MysqlCredentials};
pub use runtime::{ContainerRuntime, DockerCli, MysqlInvocation};
pub use wait::{poll_until, RetryPolicy, WaitError};
