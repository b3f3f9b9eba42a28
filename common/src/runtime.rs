//! Container runtime access
//!
//! Every database command runs inside a named container through the runtime
//! CLI. `ContainerRuntime` is the seam the orchestrators are written against;
//! `DockerCli` is the production implementation.

use crate::command::{pipe_checked, run_checked};
use crate::config::ConfigExt;
use crate::mysql::MysqlCredentials;
use anyhow::{Context, Result};
use tracing::debug;

/// Go template that prints the container's address on every attached network.
const ADDRESS_TEMPLATE: &str = "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}";

/// How to launch the `mysql` client inside a container.
#[derive(Debug, Clone, Copy)]
pub struct MysqlInvocation<'a> {
    pub credentials: &'a MysqlCredentials,
    /// Default database passed as the client's positional argument.
    pub database: Option<&'a str>,
    /// `--batch --skip-column-names`: tab-separated rows, no header.
    /// Leave off for `\G` vertical output.
    pub batch: bool,
}

/// Operations the orchestrators need from a container runtime.
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// Network address of a container. Empty when it has none.
    async fn inspect_address(&self, container: &str) -> Result<String>;

    /// Pipe `input` into the `mysql` client running in `container` and
    /// return its trimmed stdout. Non-zero exit is an error.
    async fn exec_mysql(
        &self,
        container: &str,
        invocation: &MysqlInvocation<'_>,
        input: &[u8],
    ) -> Result<String>;
}

/// `ContainerRuntime` backed by the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses `DOCKER_BIN`, defaulting to `docker` on PATH.
    pub fn from_env() -> Self {
        Self::new(String::env_or("DOCKER_BIN", "docker"))
    }

    /// Arguments for `docker exec` running the mysql client.
    ///
    /// The password travels in `MYSQL_PWD`, forwarded by name from the
    /// docker client's environment, so it never shows up in argv.
    pub fn mysql_args(container: &str, invocation: &MysqlInvocation<'_>) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "-i".to_string(),
            "-e".to_string(),
            "MYSQL_PWD".to_string(),
            container.to_string(),
            "mysql".to_string(),
            format!("--user={}", invocation.credentials.user),
            "--default-character-set=utf8mb4".to_string(),
        ];
        if invocation.batch {
            args.push("--batch".to_string());
            args.push("--skip-column-names".to_string());
        }
        if let Some(db) = invocation.database {
            args.push(db.to_string());
        }
        args
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ContainerRuntime for DockerCli {
    async fn inspect_address(&self, container: &str) -> Result<String> {
        let address = run_checked(&self.program, &["inspect", "-f", ADDRESS_TEMPLATE, container])
            .await
            .context(format!("Failed to inspect container {}", container))?;
        debug!(container, address = %address, "Inspected container address");
        Ok(address)
    }

    async fn exec_mysql(
        &self,
        container: &str,
        invocation: &MysqlInvocation<'_>,
        input: &[u8],
    ) -> Result<String> {
        let args = Self::mysql_args(container, invocation);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        pipe_checked(
            &self.program,
            &args,
            &[("MYSQL_PWD", invocation.credentials.password.as_str())],
            input,
        )
        .await
        .context(format!("mysql on {} failed", container))
    }
}
