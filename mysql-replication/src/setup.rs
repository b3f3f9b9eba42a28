//! Replication setup sequence
//!
//! Runs strictly in order, one node at a time:
//! 1. Wait for every node to accept queries
//! 2. Resolve the master's address (fatal if empty)
//! 3. Create the replication account on the master
//! 4. Read the master's GTID set
//! 5. Point each slave at the master with GTID auto-positioning
//! 6. Wait for each slave's IO and SQL threads to run

use crate::config::Config;
use crate::status::{ReplicaReport, ReplicationReport};
use crate::ReplicationError;
use anyhow::{Context, Result};
use common::{poll_until, quote_literal, ContainerRuntime, MysqlClient};
use tracing::{info, warn};

const SLAVE_STATUS_SQL: &str = "SHOW SLAVE STATUS\\G\n";

pub struct ReplicationSetup<'a, R> {
    mysql: MysqlClient<'a, R>,
    config: &'a Config,
}

impl<'a, R: ContainerRuntime> ReplicationSetup<'a, R> {
    pub fn new(runtime: &'a R, config: &'a Config) -> Self {
        Self {
            mysql: MysqlClient::new(runtime, &config.root),
            config,
        }
    }

    /// Configure replication on every slave and report the result.
    ///
    /// Unhealthy slaves do not make this fail; they show up in the report
    /// with `healthy == false`.
    pub async fn run(&self) -> Result<ReplicationReport> {
        let config = self.config;
        info!(
            master = %config.master,
            slaves = ?config.slaves,
            "=== Replication Setup ==="
        );

        for node in config.nodes() {
            self.mysql.wait_ready(node, &config.ready).await?;
        }

        let address = self.resolve_master_address().await?;
        info!(master = %config.master, address = %address, "Resolved master address");

        self.ensure_replication_user().await?;

        let gtid_executed = self.mysql.gtid_executed(&config.master).await?;
        info!(gtid = %gtid_executed, "Master GTID executed set");

        for slave in &config.slaves {
            self.configure_slave(slave, &address).await?;
        }

        let mut replicas = Vec::with_capacity(config.slaves.len());
        for slave in &config.slaves {
            replicas.push(self.await_replica(slave).await?);
        }

        Ok(ReplicationReport {
            master: config.master.clone(),
            master_address: Some(address),
            gtid_executed,
            replicas,
        })
    }

    /// Report current replication state without changing anything.
    pub async fn status(&self) -> Result<ReplicationReport> {
        let config = self.config;
        let address = self
            .mysql
            .runtime()
            .inspect_address(&config.master)
            .await?;
        let gtid_executed = self.mysql.gtid_executed(&config.master).await?;

        let mut replicas = Vec::with_capacity(config.slaves.len());
        for slave in &config.slaves {
            replicas.push(self.inspect_replica(slave).await?);
        }

        Ok(ReplicationReport {
            master: config.master.clone(),
            master_address: Some(address).filter(|a| !a.is_empty()),
            gtid_executed,
            replicas,
        })
    }

    /// Master address as seen on the container network.
    pub async fn resolve_master_address(&self) -> Result<String> {
        let master = &self.config.master;
        let address = self
            .mysql
            .runtime()
            .inspect_address(master)
            .await
            .map_err(|e| ReplicationError::MasterAddressUnresolved {
                container: master.clone(),
                source: Some(e.into()),
            })?;
        if address.trim().is_empty() {
            return Err(ReplicationError::MasterAddressUnresolved {
                container: master.clone(),
                source: None,
            }
            .into());
        }
        Ok(address.trim().to_string())
    }

    /// Idempotent: creates the account if missing, resets its password to
    /// the configured one, then grants.
    pub fn replication_user_sql(&self) -> String {
        let repl = &self.config.replication;
        let account = format!("{}@'%'", quote_literal(&repl.user));
        format!(
            "CREATE USER IF NOT EXISTS {account} IDENTIFIED BY {password};\n\
             ALTER USER {account} IDENTIFIED BY {password};\n\
             GRANT REPLICATION SLAVE ON *.* TO {account};\n\
             FLUSH PRIVILEGES;\n",
            account = account,
            password = quote_literal(&repl.password),
        )
    }

    /// Statements that (re)point a slave at the master.
    pub fn change_master_sql(&self, master_address: &str) -> String {
        let repl = &self.config.replication;
        format!(
            "STOP SLAVE;\n\
             RESET SLAVE;\n\
             CHANGE MASTER TO MASTER_HOST={host}, MASTER_PORT={port}, \
             MASTER_USER={user}, MASTER_PASSWORD={password}, \
             MASTER_AUTO_POSITION=1, GET_MASTER_PUBLIC_KEY=1;\n\
             START SLAVE;\n",
            host = quote_literal(master_address),
            port = self.config.master_port,
            user = quote_literal(&repl.user),
            password = quote_literal(&repl.password),
        )
    }

    async fn ensure_replication_user(&self) -> Result<()> {
        let master = &self.config.master;
        info!(user = %self.config.replication.user, "Ensuring replication user on master");
        self.mysql
            .execute(master, &self.replication_user_sql())
            .await
            .context("Failed to create replication user")?;
        Ok(())
    }

    async fn configure_slave(&self, slave: &str, master_address: &str) -> Result<()> {
        info!(node = %slave, master = %master_address, "Configuring slave");
        self.mysql
            .execute(slave, &self.change_master_sql(master_address))
            .await
            .context(format!("Failed to configure replication on {}", slave))?;
        Ok(())
    }

    async fn inspect_replica(&self, slave: &str) -> Result<ReplicaReport> {
        let raw = self
            .mysql
            .execute(slave, SLAVE_STATUS_SQL)
            .await
            .context(format!("Failed to read slave status on {}", slave))?;
        Ok(ReplicaReport::from_raw(slave, &raw))
    }

    /// Poll until both threads run. On timeout the last observed state is
    /// reported as unhealthy rather than failing the whole run.
    async fn await_replica(&self, slave: &str) -> Result<ReplicaReport> {
        let policy = &self.config.replication_wait;
        let waited = poll_until(&format!("replication on {}", slave), policy, || async move {
            let report = self.inspect_replica(slave).await?;
            Ok::<_, anyhow::Error>(Some(report).filter(|r| r.healthy))
        })
        .await;

        match waited {
            Ok(report) => {
                info!(node = %slave, "Replication running");
                Ok(report)
            }
            Err(e) => {
                let report = self.inspect_replica(slave).await?;
                let last_error = report
                    .status
                    .as_ref()
                    .and_then(|s| s.last_error())
                    .unwrap_or("none");
                warn!(node = %slave, error = %e, last_error = %last_error, "Replication not running");
                Ok(report)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::testing::ScriptedRuntime;
    use common::{MysqlCredentials, RetryPolicy};
    use std::time::Duration;

    const GTID: &str = "3e11fa47-71ca-11e1-9e33-c80aa9429562:1-12";

    const HEALTHY: &str = "\
*************************** 1. row ***************************
             Slave_IO_Running: Yes
            Slave_SQL_Running: Yes
        Seconds_Behind_Master: 0
                Last_IO_Error:
               Last_SQL_Error:";

    const CONNECTING: &str = "\
*************************** 1. row ***************************
             Slave_IO_Running: Connecting
            Slave_SQL_Running: Yes
        Seconds_Behind_Master: NULL
                Last_IO_Error: Access denied for user 'repl'
               Last_SQL_Error:";

    fn config() -> Config {
        let fast = RetryPolicy {
            timeout: Duration::from_millis(20),
            interval: Duration::from_millis(1),
        };
        Config {
            master: "master".to_string(),
            master_port: 3306,
            slaves: vec!["slave1".to_string(), "slave2".to_string()],
            root: MysqlCredentials::new("root", "rootpw"),
            replication: MysqlCredentials::new("repl", "replpw"),
            ready: fast,
            replication_wait: fast,
        }
    }

    fn cluster(status: &'static str) -> ScriptedRuntime {
        ScriptedRuntime::new()
            .with_address("master", "172.18.0.2")
            .respond(move |_, sql| {
                Ok(if sql.starts_with("SELECT 1") {
                    "1".to_string()
                } else if sql.contains("gtid_executed") {
                    GTID.to_string()
                } else if sql.starts_with("SHOW SLAVE STATUS") {
                    status.to_string()
                } else {
                    String::new()
                })
            })
    }

    #[tokio::test]
    async fn test_unresolved_master_touches_no_slave() {
        let runtime = ScriptedRuntime::new().respond(|_, sql| {
            Ok(if sql.starts_with("SELECT 1") { "1" } else { "" }.to_string())
        });
        let config = config();

        let err = ReplicationSetup::new(&runtime, &config)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ReplicationError>(),
            Some(ReplicationError::MasterAddressUnresolved { container, source: None })
                if container == "master"
        ));
        assert!(runtime
            .calls()
            .iter()
            .all(|c| !c.input.contains("CHANGE MASTER") && !c.input.contains("CREATE USER")));
    }

    #[tokio::test]
    async fn test_setup_sequence() {
        let runtime = cluster(HEALTHY);
        let config = config();

        let report = ReplicationSetup::new(&runtime, &config).run().await.unwrap();

        let calls = runtime.calls();
        let position = |needle: &str, node: &str| {
            calls
                .iter()
                .position(|c| c.container == node && c.input.contains(needle))
                .unwrap()
        };
        let grant = position("GRANT REPLICATION SLAVE", "master");
        let slave1 = position("CHANGE MASTER TO", "slave1");
        let slave2 = position("CHANGE MASTER TO", "slave2");
        assert!(grant < slave1 && slave1 < slave2);

        let change = &calls[slave1].input;
        assert!(change.contains("MASTER_HOST='172.18.0.2'"));
        assert!(change.contains("MASTER_PORT=3306"));
        assert!(change.contains("MASTER_AUTO_POSITION=1"));
        let stop = change.find("STOP SLAVE").unwrap();
        let reset = change.find("RESET SLAVE").unwrap();
        let start = change.find("START SLAVE").unwrap();
        assert!(stop < reset && reset < start);

        assert!(calls.iter().all(|c| c.user == "root"));
        assert_eq!(report.master_address.as_deref(), Some("172.18.0.2"));
        assert_eq!(report.gtid_executed, GTID);
        assert!(report.ensure_healthy().is_ok());
        assert_eq!(report.replicas.len(), 2);
        assert_eq!(report.replicas[0].status_lines.len(), 5);
    }

    #[tokio::test]
    async fn test_stuck_slaves_are_reported_unhealthy() {
        let runtime = cluster(CONNECTING);
        let config = config();

        let report = ReplicationSetup::new(&runtime, &config).run().await.unwrap();

        assert_eq!(report.unhealthy(), vec!["slave1", "slave2"]);
        let status = report.replicas[0].status.as_ref().unwrap();
        assert_eq!(status.last_error(), Some("Access denied for user 'repl'"));
    }

    #[tokio::test]
    async fn test_slave_command_failure_propagates() {
        let runtime = ScriptedRuntime::new()
            .with_address("master", "172.18.0.2")
            .respond(|container, sql| {
                if sql.starts_with("SELECT 1") {
                    return Ok("1".to_string());
                }
                if container == "slave1" && sql.contains("CHANGE MASTER") {
                    anyhow::bail!("ERROR 3021 (HY000): This operation cannot be performed with a running replica io thread");
                }
                Ok(String::new())
            });
        let config = config();

        let err = ReplicationSetup::new(&runtime, &config)
            .run()
            .await
            .unwrap_err();

        assert!(err.to_string().contains("slave1"));
        assert!(runtime
            .inputs_for("slave2")
            .iter()
            .all(|i| !i.contains("CHANGE MASTER")));
    }

    #[tokio::test]
    async fn test_replication_user_sql_is_idempotent_and_quoted() {
        let mut config = config();
        config.replication = MysqlCredentials::new("repl", "pa'ss");
        let runtime = ScriptedRuntime::new();
        let sql = ReplicationSetup::new(&runtime, &config).replication_user_sql();

        assert!(sql.contains("CREATE USER IF NOT EXISTS 'repl'@'%' IDENTIFIED BY 'pa\\'ss';"));
        assert!(sql.contains("GRANT REPLICATION SLAVE ON *.* TO 'repl'@'%';"));
    }

    #[tokio::test]
    async fn test_replication_user_password_follows_config() {
        let config = config();
        let runtime = ScriptedRuntime::new();
        let sql = ReplicationSetup::new(&runtime, &config).replication_user_sql();

        let create = sql.find("CREATE USER IF NOT EXISTS").unwrap();
        let alter = sql.find("ALTER USER 'repl'@'%' IDENTIFIED BY 'replpw';").unwrap();
        let grant = sql.find("GRANT REPLICATION SLAVE").unwrap();
        assert!(create < alter && alter < grant);
    }

    #[tokio::test]
    async fn test_unready_slave_stops_before_any_change() {
        let runtime = ScriptedRuntime::new()
            .with_address("master", "172.18.0.2")
            .respond(|container, sql| {
                if container == "slave2" {
                    anyhow::bail!("ERROR 2002 (HY000): Can't connect to local MySQL server");
                }
                Ok(if sql.starts_with("SELECT 1") { "1" } else { "" }.to_string())
            });
        let config = config();

        let err = ReplicationSetup::new(&runtime, &config)
            .run()
            .await
            .unwrap_err();

        match err.downcast_ref::<common::WaitError>() {
            Some(common::WaitError::Timeout { what, last_error, .. }) => {
                assert!(what.contains("slave2"));
                assert!(last_error.as_deref().unwrap().contains("ERROR 2002"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(runtime
            .calls()
            .iter()
            .all(|c| !c.input.contains("CHANGE MASTER") && !c.input.contains("CREATE USER")));
    }

    #[tokio::test]
    async fn test_failed_master_inspect_is_unresolved() {
        let docker = common::DockerCli::new("/nonexistent/docker");
        let config = config();

        let err = ReplicationSetup::new(&docker, &config)
            .resolve_master_address()
            .await
            .unwrap_err();

        match err.downcast_ref::<ReplicationError>() {
            Some(ReplicationError::MasterAddressUnresolved { container, source }) => {
                assert_eq!(container, "master");
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_does_not_reconfigure() {
        let runtime = cluster(HEALTHY);
        let config = config();

        let report = ReplicationSetup::new(&runtime, &config)
            .status()
            .await
            .unwrap();

        assert!(report.ensure_healthy().is_ok());
        assert!(runtime
            .calls()
            .iter()
            .all(|c| !c.input.contains("CHANGE MASTER") && !c.input.contains("CREATE USER")));
    }
}
