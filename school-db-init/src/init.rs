//! School database initialization sequence
//!
//! 1. Normalize and filter both schema files (before touching any node)
//! 2. Wait for every node to accept queries
//! 3. Reset the master and wait for its slaves to follow
//! 4. Reset each shard independently
//! 5. Import the master schema and wait for the slaves to converge
//! 6. Import the shard schema into each shard
//! 7. Report the tables on the master, one slave, and one shard

use crate::config::Config;
use crate::dump::{declared_tables, strip_gtid_purged};
use crate::encoding::{load_sql, NormalizedSql};
use crate::schema::SchemaManager;
use crate::InitError;
use anyhow::Result;
use common::{ContainerRuntime, MysqlClient};
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

/// A schema file ready to pipe into `mysql`.
#[derive(Debug, Clone)]
pub struct PreparedSql {
    pub source: NormalizedSql,
    pub script: String,
    pub tables: BTreeSet<String>,
    pub purged_lines: usize,
}

impl PreparedSql {
    pub fn prepare(path: &Path) -> Result<Self> {
        let source = load_sql(path)?;
        let (script, purged_lines) = strip_gtid_purged(&source.text);
        if purged_lines > 0 {
            info!(path = %path.display(), lines = purged_lines, "Stripped GTID_PURGED");
        }

        let tables = declared_tables(&script);
        if tables.is_empty() {
            return Err(InitError::NoTablesDeclared {
                path: path.to_path_buf(),
            }
            .into());
        }

        Ok(Self {
            source,
            script,
            tables,
            purged_lines,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Slave,
    Shard,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Master => "master",
            Self::Slave => "slave",
            Self::Shard => "shard",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTables {
    pub node: String,
    pub role: NodeRole,
    pub tables: BTreeSet<String>,
}

/// Tables found on a sample of nodes after initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub database: String,
    pub nodes: Vec<NodeTables>,
}

impl InitReport {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let _ = writeln!(
                out,
                "=== {} ({}) tables in {} ===",
                node.node, node.role, self.database
            );
            for table in &node.tables {
                let _ = writeln!(out, "{}", table);
            }
        }
        out
    }
}

pub struct Initializer<'a, R> {
    schema: SchemaManager<'a, R>,
    config: &'a Config,
}

impl<'a, R: ContainerRuntime> Initializer<'a, R> {
    pub fn new(runtime: &'a R, config: &'a Config) -> Self {
        Self {
            schema: SchemaManager::new(
                MysqlClient::new(runtime, &config.root),
                &config.database,
                config.replication_wait,
            ),
            config,
        }
    }

    pub async fn run(&self) -> Result<InitReport> {
        let config = self.config;
        info!(
            master = %config.master,
            slaves = ?config.slaves,
            shards = ?config.shards,
            database = %config.database,
            "=== School Database Initialization ==="
        );

        let master_sql = PreparedSql::prepare(&config.master_sql)?;
        let shard_sql = PreparedSql::prepare(&config.shard_sql)?;
        self.run_prepared(&master_sql, &shard_sql).await
    }

    /// Everything after file preparation; no file system access.
    pub async fn run_prepared(
        &self,
        master_sql: &PreparedSql,
        shard_sql: &PreparedSql,
    ) -> Result<InitReport> {
        let config = self.config;
        let mysql = self.schema.mysql();

        for node in config.nodes() {
            mysql.wait_ready(node, &config.ready).await?;
        }

        self.schema.reset(&config.master).await?;
        self.schema
            .wait_for_replicas(&config.master, &config.slaves, &BTreeSet::new())
            .await?;

        for shard in &config.shards {
            self.schema.reset(shard).await?;
        }

        self.schema
            .import(&config.master, &master_sql.script, &master_sql.tables)
            .await?;
        self.schema
            .wait_for_replicas(&config.master, &config.slaves, &master_sql.tables)
            .await?;

        for shard in &config.shards {
            self.schema
                .import(shard, &shard_sql.script, &shard_sql.tables)
                .await?;
        }

        let report = self.report().await?;
        info!(nodes = report.nodes.len(), "Initialization complete");
        Ok(report)
    }

    async fn report(&self) -> Result<InitReport> {
        let config = self.config;
        let mut sample = vec![(config.master.as_str(), NodeRole::Master)];
        match config.slaves.first() {
            Some(slave) => sample.push((slave.as_str(), NodeRole::Slave)),
            None => warn!("No slaves configured"),
        }
        match config.shards.first() {
            Some(shard) => sample.push((shard.as_str(), NodeRole::Shard)),
            None => warn!("No shards configured"),
        }

        let mut nodes = Vec::with_capacity(sample.len());
        for (node, role) in sample {
            nodes.push(NodeTables {
                node: node.to_string(),
                role,
                tables: self.schema.tables(node).await?,
            });
        }

        Ok(InitReport {
            database: config.database.clone(),
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::SourceEncoding;
    use crate::test_support::{fake_cluster, set, SLAVES};
    use common::testing::ScriptedRuntime;
    use common::{MysqlCredentials, RetryPolicy};
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    const MASTER_SQL: &str = include_str!("../../sql/school_master.sql");
    const SHARD_SQL: &str = include_str!("../../sql/school_shard.sql");

    fn config() -> Config {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(50),
            interval: Duration::from_millis(1),
        };
        Config {
            master: "master".to_string(),
            slaves: SLAVES.iter().map(|s| s.to_string()).collect(),
            shards: vec!["shard0".into(), "shard1".into(), "shard2".into()],
            database: "school".to_string(),
            master_sql: PathBuf::from("sql/school_master.sql"),
            shard_sql: PathBuf::from("sql/school_shard.sql"),
            root: MysqlCredentials::new("root", "pw"),
            ready: policy,
            replication_wait: policy,
        }
    }

    fn prepared(text: &str) -> PreparedSql {
        let (script, purged_lines) = strip_gtid_purged(text);
        PreparedSql {
            source: NormalizedSql {
                path: PathBuf::from("inline.sql"),
                source_encoding: SourceEncoding::Utf8,
                text: text.to_string(),
            },
            tables: declared_tables(&script),
            script,
            purged_lines,
        }
    }

    #[tokio::test]
    async fn test_tables_match_schema_files() {
        let runtime = fake_cluster();
        let config = config();
        let init = Initializer::new(&runtime, &config);

        let report = init
            .run_prepared(&prepared(MASTER_SQL), &prepared(SHARD_SQL))
            .await
            .unwrap();

        let master = set(&["selection_batch", "student", "teacher"]);
        let shard = set(&["course", "learn", "teach"]);
        assert_eq!(
            report.nodes,
            vec![
                NodeTables {
                    node: "master".into(),
                    role: NodeRole::Master,
                    tables: master.clone()
                },
                NodeTables {
                    node: "slave1".into(),
                    role: NodeRole::Slave,
                    tables: master
                },
                NodeTables {
                    node: "shard0".into(),
                    role: NodeRole::Shard,
                    tables: shard
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_slaves_are_never_written() {
        let runtime = fake_cluster();
        let config = config();
        Initializer::new(&runtime, &config)
            .run_prepared(&prepared(MASTER_SQL), &prepared(SHARD_SQL))
            .await
            .unwrap();

        for call in runtime.calls().iter().filter(|c| c.container.starts_with("slave")) {
            assert!(
                call.batch,
                "slave received a write: {}",
                call.input
            );
        }
    }

    #[tokio::test]
    async fn test_sequence_order() {
        let runtime = fake_cluster();
        let config = config();
        Initializer::new(&runtime, &config)
            .run_prepared(&prepared(MASTER_SQL), &prepared(SHARD_SQL))
            .await
            .unwrap();

        let writes: Vec<String> = runtime
            .calls()
            .into_iter()
            .filter(|c| !c.batch)
            .map(|c| {
                let kind = if c.input.contains("DROP DATABASE") {
                    "reset"
                } else {
                    "import"
                };
                format!("{}:{}", kind, c.container)
            })
            .collect();

        assert_eq!(
            writes,
            vec![
                "reset:master",
                "reset:shard0",
                "reset:shard1",
                "reset:shard2",
                "import:master",
                "import:shard0",
                "import:shard1",
                "import:shard2",
            ]
        );
    }

    #[tokio::test]
    async fn test_master_import_has_no_purged_gtids() {
        let runtime = fake_cluster();
        let config = config();
        Initializer::new(&runtime, &config)
            .run_prepared(&prepared(MASTER_SQL), &prepared(SHARD_SQL))
            .await
            .unwrap();

        let import = runtime
            .calls()
            .into_iter()
            .find(|c| c.container == "master" && c.database.is_some())
            .unwrap();
        assert!(import.input.contains("CREATE TABLE `student`"));
        assert!(!import.input.contains(crate::dump::GTID_PURGED_MARKER));
    }

    #[tokio::test]
    async fn test_running_twice_is_idempotent() {
        let runtime = fake_cluster();
        let config = config();
        let init = Initializer::new(&runtime, &config);
        let master = prepared(MASTER_SQL);
        let shard = prepared(SHARD_SQL);

        let first = init.run_prepared(&master, &shard).await.unwrap();
        let second = init.run_prepared(&master, &shard).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_import_stops_the_run() {
        let runtime = ScriptedRuntime::new().respond(|container, sql| {
            if sql.starts_with("SELECT 1") {
                return Ok("1".to_string());
            }
            if container == "master" && sql.contains("CREATE TABLE") {
                anyhow::bail!("ERROR 1064 (42000): You have an error in your SQL syntax");
            }
            Ok(String::new())
        });
        let mut config = config();
        config.slaves.clear();
        let init = Initializer::new(&runtime, &config);

        let err = init
            .run_prepared(&prepared(MASTER_SQL), &prepared(SHARD_SQL))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("ERROR 1064"));
        for shard in &config.shards {
            assert!(runtime
                .inputs_for(shard)
                .iter()
                .all(|i| !i.contains("CREATE TABLE")));
        }
    }

    #[tokio::test]
    async fn test_unready_shard_stops_before_any_reset() {
        let runtime = ScriptedRuntime::new().respond(|container, sql| {
            if container == "shard1" {
                anyhow::bail!("ERROR 2002 (HY000): Can't connect to local MySQL server");
            }
            Ok(if sql.starts_with("SELECT 1") { "1" } else { "" }.to_string())
        });
        let config = config();

        let err = Initializer::new(&runtime, &config)
            .run_prepared(&prepared(MASTER_SQL), &prepared(SHARD_SQL))
            .await
            .unwrap_err();

        match err.downcast_ref::<common::WaitError>() {
            Some(common::WaitError::Timeout { what, .. }) => assert!(what.contains("shard1")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(runtime
            .calls()
            .iter()
            .all(|c| !c.input.contains("DROP DATABASE")));
    }

    #[tokio::test]
    async fn test_leftover_tables_after_reset() {
        let runtime = ScriptedRuntime::new().respond(|_, sql| {
            Ok(match sql {
                s if s.starts_with("SELECT 1") => "1".to_string(),
                s if s.starts_with("SHOW TABLES") => "student".to_string(),
                _ => String::new(),
            })
        });
        let mut config = config();
        config.slaves.clear();

        let err = Initializer::new(&runtime, &config)
            .run_prepared(&prepared(MASTER_SQL), &prepared(SHARD_SQL))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InitError>(),
            Some(InitError::SchemaNotEmpty { node, .. }) if node == "master"
        ));
    }

    #[test]
    fn test_prepare_utf16_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(MASTER_SQL.encode_utf16().flat_map(u16::to_le_bytes));
        file.write_all(&bytes).unwrap();

        let sql = PreparedSql::prepare(file.path()).unwrap();
        assert_eq!(sql.source.source_encoding, SourceEncoding::Utf16Le);
        assert_eq!(sql.purged_lines, 1);
        assert_eq!(sql.tables, set(&["selection_batch", "student", "teacher"]));
    }

    #[test]
    fn test_prepare_rejects_file_without_tables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"INSERT INTO student VALUES (1);\n").unwrap();

        let err = PreparedSql::prepare(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InitError>(),
            Some(InitError::NoTablesDeclared { .. })
        ));
    }

    #[test]
    fn test_render_text() {
        let report = InitReport {
            database: "school".into(),
            nodes: vec![NodeTables {
                node: "shard0".into(),
                role: NodeRole::Shard,
                tables: set(&["course", "learn"]),
            }],
        };
        assert_eq!(
            report.render_text(),
            "=== shard0 (shard) tables in school ===\ncourse\nlearn\n"
        );
    }
}
