//! A scripted cluster that tracks the tables each node holds.

use crate::dump::declared_tables;
use common::testing::ScriptedRuntime;
use std::collections::{BTreeSet, HashMap};

pub const SLAVES: [&str; 2] = ["slave1", "slave2"];

pub fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Statements on `master` replicate to `SLAVES` immediately.
pub fn fake_cluster() -> ScriptedRuntime {
    let mut tables: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut transactions = 0;

    ScriptedRuntime::new().respond(move |container, sql| {
        let mut targets = vec![container.to_string()];
        if container == "master" {
            targets.extend(SLAVES.iter().map(|s| s.to_string()));
        }

        if sql.starts_with("SELECT 1") {
            return Ok("1".to_string());
        }
        if sql.contains("gtid_executed") {
            return Ok(format!("3e11fa47-71ca-11e1-9e33-c80aa9429562:1-{}", transactions));
        }
        if sql.contains("WAIT_FOR_EXECUTED_GTID_SET") {
            return Ok("0".to_string());
        }
        if sql.starts_with("SHOW TABLES") {
            let found = tables.get(container).cloned().unwrap_or_default();
            return Ok(found.into_iter().collect::<Vec<_>>().join("\n"));
        }

        transactions += 1;
        for target in targets {
            let entry = tables.entry(target).or_default();
            if sql.contains("DROP DATABASE") {
                entry.clear();
            }
            entry.extend(declared_tables(sql));
        }
        Ok(String::new())
    })
}
