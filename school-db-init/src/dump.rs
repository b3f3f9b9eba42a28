//! Schema dump preparation

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// mysqldump records the source server's purged GTIDs on a line starting
/// with this. Replaying it on another server fails or corrupts GTID state.
pub const GTID_PURGED_MARKER: &str = "SET @@GLOBAL.GTID_PURGED";

/// Drop every line that begins with `GTID_PURGED_MARKER`.
///
/// All other lines are kept byte-for-byte, line endings included.
/// Returns the filtered text and the number of lines removed.
pub fn strip_gtid_purged(sql: &str) -> (String, usize) {
    let mut removed = 0;
    let kept = sql
        .split_inclusive('\n')
        .filter(|line| {
            let purge = line.starts_with(GTID_PURGED_MARKER);
            if purge {
                removed += 1;
            }
            !purge
        })
        .collect();
    (kept, removed)
}

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:(?:`[^`]+`|\w+)\s*\.\s*)?(?:`([^`]+)`|(\w+))",
    )
    .expect("valid regex")
});

/// Names of the tables a script creates, without any schema qualifier.
///
/// `CREATE TEMPORARY TABLE` does not match; those never show up in `SHOW TABLES`.
pub fn declared_tables(sql: &str) -> BTreeSet<String> {
    CREATE_TABLE
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}
