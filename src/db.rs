use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, Statement};

use crate::catalog::group::{EntryKind, PathEntry};
use crate::catalog::schema::{Field, Record};
use crate::github::TreeNode;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

fn quoted(field: Field) -> String {
    format!("\"{}\"", field.name())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS entries (
            path      TEXT PRIMARY KEY,
            kind      TEXT NOT NULL,
            sha       TEXT NOT NULL DEFAULT '',
            size      INTEGER,
            listed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS blobs (
            path       TEXT PRIMARY KEY,
            sha        TEXT NOT NULL DEFAULT '',
            text       TEXT,
            status     INTEGER,
            error      TEXT,
            transient  BOOLEAN NOT NULL DEFAULT 0,
            attempts   INTEGER NOT NULL DEFAULT 0,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_blobs_transient ON blobs(transient);

        CREATE TABLE IF NOT EXISTS runs (
            run_id        TEXT PRIMARY KEY,
            profile       TEXT NOT NULL,
            started_at    TEXT NOT NULL,
            units         INTEGER NOT NULL,
            records       INTEGER NOT NULL,
            skipped_files INTEGER NOT NULL
        );
        ",
    )?;

    // Databases created before blobs carried the entry sha
    let has_sha: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('blobs') WHERE name = 'sha'",
        [],
        |r| r.get(0),
    )?;
    if !has_sha {
        conn.execute_batch("ALTER TABLE blobs ADD COLUMN sha TEXT NOT NULL DEFAULT '';")?;
    }

    // One TEXT column per field, in declared order
    let columns: Vec<String> = Field::ALL
        .iter()
        .map(|f| format!("    {} TEXT NOT NULL DEFAULT ''", quoted(*f)))
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS records (
            position INTEGER NOT NULL,
{},
            UNIQUE ({})
        );
        CREATE INDEX IF NOT EXISTS idx_records_category ON records(category);",
        columns.join(",\n"),
        quoted(Field::RepoPath)
    ))?;
    Ok(())
}

// ── Entries ──

/// Replace the stored tree listing.
pub fn save_entries(conn: &Connection, nodes: &[TreeNode]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        tx.execute("DELETE FROM entries", [])?;
        let mut stmt =
            tx.prepare("INSERT OR REPLACE INTO entries (path, kind, sha, size) VALUES (?1, ?2, ?3, ?4)")?;
        for node in nodes {
            count += stmt.execute(params![node.path, node.kind, node.sha, node.size])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Stored listing; kinds other than blob/tree (submodules) are dropped.
pub fn load_entries(conn: &Connection) -> Result<Vec<PathEntry>> {
    let mut stmt = conn.prepare("SELECT path, kind FROM entries ORDER BY path")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(path, kind)| EntryKind::parse(&kind).map(|kind| PathEntry { path, kind }))
        .collect())
}

// ── Blobs ──

/// A wanted path and the blob sha the current listing expects for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlob {
    pub path: String,
    pub sha: String,
}

pub struct BlobRow {
    pub path: String,
    pub sha: String,
    pub text: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub transient: bool,
    pub attempts: u32,
    pub latency_ms: i64,
}

/// Attempts add up across runs; everything else reflects the latest try.
pub const UPSERT_BLOB: &str = "INSERT INTO blobs (path, sha, text, status, error, transient, attempts, latency_ms)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT(path) DO UPDATE SET
        sha = excluded.sha,
        text = excluded.text,
        status = excluded.status,
        error = excluded.error,
        transient = excluded.transient,
        attempts = blobs.attempts + excluded.attempts,
        latency_ms = excluded.latency_ms,
        fetched_at = datetime('now')";

pub fn save_blob(stmt: &mut Statement<'_>, row: &BlobRow) -> Result<()> {
    stmt.execute(params![
        row.path,
        row.sha,
        row.text,
        row.status,
        row.error,
        row.transient,
        row.attempts,
        row.latency_ms,
    ])?;
    Ok(())
}

/// Wanted paths with no stored result for the listed sha, or whose last
/// failure was transient. A new upstream commit unsettles changed files.
pub fn paths_to_fetch(conn: &Connection, wanted: &[String], limit: Option<usize>) -> Result<Vec<PendingBlob>> {
    let mut stmt = conn.prepare(
        "SELECT e.path FROM entries e
         JOIN blobs b ON b.path = e.path AND b.sha = e.sha
         WHERE b.error IS NULL OR b.transient = 0",
    )?;
    let settled: HashSet<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT path, sha FROM entries WHERE kind = ?1")?;
    let listed: HashMap<String, String> = stmt
        .query_map([EntryKind::Blob.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;

    let pending = wanted
        .iter()
        .filter(|p| !settled.contains(*p))
        .map(|p| PendingBlob {
            path: p.clone(),
            sha: listed.get(p).cloned().unwrap_or_default(),
        });
    Ok(match limit {
        Some(n) => pending.take(n).collect(),
        None => pending.collect(),
    })
}

/// Texts whose stored sha matches the current listing.
pub fn load_texts(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare(
        "SELECT b.path, b.text FROM blobs b
         JOIN entries e ON e.path = b.path AND e.sha = b.sha
         WHERE b.text IS NOT NULL",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

// ── Records ──

/// Replace the whole table, keeping catalog order in `position`.
pub fn save_records(conn: &Connection, records: &[Record]) -> Result<()> {
    let columns: Vec<String> = Field::ALL.iter().map(|f| quoted(*f)).collect();
    let placeholders: Vec<String> = (2..=Field::ALL.len() + 1).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT OR REPLACE INTO records (position, {}) VALUES (?1, {})",
        columns.join(", "),
        placeholders.join(", ")
    );

    let tx = conn.unchecked_transaction()?;
    {
        tx.execute("DELETE FROM records", [])?;
        let mut stmt = tx.prepare(&sql)?;
        for (position, record) in records.iter().enumerate() {
            let position = position as i64;
            let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(Field::ALL.len() + 1);
            values.push(&position);
            for value in record.values() {
                values.push(value);
            }
            stmt.execute(values.as_slice())?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn load_records(conn: &Connection) -> Result<Vec<Record>> {
    let columns: Vec<String> = Field::ALL.iter().map(|f| quoted(*f)).collect();
    let sql = format!("SELECT {} FROM records ORDER BY position", columns.join(", "));
    let mut stmt = conn.prepare(&sql)?;
    let layout: Vec<Option<Field>> = stmt.column_names().into_iter().map(Field::from_name).collect();
    if layout.iter().zip(Field::ALL).any(|(column, field)| *column != Some(field)) {
        bail!("records table does not match the field list");
    }
    let rows = stmt
        .query_map([], |row| {
            (0..Field::ALL.len())
                .map(|i| row.get::<_, String>(i))
                .collect::<Result<Vec<_>, _>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(rows.len());
    for values in rows {
        match Record::from_values(values) {
            Some(record) => records.push(record),
            None => bail!("records table does not match the field list"),
        }
    }
    Ok(records)
}

// ── Runs ──

pub struct RunRow {
    pub run_id: String,
    pub profile: String,
    pub started_at: String,
    pub units: usize,
    pub records: usize,
    pub skipped_files: usize,
}

pub fn new_run_id(started_at: chrono::DateTime<chrono::Utc>) -> String {
    format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ"))
}

pub fn insert_run(conn: &Connection, run: &RunRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO runs (run_id, profile, started_at, units, records, skipped_files)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run.run_id,
            run.profile,
            run.started_at,
            run.units as i64,
            run.records as i64,
            run.skipped_files as i64,
        ],
    )?;
    Ok(())
}

pub fn last_run(conn: &Connection) -> Result<Option<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, profile, started_at, units, records, skipped_files
         FROM runs ORDER BY started_at DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map([], |row| {
        Ok(RunRow {
            run_id: row.get(0)?,
            profile: row.get(1)?,
            started_at: row.get(2)?,
            units: row.get::<_, i64>(3)? as usize,
            records: row.get::<_, i64>(4)? as usize,
            skipped_files: row.get::<_, i64>(5)? as usize,
        })
    })?;
    let run = rows.next().transpose()?;
    Ok(run)
}

// ── Overview ──

pub struct OverviewRow {
    pub name: String,
    pub script_type: String,
    pub category: String,
    pub subcategory: String,
    pub table: String,
    pub client_side_type: String,
}

pub fn fetch_overview(conn: &Connection, category: Option<&str>, limit: usize) -> Result<Vec<OverviewRow>> {
    let where_clause = match category {
        Some(_) => " WHERE category = ?1",
        None => "",
    };
    let sql = format!(
        "SELECT name, script_type, category, subcategory, \"table\", client_side_type
         FROM records{}
         ORDER BY position
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<OverviewRow> {
        Ok(OverviewRow {
            name: row.get(0)?,
            script_type: row.get(1)?,
            category: row.get(2)?,
            subcategory: row.get(3)?,
            table: row.get(4)?,
            client_side_type: row.get(5)?,
        })
    };
    let rows = match category {
        Some(c) => stmt.query_map([c], map)?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub entries: usize,
    pub blobs: usize,
    pub fetched: usize,
    pub transient: usize,
    pub fatal: usize,
    pub records: usize,
    pub last_run: Option<RunRow>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> {
        let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
        Ok(n as usize)
    };
    let entries: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE kind = ?1",
        [EntryKind::Blob.as_str()],
        |r| r.get(0),
    )?;
    Ok(Stats {
        entries: entries as usize,
        blobs: count("SELECT COUNT(*) FROM blobs")?,
        fetched: count("SELECT COUNT(*) FROM blobs WHERE error IS NULL")?,
        transient: count("SELECT COUNT(*) FROM blobs WHERE error IS NOT NULL AND transient = 1")?,
        fatal: count("SELECT COUNT(*) FROM blobs WHERE error IS NOT NULL AND transient = 0")?,
        records: count("SELECT COUNT(*) FROM records")?,
        last_run: last_run(conn)?,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn blob(path: &str, text: Option<&str>, error: Option<&str>, transient: bool) -> BlobRow {
        BlobRow {
            path: path.to_string(),
            sha: format!("sha-{}", path),
            text: text.map(str::to_string),
            status: Some(if error.is_some() { 503 } else { 200 }),
            error: error.map(str::to_string),
            transient,
            attempts: 2,
            latency_ms: 10,
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = memory();
        init_schema(&conn).unwrap();
        let cols: i64 = conn
            .query_row("SELECT COUNT(*) FROM pragma_table_info('records')", [], |r| r.get(0))
            .unwrap();
        assert_eq!(cols as usize, Field::ALL.len() + 1);
    }

    fn node(path: &str, kind: &str, sha: &str) -> TreeNode {
        TreeNode {
            path: path.to_string(),
            kind: kind.to_string(),
            sha: sha.to_string(),
            size: None,
        }
    }

    fn listed(paths: &[&str]) -> Vec<TreeNode> {
        paths.iter().map(|p| node(p, "blob", &format!("sha-{}", p))).collect()
    }

    fn pending_paths(pending: Vec<PendingBlob>) -> Vec<String> {
        pending.into_iter().map(|p| p.path).collect()
    }

    #[test]
    fn entries_replace_and_skip_submodules() {
        let conn = memory();
        let node = |path: &str, kind: &str| node(path, kind, "abc");
        save_entries(&conn, &[node("old.js", "blob")]).unwrap();
        save_entries(&conn, &[node("b/x.js", "blob"), node("b", "tree"), node("vendor", "commit")]).unwrap();

        let entries = load_entries(&conn).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "b");
        assert_eq!(entries[0].kind, EntryKind::Tree);
        assert_eq!(entries[1], PathEntry::blob("b/x.js"));
    }

    #[test]
    fn only_transient_failures_are_refetched() {
        let conn = memory();
        save_entries(&conn, &listed(&["busy.js", "gone.js", "new.js", "ok.js"])).unwrap();
        {
            let mut stmt = conn.prepare(UPSERT_BLOB).unwrap();
            save_blob(&mut stmt, &blob("ok.js", Some("x"), None, false)).unwrap();
            save_blob(&mut stmt, &blob("gone.js", None, Some("404"), false)).unwrap();
            save_blob(&mut stmt, &blob("busy.js", None, Some("503"), true)).unwrap();
        }
        let wanted: Vec<String> = ["busy.js", "gone.js", "new.js", "ok.js"].iter().map(|s| s.to_string()).collect();
        let pending = paths_to_fetch(&conn, &wanted, None).unwrap();
        assert_eq!(pending[1], PendingBlob { path: "new.js".into(), sha: "sha-new.js".into() });
        assert_eq!(pending_paths(pending), vec!["busy.js", "new.js"]);
        assert_eq!(pending_paths(paths_to_fetch(&conn, &wanted, Some(1)).unwrap()), vec!["busy.js"]);

        let texts = load_texts(&conn).unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts["ok.js"], "x");
    }

    #[test]
    fn new_commit_unsettles_changed_files() {
        let conn = memory();
        save_entries(&conn, &listed(&["a.js", "gone.js", "same.js"])).unwrap();
        {
            let mut stmt = conn.prepare(UPSERT_BLOB).unwrap();
            save_blob(&mut stmt, &blob("a.js", Some("old body"), None, false)).unwrap();
            save_blob(&mut stmt, &blob("gone.js", None, Some("404"), false)).unwrap();
            save_blob(&mut stmt, &blob("same.js", Some("kept"), None, false)).unwrap();
        }
        let wanted: Vec<String> = ["a.js", "gone.js", "same.js"].iter().map(|s| s.to_string()).collect();
        assert!(paths_to_fetch(&conn, &wanted, None).unwrap().is_empty());

        save_entries(
            &conn,
            &[
                node("a.js", "blob", "sha-a2"),
                node("gone.js", "blob", "sha-gone2"),
                node("same.js", "blob", "sha-same.js"),
            ],
        )
        .unwrap();
        let pending = paths_to_fetch(&conn, &wanted, None).unwrap();
        assert_eq!(pending[0], PendingBlob { path: "a.js".into(), sha: "sha-a2".into() });
        assert_eq!(pending_paths(pending), vec!["a.js", "gone.js"]);

        let texts = load_texts(&conn).unwrap();
        assert!(!texts.contains_key("a.js"));
        assert_eq!(texts["same.js"], "kept");

        {
            let mut stmt = conn.prepare(UPSERT_BLOB).unwrap();
            let mut fresh = blob("a.js", Some("new body"), None, false);
            fresh.sha = "sha-a2".into();
            save_blob(&mut stmt, &fresh).unwrap();
        }
        assert_eq!(load_texts(&conn).unwrap()["a.js"], "new body");
        assert_eq!(pending_paths(paths_to_fetch(&conn, &wanted, None).unwrap()), vec!["gone.js"]);
    }

    #[test]
    fn schema_upgrade_adds_blob_sha() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE blobs (path TEXT PRIMARY KEY, text TEXT, status INTEGER, error TEXT, transient BOOLEAN NOT NULL DEFAULT 0, attempts INTEGER NOT NULL DEFAULT 0, latency_ms INTEGER, fetched_at TEXT NOT NULL DEFAULT (datetime('now')));")
            .unwrap();
        init_schema(&conn).unwrap();
        let mut stmt = conn.prepare(UPSERT_BLOB).unwrap();
        save_blob(&mut stmt, &blob("a.js", Some("x"), None, false)).unwrap();
    }

    #[test]
    fn upsert_accumulates_attempts() {
        let conn = memory();
        {
            let mut stmt = conn.prepare(UPSERT_BLOB).unwrap();
            save_blob(&mut stmt, &blob("a.js", None, Some("503"), true)).unwrap();
            save_blob(&mut stmt, &blob("a.js", Some("done"), None, false)).unwrap();
        }
        let (attempts, error): (i64, Option<String>) = conn
            .query_row("SELECT attempts, error FROM blobs WHERE path = 'a.js'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(attempts, 4);
        assert_eq!(error, None);

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.blobs, 1);
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.transient, 0);
    }

    #[test]
    fn records_round_trip_in_order() {
        let conn = memory();
        let mut first = Record::default();
        first.set(Field::RepoPath, "b/unit");
        first.set(Field::Name, "B");
        first.set(Field::Table, "incident");
        first.set(Field::Category, "Core");
        let mut second = Record::default();
        second.set(Field::RepoPath, "a/unit");
        second.set(Field::Name, "A");
        second.set(Field::Category, "Other");

        save_records(&conn, &[first.clone(), second.clone()]).unwrap();
        save_records(&conn, &[first.clone(), second.clone()]).unwrap();
        let loaded = load_records(&conn).unwrap();
        assert_eq!(loaded, vec![first, second]);

        let rows = fetch_overview(&conn, Some("Core"), 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].table, "incident");
        assert_eq!(fetch_overview(&conn, None, 1).unwrap()[0].name, "B");
    }

    #[test]
    fn last_run_reported() {
        let conn = memory();
        assert!(get_stats(&conn).unwrap().last_run.is_none());
        for (id, at) in [("run-1", "2026-01-01T00:00:00Z"), ("run-2", "2026-02-01T00:00:00Z")] {
            insert_run(
                &conn,
                &RunRow {
                    run_id: id.to_string(),
                    profile: "all".to_string(),
                    started_at: at.to_string(),
                    units: 3,
                    records: 5,
                    skipped_files: 1,
                },
            )
            .unwrap();
        }
        let run = get_stats(&conn).unwrap().last_run.unwrap();
        assert_eq!(run.run_id, "run-2");
        assert_eq!(run.records, 5);
    }
}
