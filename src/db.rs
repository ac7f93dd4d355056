use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per fetch attempt outcome; body is the sanitized document
        CREATE TABLE IF NOT EXISTS documents (
            id         INTEGER NOT NULL,
            kind       TEXT NOT NULL CHECK(kind IN ('compound','substance')),
            body       TEXT,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (kind, id)
        );
        CREATE INDEX IF NOT EXISTS idx_documents_error ON documents(error);

        CREATE TABLE IF NOT EXISTS records (
            id           INTEGER NOT NULL,
            kind         TEXT NOT NULL,
            body         TEXT NOT NULL,
            processed_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (kind, id)
        );
        ",
    )?;
    Ok(())
}

// ── Documents ──

pub struct DocumentRow {
    pub id: u64,
    pub body: Option<String>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Save one fetch result. A refetch replaces the earlier row.
pub fn save_document(conn: &Connection, kind: &str, row: &DocumentRow) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR REPLACE INTO documents (id, kind, body, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    stmt.execute(rusqlite::params![
        row.id as i64, kind, row.body, row.error, row.latency_ms,
    ])?;
    Ok(())
}

/// Successfully fetched documents of `kind`, by ascending id.
pub fn load_documents(conn: &Connection, kind: &str, limit: Option<usize>) -> Result<Vec<(u64, String)>> {
    let sql = format!(
        "SELECT id, body FROM documents
         WHERE kind = ?1 AND body IS NOT NULL
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([kind], |row| Ok((row.get::<_, i64>(0)? as u64, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_failures(conn: &Connection, kind: &str) -> Result<Vec<(u64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, error FROM documents
         WHERE kind = ?1 AND error IS NOT NULL
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([kind], |row| Ok((row.get::<_, i64>(0)? as u64, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Records ──

/// Upsert `rows` and drop the records of `stale` ids (documents that no
/// longer assemble) in one transaction.
pub fn save_records(conn: &Connection, kind: &str, rows: &[(u64, String)], stale: &[u64]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut delete = tx.prepare("DELETE FROM records WHERE kind = ?1 AND id = ?2")?;
        for id in stale {
            delete.execute(rusqlite::params![kind, *id as i64])?;
        }
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO records (id, kind, body) VALUES (?1, ?2, ?3)",
        )?;
        for (id, body) in rows {
            count += stmt.execute(rusqlite::params![*id as i64, kind, body])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Remove records whose document was refetched as a failure.
pub fn prune_failed_records(conn: &Connection, kind: &str) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM records
         WHERE kind = ?1
           AND id IN (SELECT id FROM documents WHERE kind = ?1 AND body IS NULL)",
        [kind],
    )?;
    Ok(removed)
}

pub fn load_records(conn: &Connection, kind: &str) -> Result<Vec<(u64, String)>> {
    let mut stmt = conn.prepare("SELECT id, body FROM records WHERE kind = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map([kind], |row| Ok((row.get::<_, i64>(0)? as u64, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub kind: String,
    pub documents: usize,
    pub errors: usize,
    pub records: usize,
}

/// Per-kind counts over both tables, so a kind that only has records (or
/// only documents) still shows up.
pub fn get_stats(conn: &Connection) -> Result<Vec<Stats>> {
    let mut stmt = conn.prepare(
        "SELECT k.kind,
                (SELECT COUNT(*) FROM documents d WHERE d.kind = k.kind),
                (SELECT COUNT(*) FROM documents d WHERE d.kind = k.kind AND d.error IS NOT NULL),
                (SELECT COUNT(*) FROM records r WHERE r.kind = k.kind)
         FROM (SELECT kind FROM documents UNION SELECT kind FROM records) k
         ORDER BY k.kind",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Stats {
                kind: row.get(0)?,
                documents: row.get(1)?,
                errors: row.get(2)?,
                records: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Tests ──
