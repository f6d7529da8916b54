use std::time::Duration;

use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection, busy_timeout: Duration) -> Result<(), StorageError> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = -32000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    crate::field_map::validate(conn)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS group_active (
    rowid INTEGER PRIMARY KEY,
    accession INTEGER NOT NULL,
    hash BLOB NOT NULL UNIQUE CHECK (length(hash) = 32),
    asm TEXT NOT NULL,
    contig TEXT NOT NULL,
    start INTEGER NOT NULL,
    type TEXT NOT NULL,
    validated INTEGER NOT NULL,
    record BLOB NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);
CREATE INDEX IF NOT EXISTS idx_group_active_accession ON group_active (accession);

CREATE TABLE IF NOT EXISTS group_declustered (
    accession INTEGER NOT NULL,
    hash BLOB NOT NULL CHECK (length(hash) = 32),
    asm TEXT NOT NULL,
    contig TEXT NOT NULL,
    start INTEGER NOT NULL,
    type TEXT NOT NULL,
    validated INTEGER NOT NULL,
    record BLOB NOT NULL,
    declustered_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    PRIMARY KEY (accession, hash)
);

CREATE TABLE IF NOT EXISTS member_active (
    rowid INTEGER PRIMARY KEY,
    accession INTEGER NOT NULL UNIQUE,
    hash BLOB NOT NULL UNIQUE CHECK (length(hash) = 32),
    asm TEXT NOT NULL,
    tax INTEGER NOT NULL,
    study TEXT NOT NULL,
    contig TEXT NOT NULL,
    start INTEGER NOT NULL,
    ref TEXT NOT NULL,
    alt TEXT NOT NULL,
    rs INTEGER,
    evidence INTEGER NOT NULL,
    asm_match INTEGER NOT NULL,
    alleles_match INTEGER NOT NULL,
    validated INTEGER NOT NULL,
    record BLOB NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);
CREATE INDEX IF NOT EXISTS idx_member_active_rs ON member_active (rs) WHERE rs IS NOT NULL;

CREATE TABLE IF NOT EXISTS operations (
    rowid INTEGER PRIMARY KEY,
    op_id BLOB NOT NULL UNIQUE CHECK (length(op_id) = 16),
    kind TEXT NOT NULL,
    event_type TEXT NOT NULL,
    accession INTEGER NOT NULL,
    merged_into INTEGER,
    snapshot_digest BLOB NOT NULL,
    asm TEXT,
    reason TEXT NOT NULL,
    payload BLOB NOT NULL,
    recorded_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_operations_transition
    ON operations (kind, event_type, accession, COALESCE(merged_into, -1), snapshot_digest);
CREATE INDEX IF NOT EXISTS idx_operations_accession ON operations (kind, accession);
CREATE INDEX IF NOT EXISTS idx_operations_type ON operations (kind, event_type);
CREATE INDEX IF NOT EXISTS idx_operations_asm ON operations (kind, asm, event_type);
";
