//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, hse_permit_core::now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "permit schema migrated");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Permits: one row per permit, never physically deleted
        CREATE TABLE permits (
            id BLOB PRIMARY KEY,                 -- 16 bytes, UUID
            year INTEGER NOT NULL,               -- calendar year of creation (UTC)
            sequence INTEGER NOT NULL,           -- per-year sequence, from 1
            permit_type_id BLOB NOT NULL,
            zone_id BLOB NOT NULL,
            starts_at INTEGER NOT NULL,          -- Unix ms
            ends_at INTEGER NOT NULL,            -- Unix ms, > starts_at
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            preconditions TEXT NOT NULL,         -- JSON object
            prevention_measures TEXT NOT NULL,   -- JSON object
            atmospheric_tests TEXT NOT NULL,     -- JSON object
            attachments TEXT NOT NULL,           -- JSON object
            status TEXT NOT NULL,
            requester_id BLOB NOT NULL,
            document_digest BLOB,                -- 32 bytes, set by export only
            document_path TEXT,
            document_generated_at INTEGER,
            deleted INTEGER NOT NULL DEFAULT 0,
            revision INTEGER NOT NULL DEFAULT 0, -- optimistic concurrency counter
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,

            UNIQUE(year, sequence),
            CHECK(ends_at > starts_at)
        );

        -- Approval ledger: append-only
        CREATE TABLE approvals (
            id BLOB PRIMARY KEY,                 -- 16 bytes, UUID
            permit_id BLOB NOT NULL REFERENCES permits(id),
            actor_id BLOB NOT NULL,
            approval_role TEXT NOT NULL,
            decision TEXT NOT NULL,
            comment TEXT,
            signature_image TEXT,
            signature_digest BLOB,               -- 32 bytes, keyed BLAKE3
            timestamp INTEGER NOT NULL           -- Unix ms, signed value
        );

        CREATE TRIGGER approvals_no_update BEFORE UPDATE ON approvals
        BEGIN
            SELECT RAISE(ABORT, 'approvals are append-only');
        END;

        CREATE TRIGGER approvals_no_delete BEFORE DELETE ON approvals
        BEGIN
            SELECT RAISE(ABORT, 'approvals are append-only');
        END;

        -- Audit outbox
        CREATE TABLE audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            actor_id BLOB NOT NULL,
            target_table TEXT NOT NULL,
            target_id BLOB NOT NULL,
            payload TEXT NOT NULL,               -- JSON
            at INTEGER NOT NULL
        );

        -- Indexes for common queries
        CREATE INDEX idx_permits_status ON permits(status);
        CREATE INDEX idx_permits_requester ON permits(requester_id);
        CREATE INDEX idx_approvals_permit_ts ON approvals(permit_id, timestamp);
        CREATE INDEX idx_audit_target ON audit_log(target_table, target_id);
        "#,
    )?;

    Ok(())
}
