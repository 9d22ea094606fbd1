//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking. Every multi-row write runs in a
//! single SQLite transaction.
//!
//! File databases run in WAL mode with one write connection and a few
//! read-only connections, so reads neither wait for nor hold up writes.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OpenFlags, OptionalExtension, Row};
use uuid::Uuid;

use hse_permit_core::{
    Approval, ApprovalId, ApprovalLedger, AuditEvent, DocumentDigest, DocumentRecord, FieldMap,
    Permit, PermitDraft, PermitId, PermitNumber, PermitTypeId, SignatureDigest, UserId, ZoneId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Store, TransitionCommit};

const PERMIT_COLUMNS: &str = "id, year, sequence, permit_type_id, zone_id, starts_at, ends_at,
    title, description, preconditions, prevention_measures, atmospheric_tests, attachments,
    status, requester_id, document_digest, document_path, document_generated_at, deleted,
    revision, created_at, updated_at";

const APPROVAL_COLUMNS: &str = "id, permit_id, actor_id, approval_role, decision, comment,
    signature_image, signature_digest, timestamp";

/// Read-only connections opened next to the writer of a file database.
pub const READ_CONNECTIONS: usize = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
///
/// Writes go through one connection behind a mutex. Reads on a file database
/// rotate over [`READ_CONNECTIONS`] read-only connections; an in-memory
/// database has no separate readers and reads through the writer. All
/// operations use spawn_blocking to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The write connection, protected by a mutex.
    writer: Arc<Mutex<Connection>>,

    /// Read-only connections. Empty for in-memory databases.
    readers: Vec<Arc<Mutex<Connection>>>,

    next_reader: AtomicUsize,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut writer = Connection::open(path)?;
        writer.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        configure(&writer)?;
        migration::migrate(&mut writer)?;

        let readers = (0..READ_CONNECTIONS)
            .map(|_| {
                let reader = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                configure(&reader)?;
                Ok(Arc::new(Mutex::new(reader)))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(path = %path.display(), readers = readers.len(), "permit store opened");
        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        configure(&conn)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Run a blocking write on the writer connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_on(Arc::clone(&self.writer), f).await
    }

    /// Run a blocking read on the next reader connection.
    async fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = if self.readers.is_empty() {
            Arc::clone(&self.writer)
        } else {
            let index = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
            Arc::clone(&self.readers[index])
        };
        run_on(conn, f).await
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(())
}

async fn run_on<F, T>(conn: Arc<Mutex<Connection>>, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("sqlite connection: {}", e)))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn conversion_error<E>(row: &Row<'_>, col: &str, ty: Type, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let idx = row.as_ref().column_index(col).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

fn get_uuid(row: &Row<'_>, col: &str) -> rusqlite::Result<Uuid> {
    let bytes: Vec<u8> = row.get(col)?;
    Uuid::from_slice(&bytes).map_err(|e| conversion_error(row, col, Type::Blob, e))
}

fn get_digest(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<[u8; 32]>> {
    let bytes: Option<Vec<u8>> = row.get(col)?;
    bytes
        .map(|b| {
            let len = b.len();
            b.try_into().map_err(|_| {
                conversion_error(
                    row,
                    col,
                    Type::Blob,
                    StoreError::InvalidData(format!("{col}: expected 32 bytes, got {len}")),
                )
            })
        })
        .transpose()
}

fn get_map(row: &Row<'_>, col: &str) -> rusqlite::Result<FieldMap> {
    let text: String = row.get(col)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(row, col, Type::Text, e))
}

fn get_parsed<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(col)?;
    text.parse().map_err(|e| conversion_error(row, col, Type::Text, e))
}

fn row_to_permit(row: &Row<'_>) -> rusqlite::Result<Permit> {
    let digest = get_digest(row, "document_digest")?;
    let path: Option<String> = row.get("document_path")?;
    let generated_at: Option<i64> = row.get("document_generated_at")?;
    let document = match (digest, path, generated_at) {
        (Some(d), Some(path), Some(generated_at)) => Some(DocumentRecord {
            digest: DocumentDigest::from_bytes(d),
            path,
            generated_at,
        }),
        _ => None,
    };

    Ok(Permit {
        id: PermitId(get_uuid(row, "id")?),
        number: PermitNumber::new(row.get("year")?, row.get("sequence")?),
        permit_type_id: PermitTypeId(get_uuid(row, "permit_type_id")?),
        zone_id: ZoneId(get_uuid(row, "zone_id")?),
        starts_at: row.get("starts_at")?,
        ends_at: row.get("ends_at")?,
        title: row.get("title")?,
        description: row.get("description")?,
        preconditions: get_map(row, "preconditions")?,
        prevention_measures: get_map(row, "prevention_measures")?,
        atmospheric_tests: get_map(row, "atmospheric_tests")?,
        attachments: get_map(row, "attachments")?,
        status: get_parsed(row, "status")?,
        requester_id: UserId(get_uuid(row, "requester_id")?),
        document,
        deleted: row.get::<_, i64>("deleted")? != 0,
        revision: row.get::<_, i64>("revision")? as u64,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_approval(row: &Row<'_>) -> rusqlite::Result<Approval> {
    Ok(Approval {
        id: ApprovalId(get_uuid(row, "id")?),
        permit_id: PermitId(get_uuid(row, "permit_id")?),
        actor_id: UserId(get_uuid(row, "actor_id")?),
        approval_role: get_parsed(row, "approval_role")?,
        decision: get_parsed(row, "decision")?,
        comment: row.get("comment")?,
        signature_image: row.get("signature_image")?,
        signature_digest: get_digest(row, "signature_digest")?.map(SignatureDigest::from_bytes),
        timestamp: row.get("timestamp")?,
    })
}

fn row_to_audit(row: &Row<'_>) -> rusqlite::Result<AuditEvent> {
    let payload: String = row.get("payload")?;
    Ok(AuditEvent {
        action: get_parsed(row, "action")?,
        actor_id: UserId(get_uuid(row, "actor_id")?),
        target_table: row.get("target_table")?,
        target_id: PermitId(get_uuid(row, "target_id")?),
        payload: serde_json::from_str(&payload)
            .map_err(|e| conversion_error(row, "payload", Type::Text, e))?,
        at: row.get("at")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Query helpers (run on a connection or inside a transaction)
// ─────────────────────────────────────────────────────────────────────────────

fn select_permit(conn: &Connection, id: &PermitId) -> Result<Option<Permit>> {
    conn.query_row(
        &format!("SELECT {PERMIT_COLUMNS} FROM permits WHERE id = ?1 AND deleted = 0"),
        params![id.as_bytes().as_slice()],
        row_to_permit,
    )
    .optional()
    .map_err(StoreError::from)
}

fn select_ledger(conn: &Connection, permit_id: &PermitId) -> Result<ApprovalLedger> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPROVAL_COLUMNS} FROM approvals
         WHERE permit_id = ?1
         ORDER BY timestamp, rowid"
    ))?;
    let approvals = stmt
        .query_map(params![permit_id.as_bytes().as_slice()], row_to_approval)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ApprovalLedger::new(approvals))
}

/// After a check-and-set matched no row: was the permit missing or moved?
fn cas_failure(conn: &Connection, id: &PermitId, expected_revision: u64) -> StoreError {
    match select_permit(conn, id) {
        Ok(Some(_)) => StoreError::Conflict {
            permit_id: *id,
            expected_revision,
        },
        Ok(None) => StoreError::NotFound(*id),
        Err(e) => e,
    }
}

fn insert_approval(conn: &Connection, approval: &Approval) -> Result<()> {
    let result = conn.execute(
        &format!(
            "INSERT INTO approvals ({APPROVAL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            approval.id.as_bytes().as_slice(),
            approval.permit_id.as_bytes().as_slice(),
            approval.actor_id.as_bytes().as_slice(),
            approval.approval_role.as_str(),
            approval.decision.as_str(),
            approval.comment,
            approval.signature_image,
            approval.signature_digest.as_ref().map(|d| d.as_bytes().to_vec()),
            approval.timestamp,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            Err(StoreError::DuplicateApproval(approval.id.to_string()))
        }
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            Err(StoreError::NotFound(approval.permit_id))
        }
        Err(e) => Err(e.into()),
    }
}

fn insert_audit(conn: &Connection, event: &AuditEvent) -> Result<()> {
    let payload = serde_json::to_string(&event.payload)?;
    conn.execute(
        "INSERT INTO audit_log (action, actor_id, target_table, target_id, payload, at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.action.as_str(),
            event.actor_id.as_bytes().as_slice(),
            event.target_table,
            event.target_id.as_bytes().as_slice(),
            payload,
            event.at,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_permit(
        &self,
        id: PermitId,
        requester_id: UserId,
        draft: PermitDraft,
        now: i64,
    ) -> Result<Permit> {
        self.run(move |conn| {
            let tx = conn.transaction()?;

            let year = PermitNumber::year_of(now);
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence), 0) + 1 FROM permits WHERE year = ?1",
                params![year],
                |row| row.get(0),
            )?;
            let sequence = u32::try_from(next)
                .map_err(|_| StoreError::InvalidData(format!("sequence overflow in {year}")))?;

            let permit = Permit::from_draft(
                id,
                PermitNumber::new(year, sequence),
                requester_id,
                draft,
                now,
            );

            tx.execute(
                "INSERT INTO permits (
                    id, year, sequence, permit_type_id, zone_id, starts_at, ends_at,
                    title, description, preconditions, prevention_measures,
                    atmospheric_tests, attachments, status, requester_id,
                    deleted, revision, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                          ?16, ?17, ?18, ?19)",
                params![
                    permit.id.as_bytes().as_slice(),
                    permit.number.year,
                    permit.number.sequence,
                    permit.permit_type_id.as_bytes().as_slice(),
                    permit.zone_id.as_bytes().as_slice(),
                    permit.starts_at,
                    permit.ends_at,
                    permit.title,
                    permit.description,
                    serde_json::to_string(&permit.preconditions)?,
                    serde_json::to_string(&permit.prevention_measures)?,
                    serde_json::to_string(&permit.atmospheric_tests)?,
                    serde_json::to_string(&permit.attachments)?,
                    permit.status.as_str(),
                    permit.requester_id.as_bytes().as_slice(),
                    0i64,
                    permit.revision as i64,
                    permit.created_at,
                    permit.updated_at,
                ],
            )?;

            tx.commit()?;
            tracing::debug!(permit_id = %permit.id, number = %permit.number, "permit inserted");
            Ok(permit)
        })
        .await
    }

    async fn get_permit(&self, id: &PermitId) -> Result<Option<Permit>> {
        let id = *id;
        self.read(move |conn| select_permit(conn, &id)).await
    }

    async fn get_permit_with_ledger(
        &self,
        id: &PermitId,
    ) -> Result<Option<(Permit, ApprovalLedger)>> {
        let id = *id;
        self.read(move |conn| {
            // Both selects run inside one read transaction, so they share a snapshot.
            let tx = conn.transaction()?;
            let Some(permit) = select_permit(&tx, &id)? else {
                return Ok(None);
            };
            let ledger = select_ledger(&tx, &id)?;
            tx.commit()?;
            Ok(Some((permit, ledger)))
        })
        .await
    }

    async fn update_permit_content(
        &self,
        permit: &Permit,
        expected_revision: u64,
        audit: &AuditEvent,
    ) -> Result<Permit> {
        let permit = permit.clone();
        let audit = audit.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE permits SET
                    permit_type_id = ?1, zone_id = ?2, starts_at = ?3, ends_at = ?4,
                    title = ?5, description = ?6, preconditions = ?7,
                    prevention_measures = ?8, atmospheric_tests = ?9, attachments = ?10,
                    revision = revision + 1, updated_at = ?11
                 WHERE id = ?12 AND revision = ?13 AND deleted = 0",
                params![
                    permit.permit_type_id.as_bytes().as_slice(),
                    permit.zone_id.as_bytes().as_slice(),
                    permit.starts_at,
                    permit.ends_at,
                    permit.title,
                    permit.description,
                    serde_json::to_string(&permit.preconditions)?,
                    serde_json::to_string(&permit.prevention_measures)?,
                    serde_json::to_string(&permit.atmospheric_tests)?,
                    serde_json::to_string(&permit.attachments)?,
                    audit.at,
                    permit.id.as_bytes().as_slice(),
                    expected_revision as i64,
                ],
            )?;
            if changed == 0 {
                return Err(cas_failure(&tx, &permit.id, expected_revision));
            }

            insert_audit(&tx, &audit)?;
            let updated = select_permit(&tx, &permit.id)?.ok_or(StoreError::NotFound(permit.id))?;
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    async fn soft_delete_permit(&self, id: &PermitId) -> Result<()> {
        let id = *id;
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE permits SET deleted = 1 WHERE id = ?1 AND deleted = 0",
                params![id.as_bytes().as_slice()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<Permit> {
        let commit = commit.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE permits SET status = ?1, revision = revision + 1, updated_at = ?2
                 WHERE id = ?3 AND status = ?4 AND revision = ?5 AND deleted = 0",
                params![
                    commit.next_status.as_str(),
                    commit.at,
                    commit.permit_id.as_bytes().as_slice(),
                    commit.expected_status.as_str(),
                    commit.expected_revision as i64,
                ],
            )?;
            if changed == 0 {
                return Err(cas_failure(&tx, &commit.permit_id, commit.expected_revision));
            }

            // Dropping `tx` on any error below rolls the status write back.
            if let Some(approval) = &commit.approval {
                insert_approval(&tx, approval)?;
            }
            insert_audit(&tx, &commit.audit)?;

            let updated = select_permit(&tx, &commit.permit_id)?
                .ok_or(StoreError::NotFound(commit.permit_id))?;
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    async fn record_document(
        &self,
        id: &PermitId,
        record: &DocumentRecord,
        audit: &AuditEvent,
    ) -> Result<()> {
        let id = *id;
        let record = record.clone();
        let audit = audit.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE permits SET document_digest = ?1, document_path = ?2,
                    document_generated_at = ?3
                 WHERE id = ?4 AND deleted = 0",
                params![
                    record.digest.as_bytes().as_slice(),
                    record.path,
                    record.generated_at,
                    id.as_bytes().as_slice(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            insert_audit(&tx, &audit)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn append_approval(&self, approval: &Approval) -> Result<()> {
        let approval = approval.clone();
        self.run(move |conn| insert_approval(conn, &approval)).await
    }

    async fn list_approvals(&self, permit_id: &PermitId) -> Result<ApprovalLedger> {
        let permit_id = *permit_id;
        self.read(move |conn| select_ledger(conn, &permit_id)).await
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        let event = event.clone();
        self.run(move |conn| insert_audit(conn, &event)).await
    }

    async fn list_audit(&self, target_id: &PermitId) -> Result<Vec<AuditEvent>> {
        let target_id = *target_id;
        self.read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT action, actor_id, target_table, target_id, payload, at
                 FROM audit_log WHERE target_id = ?1 ORDER BY id",
            )?;
            let events = stmt
                .query_map(params![target_id.as_bytes().as_slice()], row_to_audit)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
        .await
    }
}
