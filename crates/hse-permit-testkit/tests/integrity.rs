//! Export and integrity verification tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hse_permit::render::{DocumentRenderer, PdfRenderer};
use hse_permit::{PermitService, ServiceConfig, SignatureFault, WorkflowError};
use hse_permit_core::{AuditAction, DocumentDigest, FieldMap, PermitId, PermitPatch, SigningSecret};
use hse_permit_store::{FsDocumentStore, SqliteStore, Store};
use hse_permit_testkit::{signing_secret, SlowRenderer, TestFixture};
use rusqlite::{params, Connection};
use serde_json::json;

#[tokio::test]
async fn fresh_export_verifies() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.in_progress_permit().await?;

    let exported = fx
        .service
        .export_document(&permit.id, &fx.actors.hse)
        .await?;
    assert!(exported.bytes.starts_with(b"%PDF"));
    assert_eq!(exported.digest, DocumentDigest::compute(&exported.bytes));
    assert_eq!(exported.path, format!("permits/{}.pdf", permit.number));

    let stored = fx.service.get_permit(&permit.id).await?.permit;
    let record = stored.document.expect("export recorded");
    assert_eq!(record.digest, exported.digest);
    assert_eq!(record.generated_at, exported.generated_at);
    assert_eq!(stored.revision, permit.revision);

    let audit = fx.service.store().list_audit(&permit.id).await?;
    assert_eq!(audit.last().unwrap().action, AuditAction::ExportPermis);

    let report = fx.service.verify(&permit.id).await?;
    assert!(report.is_valid);
    assert!(report.document_intact);
    assert!(report.artifact_intact);
    assert!(report.content_current);
    assert!(report.signatures_valid);
    assert_eq!(report.approvals.len(), 3);
    assert!(report.approvals.iter().all(|c| c.valid && c.reason.is_none()));
    assert_eq!(report.stored_digest, exported.digest);
    assert_eq!(report.computed_digest, exported.digest);
    Ok(())
}

#[tokio::test]
async fn rendering_is_reproducible_from_stored_facts() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.validated_permit().await?;
    let exported = fx
        .service
        .export_document(&permit.id, &fx.actors.hse)
        .await?;

    let view = fx.service.get_permit(&permit.id).await?;
    let again = PdfRenderer::default().render(&view.permit, &view.approvals, exported.generated_at)?;
    assert_eq!(again, exported.bytes);
    Ok(())
}

#[tokio::test]
async fn edit_after_export_is_detected() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.pending_permit().await?;
    fx.service
        .export_document(&permit.id, &fx.actors.requester)
        .await?;

    fx.service
        .update_permit(
            &permit.id,
            &fx.actors.requester,
            PermitPatch {
                title: Some("Titre modifié après export".into()),
                ..Default::default()
            },
        )
        .await?;

    let report = fx.service.verify(&permit.id).await?;
    assert!(!report.is_valid);
    assert!(!report.document_intact);
    assert!(report.artifact_intact);
    assert!(!report.content_current);
    assert!(report.signatures_valid);
    assert_ne!(report.computed_digest, report.stored_digest);

    // Exporting again brings the record back in line.
    fx.service
        .export_document(&permit.id, &fx.actors.requester)
        .await?;
    assert!(fx.service.verify(&permit.id).await?.is_valid);
    Ok(())
}

async fn edit_pending(fx: &TestFixture, permit_id: &PermitId, patch: PermitPatch) -> Result<()> {
    fx.service
        .update_permit(permit_id, &fx.actors.requester, patch)
        .await?;
    Ok(())
}

#[tokio::test]
async fn same_shape_edit_in_another_script_is_detected() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.pending_permit().await?;
    let describe = |text: &str| PermitPatch {
        description: Some(text.into()),
        ..Default::default()
    };

    edit_pending(&fx, &permit.id, describe("أبجده هوزحط")).await?;
    fx.service
        .export_document(&permit.id, &fx.actors.requester)
        .await?;
    assert!(fx.service.verify(&permit.id).await?.is_valid);

    edit_pending(&fx, &permit.id, describe("كلمنس عفصقر")).await?;
    let report = fx.service.verify(&permit.id).await?;
    assert!(!report.content_current);
    assert!(!report.document_intact);
    assert!(!report.is_valid);
    Ok(())
}

#[tokio::test]
async fn retyped_measurement_is_detected() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.pending_permit().await?;
    let measure = |value: serde_json::Value| {
        let mut tests = FieldMap::new();
        tests.insert("H2S".into(), value);
        PermitPatch {
            atmospheric_tests: Some(tests),
            ..Default::default()
        }
    };

    edit_pending(&fx, &permit.id, measure(json!(0))).await?;
    fx.service
        .export_document(&permit.id, &fx.actors.requester)
        .await?;

    edit_pending(&fx, &permit.id, measure(json!("0"))).await?;
    let report = fx.service.verify(&permit.id).await?;
    assert!(!report.document_intact);
    assert!(!report.is_valid);
    Ok(())
}

#[tokio::test]
async fn whitespace_edits_are_detected() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.pending_permit().await?;
    let title = |text: &str| PermitPatch {
        title: Some(text.into()),
        ..Default::default()
    };

    edit_pending(&fx, &permit.id, title("Soudure\tcuve 3")).await?;
    fx.service
        .export_document(&permit.id, &fx.actors.requester)
        .await?;

    edit_pending(&fx, &permit.id, title("Soudure cuve 3")).await?;
    assert!(!fx.service.verify(&permit.id).await?.document_intact);
    Ok(())
}

#[tokio::test]
async fn approval_after_export_makes_document_stale() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.validated_permit().await?;
    fx.service
        .export_document(&permit.id, &fx.actors.hse)
        .await?;

    fx.service
        .attempt_approval(&permit.id, &fx.actors.zone_lead, None, None)
        .await?;

    let report = fx.service.verify(&permit.id).await?;
    assert!(!report.content_current);
    assert!(report.signatures_valid);
    assert!(!report.is_valid);
    Ok(())
}

#[tokio::test]
async fn replaced_artifact_is_detected() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.validated_permit().await?;
    let exported = fx
        .service
        .export_document(&permit.id, &fx.actors.hse)
        .await?;

    let mut forged = exported.bytes.clone();
    forged.extend_from_slice(b"\n% appended\n");
    fx.service.documents().overwrite(&exported.path, forged)?;

    let report = fx.service.verify(&permit.id).await?;
    assert!(!report.artifact_intact);
    assert!(report.content_current);
    assert!(!report.document_intact);
    assert!(!report.is_valid);
    Ok(())
}

#[tokio::test]
async fn verify_before_export_is_no_document() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.validated_permit().await?;

    let err = fx.service.verify(&permit.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NoDocument(id) if id == permit.id));
    Ok(())
}

#[tokio::test]
async fn deleted_artifact_is_missing() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.validated_permit().await?;
    let exported = fx
        .service
        .export_document(&permit.id, &fx.actors.hse)
        .await?;
    assert!(fx.service.documents().remove(&exported.path)?);

    let err = fx.service.verify(&permit.id).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::MissingArtifact { ref path, .. } if *path == exported.path
    ));
    assert!(!err.is_retryable());
    Ok(())
}

#[tokio::test]
async fn slow_render_times_out_without_recording() -> Result<()> {
    let config = ServiceConfig::new(signing_secret()).with_render_timeout_ms(20);
    let fx = TestFixture::with_renderer(
        Arc::new(SlowRenderer::new(Duration::from_millis(400))),
        config,
    );
    let permit = fx.validated_permit().await?;

    let err = fx
        .service
        .export_document(&permit.id, &fx.actors.hse)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Timeout(20)));
    assert!(err.is_retryable());

    let stored = fx.service.get_permit(&permit.id).await?.permit;
    assert!(stored.document.is_none());
    assert!(fx.service.documents().is_empty());
    Ok(())
}

#[tokio::test]
async fn report_serializes_with_reasons() -> Result<()> {
    let fx = TestFixture::new();
    let permit = fx.validated_permit().await?;
    fx.service
        .export_document(&permit.id, &fx.actors.hse)
        .await?;

    let report = fx.service.verify(&permit.id).await?;
    let value = serde_json::to_value(&report)?;
    assert_eq!(value["is_valid"], true);
    assert_eq!(value["approvals"][0]["approval_role"], "SUPERVISEUR");
    assert_eq!(value["approvals"][0]["reason"], serde_json::Value::Null);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// On-disk scenarios: tampering below the workflow
// ─────────────────────────────────────────────────────────────────────────────

/// Open a second connection and lift the append-only guard.
fn tamper_connection(dir: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(dir.join("permits.db"))?;
    conn.execute_batch("DROP TRIGGER approvals_no_update;")?;
    Ok(conn)
}

#[tokio::test]
async fn tampered_signature_is_reported_per_approval() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fx = TestFixture::on_disk(dir.path())?;
    let permit = fx.in_progress_permit().await?;
    fx.service
        .export_document(&permit.id, &fx.actors.hse)
        .await?;

    let ledger = fx.service.store().list_approvals(&permit.id).await?;
    let target = ledger.as_slice()[1].id;

    let conn = tamper_connection(dir.path())?;
    let changed = conn.execute(
        "UPDATE approvals SET signature_digest = ?1 WHERE id = ?2",
        params![vec![0u8; 32], target.as_bytes().as_slice()],
    )?;
    assert_eq!(changed, 1);

    let report = fx.service.verify(&permit.id).await?;
    assert!(!report.is_valid);
    assert!(!report.signatures_valid);
    for check in &report.approvals {
        if check.approval_id == target {
            assert!(!check.valid);
            assert_eq!(check.reason, Some(SignatureFault::Mismatch));
        } else {
            assert!(check.valid, "{check:?}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn erased_signature_is_missing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fx = TestFixture::on_disk(dir.path())?;
    let permit = fx.validated_permit().await?;
    fx.service
        .export_document(&permit.id, &fx.actors.hse)
        .await?;

    let conn = tamper_connection(dir.path())?;
    conn.execute(
        "UPDATE approvals SET signature_digest = NULL WHERE permit_id = ?1",
        params![permit.id.as_bytes().as_slice()],
    )?;

    let report = fx.service.verify(&permit.id).await?;
    assert_eq!(report.approvals.len(), 1);
    assert_eq!(report.approvals[0].reason, Some(SignatureFault::Missing));
    assert!(!report.is_valid);
    Ok(())
}

#[tokio::test]
async fn ledger_rows_cannot_be_rewritten_in_place() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fx = TestFixture::on_disk(dir.path())?;
    let permit = fx.validated_permit().await?;

    let conn = Connection::open(dir.path().join("permits.db"))?;
    let update = conn.execute(
        "UPDATE approvals SET comment = 'réécrit' WHERE permit_id = ?1",
        params![permit.id.as_bytes().as_slice()],
    );
    assert!(update.is_err());
    let delete = conn.execute(
        "DELETE FROM approvals WHERE permit_id = ?1",
        params![permit.id.as_bytes().as_slice()],
    );
    assert!(delete.is_err());
    Ok(())
}

#[tokio::test]
async fn rotated_secret_invalidates_signatures() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let permit_id = {
        let fx = TestFixture::on_disk(dir.path())?;
        let permit = fx.validated_permit().await?;
        fx.service
            .export_document(&permit.id, &fx.actors.hse)
            .await?;
        permit.id
    };

    let rotated = PermitService::new(
        SqliteStore::open(dir.path().join("permits.db"))?,
        FsDocumentStore::new(dir.path().join("documents")),
        ServiceConfig::new(SigningSecret::new("rotated-secret")?),
    );
    let report = rotated.verify(&permit_id).await?;
    assert!(report.document_intact);
    assert!(!report.signatures_valid);
    assert!(!report.is_valid);
    Ok(())
}
