//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hse_permit::{PermitService, Result, ServiceConfig};
use hse_permit_core::{
    now_millis, ApprovalLedger, FieldMap, Permit, PermitDraft, PermitTypeId, Role,
    SigningSecret, UserId, ZoneId,
};
use hse_permit_perms::Actor;
use hse_permit_render::{DocumentRenderer, PdfRenderer, RenderError};
use hse_permit_store::{
    DocumentStore, FsDocumentStore, MemoryDocumentStore, MemoryStore, SqliteStore, Store,
};
use serde_json::json;

/// Secret used by every fixture.
pub const TEST_SECRET: &str = "testkit-approval-secret";

/// The fixture signing secret.
pub fn signing_secret() -> SigningSecret {
    SigningSecret::new(TEST_SECRET).expect("test secret is non-empty")
}

/// A confined-space entry permit starting now and lasting eight hours.
pub fn sample_draft() -> PermitDraft {
    let now = now_millis();

    let mut preconditions = FieldMap::new();
    preconditions.insert("consignation".into(), json!(true));
    preconditions.insert("habilitation".into(), json!("ATEX niveau 1"));

    let mut prevention = FieldMap::new();
    prevention.insert("ARI".into(), json!(true));
    prevention.insert("surveillant".into(), json!("poste fixe"));

    let mut atmospheric = FieldMap::new();
    atmospheric.insert("O2".into(), json!("20.9%"));
    atmospheric.insert("H2S".into(), json!(0));
    atmospheric.insert("LIE".into(), json!("0%"));

    PermitDraft {
        permit_type_id: PermitTypeId::from_bytes([1; 16]),
        zone_id: ZoneId::from_bytes([2; 16]),
        starts_at: now,
        ends_at: now + 8 * 3_600_000,
        title: "Entrée en espace confiné, cuve T-204".into(),
        description: "Inspection visuelle et nettoyage du fond de cuve.".into(),
        preconditions,
        prevention_measures: prevention,
        atmospheric_tests: atmospheric,
        attachments: FieldMap::new(),
    }
}

/// One actor per role, plus a second requester who owns nothing and a second
/// supervisor.
#[derive(Debug, Clone, Copy)]
pub struct Actors {
    pub requester: Actor,
    pub other_requester: Actor,
    pub supervisor: Actor,
    pub other_supervisor: Actor,
    pub zone_lead: Actor,
    pub hse: Actor,
}

impl Actors {
    pub fn new() -> Self {
        Self {
            requester: Actor::new(UserId::new(), Role::Demandeur),
            other_requester: Actor::new(UserId::new(), Role::Demandeur),
            supervisor: Actor::new(UserId::new(), Role::Superviseur),
            other_supervisor: Actor::new(UserId::new(), Role::Superviseur),
            zone_lead: Actor::new(UserId::new(), Role::RespZone),
            hse: Actor::new(UserId::new(), Role::Hse),
        }
    }

    /// The actor holding `role` (the owning requester for `DEMANDEUR`).
    pub fn with_role(&self, role: Role) -> Actor {
        match role {
            Role::Hse => self.hse,
            Role::RespZone => self.zone_lead,
            Role::Superviseur => self.supervisor,
            Role::Demandeur => self.requester,
        }
    }
}

impl Default for Actors {
    fn default() -> Self {
        Self::new()
    }
}

/// A service plus the actors that drive it.
pub struct TestFixture<S: Store = MemoryStore, D: DocumentStore = MemoryDocumentStore> {
    pub service: PermitService<S, D>,
    pub actors: Actors,
}

impl TestFixture {
    /// In-memory stores and the default configuration.
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::new(signing_secret()))
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        Self::from_service(PermitService::new(
            MemoryStore::new(),
            MemoryDocumentStore::new(),
            config,
        ))
    }

    /// In-memory stores with a custom renderer.
    pub fn with_renderer(renderer: Arc<dyn DocumentRenderer>, config: ServiceConfig) -> Self {
        Self::from_service(PermitService::with_renderer(
            MemoryStore::new(),
            MemoryDocumentStore::new(),
            renderer,
            config,
        ))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture<SqliteStore, FsDocumentStore> {
    /// SQLite at `dir/permits.db`, documents under `dir/documents`.
    pub fn on_disk(dir: &Path) -> Result<Self> {
        let store = SqliteStore::open(dir.join("permits.db"))?;
        let documents = FsDocumentStore::new(dir.join("documents"));
        Ok(Self::from_service(PermitService::new(
            store,
            documents,
            ServiceConfig::new(signing_secret()),
        )))
    }
}

impl<S: Store, D: DocumentStore> TestFixture<S, D> {
    pub fn from_service(service: PermitService<S, D>) -> Self {
        Self {
            service,
            actors: Actors::new(),
        }
    }

    /// A fresh `BROUILLON` permit owned by `actors.requester`.
    pub async fn draft_permit(&self) -> Result<Permit> {
        self.service
            .create_permit(&self.actors.requester, sample_draft())
            .await
    }

    /// A permit submitted to `EN_ATTENTE`.
    pub async fn pending_permit(&self) -> Result<Permit> {
        let permit = self.draft_permit().await?;
        let view = self.service.submit(&permit.id, &self.actors.requester).await?;
        Ok(view.permit)
    }

    /// A permit approved by the supervisor, now `VALIDE`.
    pub async fn validated_permit(&self) -> Result<Permit> {
        let permit = self.pending_permit().await?;
        let view = self
            .service
            .attempt_approval(
                &permit.id,
                &self.actors.supervisor,
                Some("Conditions vérifiées sur site".into()),
                Some("signatures/superviseur.png".into()),
            )
            .await?;
        Ok(view.permit)
    }

    /// A permit signed off by the zone lead and HSE, now `EN_COURS`.
    pub async fn in_progress_permit(&self) -> Result<Permit> {
        let permit = self.validated_permit().await?;
        self.service
            .attempt_approval(&permit.id, &self.actors.zone_lead, None, None)
            .await?;
        let view = self
            .service
            .attempt_approval(&permit.id, &self.actors.hse, Some("Go".into()), None)
            .await?;
        Ok(view.permit)
    }
}

/// A renderer that sleeps before delegating to [`PdfRenderer`].
#[derive(Debug, Clone)]
pub struct SlowRenderer {
    delay: Duration,
    inner: PdfRenderer,
}

impl SlowRenderer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: PdfRenderer::default(),
        }
    }
}

impl DocumentRenderer for SlowRenderer {
    fn render(
        &self,
        permit: &Permit,
        approvals: &ApprovalLedger,
        generated_at: i64,
    ) -> std::result::Result<Vec<u8>, RenderError> {
        std::thread::sleep(self.delay);
        self.inner.render(permit, approvals, generated_at)
    }
}
