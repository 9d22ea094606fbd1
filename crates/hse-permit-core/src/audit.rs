//! Audit events emitted by the workflow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::{PermitId, UserId};

/// Table name recorded as the audit target for permit events.
pub const PERMITS_TABLE: &str = "permits";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreationPermis,
    ModificationPermis,
    SoumissionPermis,
    ValidationPermis,
    SuspensionPermis,
    CloturePermis,
    ExportPermis,
}

impl AuditAction {
    pub const ALL: [AuditAction; 7] = [
        AuditAction::CreationPermis,
        AuditAction::ModificationPermis,
        AuditAction::SoumissionPermis,
        AuditAction::ValidationPermis,
        AuditAction::SuspensionPermis,
        AuditAction::CloturePermis,
        AuditAction::ExportPermis,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreationPermis => "CREATION_PERMIS",
            AuditAction::ModificationPermis => "MODIFICATION_PERMIS",
            AuditAction::SoumissionPermis => "SOUMISSION_PERMIS",
            AuditAction::ValidationPermis => "VALIDATION_PERMIS",
            AuditAction::SuspensionPermis => "SUSPENSION_PERMIS",
            AuditAction::CloturePermis => "CLOTURE_PERMIS",
            AuditAction::ExportPermis => "EXPORT_PERMIS",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownAuditAction(s.to_string()))
    }
}

/// One audit record: who did what to which permit, with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor_id: UserId,
    pub target_table: String,
    pub target_id: PermitId,
    pub payload: serde_json::Value,
    pub at: i64,
}

impl AuditEvent {
    /// An event targeting a permit.
    pub fn permit(
        action: AuditAction,
        actor_id: UserId,
        target_id: PermitId,
        payload: serde_json::Value,
        at: i64,
    ) -> Self {
        Self {
            action,
            actor_id,
            target_table: PERMITS_TABLE.to_string(),
            target_id,
            payload,
            at,
        }
    }
}
