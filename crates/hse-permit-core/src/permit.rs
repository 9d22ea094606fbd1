//! The permit record and its edit/patch types.

use chrono::{Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{merge_fields, FieldMap};
use crate::crypto::DocumentDigest;
use crate::types::{PermitId, PermitStatus, PermitTypeId, UserId, ZoneId};

/// Human-readable permit number, unique per calendar year.
///
/// Displayed as `PT-<year>-<sequence:04>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermitNumber {
    pub year: i32,
    pub sequence: u32,
}

impl PermitNumber {
    pub const fn new(year: i32, sequence: u32) -> Self {
        Self { year, sequence }
    }

    /// Calendar year (UTC) of a Unix-ms timestamp.
    pub fn year_of(timestamp_ms: i64) -> i32 {
        Utc.timestamp_millis_opt(timestamp_ms)
            .single()
            .map(|dt| dt.year())
            .unwrap_or(1970)
    }
}

impl fmt::Display for PermitNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PT-{}-{:04}", self.year, self.sequence)
    }
}

/// Facts recorded when a permit is exported.
///
/// Only the export path writes this; content edits leave it untouched, which
/// is what lets the verifier detect a stale export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub digest: DocumentDigest,
    pub path: String,
    /// Fixed at export time and reused when re-rendering for verification.
    pub generated_at: i64,
}

/// A work permit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permit {
    pub id: PermitId,
    pub number: PermitNumber,
    pub permit_type_id: PermitTypeId,
    pub zone_id: ZoneId,
    pub starts_at: i64,
    pub ends_at: i64,
    pub title: String,
    pub description: String,
    pub preconditions: FieldMap,
    pub prevention_measures: FieldMap,
    pub atmospheric_tests: FieldMap,
    pub attachments: FieldMap,
    pub status: PermitStatus,
    pub requester_id: UserId,
    pub document: Option<DocumentRecord>,
    pub deleted: bool,
    /// Bumped by every status transition and content edit.
    pub revision: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Permit {
    /// Build a fresh `BROUILLON` permit from a draft.
    pub fn from_draft(
        id: PermitId,
        number: PermitNumber,
        requester_id: UserId,
        draft: PermitDraft,
        now: i64,
    ) -> Self {
        Self {
            id,
            number,
            permit_type_id: draft.permit_type_id,
            zone_id: draft.zone_id,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            title: draft.title,
            description: draft.description,
            preconditions: draft.preconditions,
            prevention_measures: draft.prevention_measures,
            atmospheric_tests: draft.atmospheric_tests,
            attachments: draft.attachments,
            status: PermitStatus::Brouillon,
            requester_id,
            document: None,
            deleted: false,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a content patch. Status, export facts and bookkeeping are not
    /// reachable through a patch.
    pub fn apply_patch(&mut self, patch: PermitPatch) {
        if let Some(v) = patch.permit_type_id {
            self.permit_type_id = v;
        }
        if let Some(v) = patch.zone_id {
            self.zone_id = v;
        }
        if let Some(v) = patch.starts_at {
            self.starts_at = v;
        }
        if let Some(v) = patch.ends_at {
            self.ends_at = v;
        }
        if let Some(v) = patch.title {
            self.title = v;
        }
        if let Some(v) = patch.description {
            self.description = v;
        }
        if let Some(v) = patch.preconditions {
            merge_fields(&mut self.preconditions, v);
        }
        if let Some(v) = patch.prevention_measures {
            merge_fields(&mut self.prevention_measures, v);
        }
        if let Some(v) = patch.atmospheric_tests {
            merge_fields(&mut self.atmospheric_tests, v);
        }
        if let Some(v) = patch.attachments {
            merge_fields(&mut self.attachments, v);
        }
    }

    /// Whether the given user created this permit.
    pub fn is_requester(&self, user: &UserId) -> bool {
        self.requester_id == *user
    }
}

/// Content supplied when creating a permit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitDraft {
    pub permit_type_id: PermitTypeId,
    pub zone_id: ZoneId,
    pub starts_at: i64,
    pub ends_at: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub preconditions: FieldMap,
    #[serde(default)]
    pub prevention_measures: FieldMap,
    #[serde(default)]
    pub atmospheric_tests: FieldMap,
    #[serde(default)]
    pub attachments: FieldMap,
}

/// A partial content update. Map fields are merged, see
/// [`merge_fields`](crate::canonical::merge_fields).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermitPatch {
    pub permit_type_id: Option<PermitTypeId>,
    pub zone_id: Option<ZoneId>,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub preconditions: Option<FieldMap>,
    pub prevention_measures: Option<FieldMap>,
    pub atmospheric_tests: Option<FieldMap>,
    pub attachments: Option<FieldMap>,
}

impl PermitPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the fields this patch sets, in declaration order.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        [
            ("permit_type_id", self.permit_type_id.is_some()),
            ("zone_id", self.zone_id.is_some()),
            ("starts_at", self.starts_at.is_some()),
            ("ends_at", self.ends_at.is_some()),
            ("title", self.title.is_some()),
            ("description", self.description.is_some()),
            ("preconditions", self.preconditions.is_some()),
            ("prevention_measures", self.prevention_measures.is_some()),
            ("atmospheric_tests", self.atmospheric_tests.is_some()),
            ("attachments", self.attachments.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}
