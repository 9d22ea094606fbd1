//! Strong type definitions for the permit workflow.
//!
//! All identifiers are newtypes to prevent mixing a permit id with an actor id
//! at compile time. Roles, statuses and decisions are closed enumerations; their
//! wire names are the ones persisted in storage and shown on exported documents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Get the raw bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Parse from the hyphenated string form.
            pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Opaque permit identifier.
    PermitId
);
uuid_id!(
    /// Identifier of a single approval record.
    ApprovalId
);
uuid_id!(
    /// Identifier of a user account (requester, approver).
    UserId
);
uuid_id!(
    /// Reference to a zone managed outside this workspace.
    ZoneId
);
uuid_id!(
    /// Reference to a permit type managed outside this workspace.
    PermitTypeId
);

/// Account role of an actor.
///
/// `Hse` is the superuser role: it may act at any approvable stage and may
/// edit a permit regardless of its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Hse,
    RespZone,
    Superviseur,
    Demandeur,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 4] = [Role::Hse, Role::RespZone, Role::Superviseur, Role::Demandeur];

    /// Wire name as persisted and rendered.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Hse => "HSE",
            Role::RespZone => "RESP_ZONE",
            Role::Superviseur => "SUPERVISEUR",
            Role::Demandeur => "DEMANDEUR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownRole(s.to_string()))
    }
}

/// Lifecycle status of a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermitStatus {
    Brouillon,
    EnAttente,
    Valide,
    EnCours,
    Cloture,
    Suspendu,
}

impl PermitStatus {
    /// Every status, in lifecycle order with `Suspendu` last.
    pub const ALL: [PermitStatus; 6] = [
        PermitStatus::Brouillon,
        PermitStatus::EnAttente,
        PermitStatus::Valide,
        PermitStatus::EnCours,
        PermitStatus::Cloture,
        PermitStatus::Suspendu,
    ];

    /// Wire name as persisted and rendered.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PermitStatus::Brouillon => "BROUILLON",
            PermitStatus::EnAttente => "EN_ATTENTE",
            PermitStatus::Valide => "VALIDE",
            PermitStatus::EnCours => "EN_COURS",
            PermitStatus::Cloture => "CLOTURE",
            PermitStatus::Suspendu => "SUSPENDU",
        }
    }

    /// Statuses from which a permit can be suspended.
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            PermitStatus::EnAttente | PermitStatus::Valide | PermitStatus::EnCours
        )
    }

    /// Statuses in which the requester may still edit content fields.
    pub const fn is_editable(&self) -> bool {
        matches!(self, PermitStatus::Brouillon | PermitStatus::EnAttente)
    }
}

impl fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermitStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermitStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

/// Outcome recorded on an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "APPROUVE")]
    Approve,
    #[serde(rename = "REFUSE")]
    Reject,
}

impl Decision {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROUVE",
            Decision::Reject => "REFUSE",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROUVE" => Ok(Decision::Approve),
            "REFUSE" => Ok(Decision::Reject),
            other => Err(ValidationError::UnknownDecision(other.to_string())),
        }
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
