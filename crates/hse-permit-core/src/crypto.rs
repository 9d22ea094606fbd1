//! Keyed signature digests and document digests.
//!
//! Both digests are 32-byte BLAKE3 outputs. Signature digests use BLAKE3's
//! keyed mode with a key derived from the server-held [`SigningSecret`];
//! document digests are plain BLAKE3 over the rendered bytes.
//!
//! **CRITICAL**: The signature message layout is FROZEN. Changing the domain
//! tag, the key context or the field encoding invalidates every signature
//! already stored in the approval ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::types::{PermitId, UserId};

/// Domain separation prefix for approval signatures.
pub const SIGNATURE_DOMAIN: &[u8] = b"hse-permit/approval-sig/v1";

/// Context string for deriving the keyed-hash key from the raw secret.
const KEY_CONTEXT: &str = "hse-permit 2024 approval signature key v1";

/// The server-held secret used to key approval signatures.
///
/// Only the derived 32-byte key is retained. The value is never printed.
#[derive(Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct SigningSecret {
    key: [u8; 32],
}

impl SigningSecret {
    /// Create from raw secret material. Empty secrets are rejected.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ValidationError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ValidationError::EmptySecret);
        }
        Ok(Self {
            key: blake3::derive_key(KEY_CONTEXT, secret),
        })
    }

    /// Read the secret from an environment variable.
    ///
    /// Meant for the outermost caller only; library code receives the secret
    /// through configuration.
    pub fn from_env(var: &str) -> Result<Self, ValidationError> {
        let value =
            std::env::var(var).map_err(|e| ValidationError::MissingSecret(format!("{var}: {e}")))?;
        Self::new(value)
    }

    fn key(&self) -> &[u8; 32] {
        &self.key
    }
}

impl TryFrom<String> for SigningSecret {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

macro_rules! digest_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Eq, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
                let bytes =
                    hex::decode(s).map_err(|e| ValidationError::MalformedDigest(e.to_string()))?;
                let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
                    ValidationError::MalformedDigest(format!("expected 32 bytes, got {}", b.len()))
                })?;
                Ok(Self(arr))
            }

            /// Leading `len` hex characters, for display on documents.
            pub fn short(&self, len: usize) -> String {
                let hex = self.to_hex();
                hex[..len.min(hex.len())].to_string()
            }
        }

        // Constant-time comparison through blake3::Hash.
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                blake3::Hash::from(self.0) == blake3::Hash::from(other.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, self.short(16))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl From<$name> for String {
            fn from(d: $name) -> Self {
                d.to_hex()
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::from_hex(&s)
            }
        }
    };
}

digest_type!(
    /// Keyed digest binding a permit, an actor and a timestamp to the secret.
    SignatureDigest,
    "Sig"
);
digest_type!(
    /// Digest of a rendered document.
    DocumentDigest,
    "Doc"
);

impl DocumentDigest {
    /// Compute the digest of rendered document bytes.
    pub fn compute(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }
}

fn write_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u32).to_be_bytes());
    hasher.update(bytes);
}

/// Derive the signature digest for an approval.
///
/// Message: `SIGNATURE_DOMAIN || len(permit_id) || permit_id || len(actor_id)
/// || actor_id || len(ts) || ts_be`. The timestamp must be the one persisted
/// with the approval.
pub fn derive_signature(
    secret: &SigningSecret,
    permit_id: &PermitId,
    actor_id: &UserId,
    timestamp: i64,
) -> SignatureDigest {
    let mut hasher = blake3::Hasher::new_keyed(secret.key());
    hasher.update(SIGNATURE_DOMAIN);
    write_field(&mut hasher, permit_id.as_bytes());
    write_field(&mut hasher, actor_id.as_bytes());
    write_field(&mut hasher, &timestamp.to_be_bytes());
    SignatureDigest(*hasher.finalize().as_bytes())
}

/// Re-derive and compare a stored signature digest.
pub fn verify_signature(
    secret: &SigningSecret,
    permit_id: &PermitId,
    actor_id: &UserId,
    timestamp: i64,
    stored: &SignatureDigest,
) -> bool {
    derive_signature(secret, permit_id, actor_id, timestamp) == *stored
}
