//! Service configuration.

use std::path::{Component, Path};
use std::time::Duration;

use hse_permit_core::SigningSecret;
use serde::Deserialize;

use crate::error::{Result, WorkflowError};

fn default_render_timeout_ms() -> u64 {
    10_000
}

fn default_signature_display_len() -> usize {
    16
}

fn default_document_prefix() -> String {
    "permits".to_string()
}

/// Configuration for [`PermitService`](crate::PermitService).
///
/// ```toml
/// signing_secret = "change-me"
/// render_timeout_ms = 10000
/// signature_display_len = 16
/// document_prefix = "permits"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Key material for approval signatures. Rotating it invalidates every
    /// signature issued before.
    pub signing_secret: SigningSecret,

    /// Upper bound on one document render.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Hex characters of each signature digest printed on the document.
    #[serde(default = "default_signature_display_len")]
    pub signature_display_len: usize,

    /// Relative directory exported documents are written under.
    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,
}

impl ServiceConfig {
    /// Defaults for everything but the secret.
    pub fn new(signing_secret: SigningSecret) -> Self {
        Self {
            signing_secret,
            render_timeout_ms: default_render_timeout_ms(),
            signature_display_len: default_signature_display_len(),
            document_prefix: default_document_prefix(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| WorkflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_render_timeout_ms(mut self, ms: u64) -> Self {
        self.render_timeout_ms = ms;
        self
    }

    pub fn with_document_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.document_prefix = prefix.into();
        self
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Check the values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.render_timeout_ms == 0 {
            return Err(WorkflowError::Config(
                "render_timeout_ms must be positive".into(),
            ));
        }
        if !(1..=64).contains(&self.signature_display_len) {
            return Err(WorkflowError::Config(format!(
                "signature_display_len must be within 1..=64, got {}",
                self.signature_display_len
            )));
        }
        let prefix = Path::new(&self.document_prefix);
        if self.document_prefix.is_empty()
            || !prefix.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(WorkflowError::Config(format!(
                "document_prefix must be a relative path without '..', got {:?}",
                self.document_prefix
            )));
        }
        Ok(())
    }
}
