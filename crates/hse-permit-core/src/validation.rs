//! Structural validation of permit content.

use crate::canonical::FieldMap;
use crate::error::ValidationError;
use crate::permit::{Permit, PermitDraft};

fn validate_content(
    title: &str,
    starts_at: i64,
    ends_at: i64,
    maps: [(&'static str, &FieldMap); 4],
) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if ends_at <= starts_at {
        return Err(ValidationError::InvalidWindow { starts_at, ends_at });
    }
    for (name, map) in maps {
        if map.keys().any(|k| k.trim().is_empty()) {
            return Err(ValidationError::EmptyFieldKey { map: name });
        }
    }
    Ok(())
}

/// Validate a draft before it becomes a permit.
pub fn validate_draft(draft: &PermitDraft) -> Result<(), ValidationError> {
    validate_content(
        &draft.title,
        draft.starts_at,
        draft.ends_at,
        [
            ("preconditions", &draft.preconditions),
            ("prevention_measures", &draft.prevention_measures),
            ("atmospheric_tests", &draft.atmospheric_tests),
            ("attachments", &draft.attachments),
        ],
    )
}

/// Validate a permit after a content patch.
pub fn validate_permit(permit: &Permit) -> Result<(), ValidationError> {
    validate_content(
        &permit.title,
        permit.starts_at,
        permit.ends_at,
        [
            ("preconditions", &permit.preconditions),
            ("prevention_measures", &permit.prevention_measures),
            ("atmospheric_tests", &permit.atmospheric_tests),
            ("attachments", &permit.attachments),
        ],
    )
}
