//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use hse_permit_core::{
    FieldMap, PermitDraft, PermitId, PermitStatus, PermitTypeId, Role, UserId, ZoneId,
};
use hse_permit_perms::Actor;

/// Generate a Role.
pub fn role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

/// Generate a PermitStatus.
pub fn permit_status() -> impl Strategy<Value = PermitStatus> {
    prop::sample::select(PermitStatus::ALL.to_vec())
}

/// Generate an actor with a random id.
pub fn actor() -> impl Strategy<Value = Actor> {
    (any::<[u8; 16]>(), role()).prop_map(|(id, role)| Actor::new(UserId::from_bytes(id), role))
}

/// Generate a reasonable timestamp (Unix ms, 1970..2100).
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}

/// Generate a scalar JSON value.
pub fn field_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-zA-Z0-9 %.]{0,16}".prop_map(Value::from),
    ]
}

/// Generate a FieldMap with up to `max_len` entries.
pub fn field_map(max_len: usize) -> impl Strategy<Value = FieldMap> {
    prop::collection::btree_map("[a-zA-Z][a-zA-Z0-9_]{0,11}", field_value(), 0..=max_len)
}

/// Generate a valid PermitDraft.
pub fn permit_draft() -> impl Strategy<Value = PermitDraft> {
    (
        any::<[u8; 16]>(),
        any::<[u8; 16]>(),
        0i64..=4_000_000_000_000i64,
        1i64..=30 * 86_400_000i64,
        "[A-Za-z][A-Za-z0-9 ]{0,39}",
        "[ -~]{0,120}",
        field_map(4),
        field_map(4),
        field_map(4),
    )
        .prop_map(
            |(type_id, zone_id, starts_at, duration, title, description, pre, prev, atmo)| {
                PermitDraft {
                    permit_type_id: PermitTypeId::from_bytes(type_id),
                    zone_id: ZoneId::from_bytes(zone_id),
                    starts_at,
                    ends_at: starts_at + duration,
                    title,
                    description,
                    preconditions: pre,
                    prevention_measures: prev,
                    atmospheric_tests: atmo,
                    attachments: FieldMap::new(),
                }
            },
        )
}

/// The inputs of a signature digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInputs {
    pub secret: Vec<u8>,
    pub permit_id: PermitId,
    pub actor_id: UserId,
    pub timestamp: i64,
}

impl Arbitrary for SignatureInputs {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            prop::collection::vec(any::<u8>(), 1..=64),
            any::<[u8; 16]>(),
            any::<[u8; 16]>(),
            any::<i64>(),
        )
            .prop_map(|(secret, permit, actor, timestamp)| SignatureInputs {
                secret,
                permit_id: PermitId::from_bytes(permit),
                actor_id: UserId::from_bytes(actor),
                timestamp,
            })
            .boxed()
    }
}
