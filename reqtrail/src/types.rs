//! Identifier types shared across reqtrail.
//!
//! Identifiers use smart constructors so a value that exists is always valid,
//! following the "parse, don't validate" principle.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A correlation identifier tying log lines and responses to one inbound request.
///
/// Correlation ids are random (version 4) UUIDs, so two requests colliding is
/// a 122-bit birthday problem and can be ignored in practice.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::Random)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a fresh random correlation id.
    pub fn new() -> Self {
        // Uuid::new_v4() always yields a version 4 uuid
        Self::try_new(Uuid::new_v4()).expect("Uuid::new_v4() should always return a v4 UUID")
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable handle of one tracked asynchronous unit of work.
///
/// Handles are issued by a [`ContextTracker`](crate::context::ContextTracker)
/// from a monotonic counter and are never reused, so a finished unit can not
/// be confused with a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value behind this handle.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn correlation_id_accepts_valid_uuid_v4(uuid_bytes in any::<[u8; 16]>()) {
            let uuid = uuid::Builder::from_random_bytes(uuid_bytes).into_uuid();
            let result = CorrelationId::try_new(uuid);
            prop_assert!(result.is_ok());
            prop_assert_eq!(*result.unwrap().as_ref(), uuid);
        }

        #[test]
        fn correlation_id_rejects_non_v4_uuids(uuid_bytes in any::<[u8; 16]>(), version in prop_oneof![1u8..=3u8, 5u8..=8u8]) {
            let mut bytes = uuid_bytes;
            bytes[6] = (bytes[6] & 0x0F) | (version << 4);
            bytes[8] = (bytes[8] & 0x3F) | 0x80;

            let uuid = Uuid::from_bytes(bytes);
            prop_assert!(CorrelationId::try_new(uuid).is_err());
        }
    }

    #[test]
    fn correlation_id_new_creates_valid_v4() {
        let correlation_id = CorrelationId::new();
        assert_eq!(
            correlation_id.as_ref().get_version(),
            Some(uuid::Version::Random)
        );
    }

    #[test]
    fn correlation_ids_are_distinct() {
        let ids: std::collections::HashSet<_> = (0..1_000).map(|_| CorrelationId::new()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn correlation_id_serializes_as_plain_uuid_string() {
        let correlation_id = CorrelationId::new();
        let json = serde_json::to_string(&correlation_id).unwrap();
        assert_eq!(json, format!("\"{}\"", correlation_id.as_ref()));
    }

    #[test]
    fn task_handle_display_is_prefixed() {
        assert_eq!(TaskHandle::from_raw(7).to_string(), "task-7");
    }
}
