//! Classification of reads that must go through a continuation.
//!
//! The hosted sandbox loads a handful of large text fields lazily, so
//! scripts have to read them with a callback. Everything else is a plain
//! synchronous read.

use crate::kind::ObjectKind;

/// Kinds whose large fields are loaded lazily
pub const ASYNC_KINDS: [ObjectKind; 2] = [ObjectKind::Character, ObjectKind::Handout];

/// Fields that are lazily loaded on async kinds
pub const ASYNC_FIELDS: [&str; 4] = ["notes", "gmnotes", "bio", "defaulttoken"];

/// Static policy consulted by entity reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncFieldGate;

impl AsyncFieldGate {
    pub fn is_async_kind(&self, kind: ObjectKind) -> bool {
        ASYNC_KINDS.contains(&kind)
    }

    pub fn is_async_field(&self, field: &str) -> bool {
        ASYNC_FIELDS.contains(&field)
    }

    /// Whether reading `field` on an object of `kind` needs a continuation.
    pub fn requires_continuation(&self, kind: ObjectKind, field: &str) -> bool {
        self.is_async_kind(kind) && self.is_async_field(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_field_on_async_kind() {
        let gate = AsyncFieldGate;
        assert!(gate.requires_continuation(ObjectKind::Character, "bio"));
        assert!(gate.requires_continuation(ObjectKind::Handout, "notes"));
    }

    #[test]
    fn test_async_field_on_sync_kind() {
        let gate = AsyncFieldGate;
        assert!(!gate.requires_continuation(ObjectKind::Graphic, "gmnotes"));
    }

    #[test]
    fn test_plain_field_on_async_kind() {
        let gate = AsyncFieldGate;
        assert!(!gate.requires_continuation(ObjectKind::Character, "name"));
    }
}
