//! Core identifier newtypes.
//!
//! Messages are addressed by `(source, position)` rather than by reference, so the
//! identity survives reloads that hand out fresh `Arc<Message>` allocations.

use std::fmt;

/// Stable identity of a message source.
///
/// Arbitrary but deterministic: it is the secondary key of the merge order, so two
/// sources must never share an id within one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Create a source id from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Identity of a single message: owning source plus its byte position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageKey {
    /// Source the message was read from.
    pub source_id: SourceId,
    /// Byte position of the message inside its source.
    pub position: u64,
}

impl MessageKey {
    /// Create a message key.
    pub fn new(source_id: SourceId, position: u64) -> Self {
        Self {
            source_id,
            position,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.source_id, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn source_id_round_trips_raw_value() {
        assert_eq!(SourceId::new(42).get(), 42);
    }

    #[test]
    fn source_id_display_is_readable() {
        assert_eq!(SourceId::new(7).to_string(), "source#7");
    }

    #[test]
    fn message_key_equality_requires_source_and_position() {
        let a = MessageKey::new(SourceId::new(1), 100);
        let b = MessageKey::new(SourceId::new(1), 100);
        let c = MessageKey::new(SourceId::new(2), 100);
        let d = MessageKey::new(SourceId::new(1), 101);

        assert_eq!(a, b);
        assert_ne!(a, c, "Different source should not match");
        assert_ne!(a, d, "Different position should not match");
    }

    #[test]
    fn message_key_is_hashable() {
        let mut set = HashSet::new();
        set.insert(MessageKey::new(SourceId::new(1), 0));
        set.insert(MessageKey::new(SourceId::new(1), 0));
        set.insert(MessageKey::new(SourceId::new(1), 10));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn message_key_display_includes_source_and_position() {
        let key = MessageKey::new(SourceId::new(3), 512);
        assert_eq!(key.to_string(), "source#3@512");
    }
}
