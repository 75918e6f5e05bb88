//! Message identity generation.
//!
//! Identity is assigned by the producer when a [`Message`](crate::Message)
//! is constructed, never by the transport. The generator is passed in
//! explicitly so tests can use a deterministic one and independent
//! generators can coexist without shared global state.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of unique message identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce the next identifier.
    fn next(&self) -> String;
}

/// Collision-resistant generator backed by random (v4) UUIDs.
///
/// Stateless; every value is an independent generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next(&self) -> String {
        // ---
        Uuid::new_v4().to_string()
    }
}

/// Deterministic generator producing `"{prefix}-{n}"`, starting at 1.
///
/// Unique only within one generator instance.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    // ---
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    /// Create a generator with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        // ---
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next(&self) -> String {
        // ---
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_generate_unique() {
        // ---
        let generator = UuidGenerator;
        let ids: HashSet<String> = (0..10_000).map(|_| generator.next()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_uuid_format() {
        // ---
        let id = UuidGenerator.next();
        assert_eq!(id.len(), 36); // Standard UUID format
    }

    #[test]
    fn test_sequential_is_deterministic() {
        // ---
        let generator = SequentialIdGenerator::new("msg");
        assert_eq!(generator.next(), "msg-1");
        assert_eq!(generator.next(), "msg-2");

        let other = SequentialIdGenerator::new("msg");
        assert_eq!(other.next(), "msg-1");
    }
}
