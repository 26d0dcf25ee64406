//! Identifier generation for spaces, sessions and configurations.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Space,
    Session,
    Configuration,
}

impl IdKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Space => "space",
            Self::Session => "session",
            Self::Configuration => "config",
        }
    }
}

/// Source of identifiers, injectable so tests can assert on exact ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, kind: IdKind) -> String;
}

/// Random v4 UUIDs with a kind prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self, kind: IdKind) -> String {
        format!("{}-{}", kind.prefix(), Uuid::new_v4())
    }
}

/// Monotonic per-kind counters: `space-1`, `session-1`, `config-1`, ...
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    spaces: AtomicU64,
    sessions: AtomicU64,
    configurations: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self, kind: IdKind) -> String {
        let counter = match kind {
            IdKind::Space => &self.spaces,
            IdKind::Session => &self.sessions,
            IdKind::Configuration => &self.configurations,
        };
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", kind.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_are_per_kind() {
        let ids = SequentialIdGenerator::new();
        assert_eq!(ids.next_id(IdKind::Space), "space-1");
        assert_eq!(ids.next_id(IdKind::Session), "session-1");
        assert_eq!(ids.next_id(IdKind::Space), "space-2");
        assert_eq!(ids.next_id(IdKind::Configuration), "config-1");
    }

    #[test]
    fn uuid_ids_are_prefixed_and_unique() {
        let ids = UuidIdGenerator;
        let a = ids.next_id(IdKind::Session);
        let b = ids.next_id(IdKind::Session);
        assert!(a.starts_with("session-"));
        assert_ne!(a, b);
    }
}
