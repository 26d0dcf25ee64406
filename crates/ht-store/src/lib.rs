//! # ht-store
//!
//! Persistence of search spaces and tuning sessions.
//!
//! The engine keeps its working set in memory and writes through to a
//! [`TuningStore`] after every transition. Stores are synchronous; callers
//! log failures instead of propagating them.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use ht_types::{SearchSpace, SessionId, TuneResult, TuningSession};

/// Durable home for search spaces and session snapshots.
pub trait TuningStore: Send + Sync {
    fn save_search_space(&self, space: &SearchSpace) -> TuneResult<()>;

    fn load_search_space(&self, space_id: &str) -> TuneResult<Option<SearchSpace>>;

    /// Overwrites any previous snapshot of the same session.
    fn save_session(&self, session: &TuningSession) -> TuneResult<()>;

    fn load_session(&self, session_id: &str) -> TuneResult<Option<TuningSession>>;

    /// Identifiers of every stored session, sorted.
    fn session_ids(&self) -> TuneResult<Vec<SessionId>>;
}
