use dashmap::DashMap;
use ht_types::{SearchSpace, SessionId, SpaceId, TuneResult, TuningSession};

use crate::TuningStore;

/// Process-local store, the default when no directory is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    spaces: DashMap<SpaceId, SearchSpace>,
    sessions: DashMap<SessionId, TuningSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spaces.len() + self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.spaces.clear();
        self.sessions.clear();
    }
}

impl TuningStore for MemoryStore {
    fn save_search_space(&self, space: &SearchSpace) -> TuneResult<()> {
        self.spaces.insert(space.id.clone(), space.clone());
        Ok(())
    }

    fn load_search_space(&self, space_id: &str) -> TuneResult<Option<SearchSpace>> {
        Ok(self.spaces.get(space_id).map(|entry| entry.value().clone()))
    }

    fn save_session(&self, session: &TuningSession) -> TuneResult<()> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> TuneResult<Option<TuningSession>> {
        Ok(self.sessions.get(session_id).map(|entry| entry.value().clone()))
    }

    fn session_ids(&self) -> TuneResult<Vec<SessionId>> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ht_types::{
        ParameterDefinition, SamplingStrategy, SearchBounds, SessionStrategy, StrategyKind,
    };

    fn space(id: &str) -> SearchSpace {
        SearchSpace {
            id: id.into(),
            name: "toy".into(),
            parameters: vec![ParameterDefinition::continuous("x", 0.0, 1.0)],
            constraints: vec![],
            search_bounds: SearchBounds::default(),
            sampling_strategy: SamplingStrategy::Random,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn round_trips_spaces_and_sessions() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.save_search_space(&space("space-1")).unwrap();
        assert_eq!(store.load_search_space("space-1").unwrap().unwrap().name, "toy");
        assert!(store.load_search_space("space-2").unwrap().is_none());

        let mut session = TuningSession::new(
            "session-2".into(),
            "space-1".into(),
            SessionStrategy::new(StrategyKind::Random),
            10,
        );
        store.save_session(&session).unwrap();
        session.mark_running();
        store.save_session(&session).unwrap();
        store
            .save_session(&TuningSession::new(
                "session-1".into(),
                "space-1".into(),
                SessionStrategy::new(StrategyKind::Genetic),
                5,
            ))
            .unwrap();

        let loaded = store.load_session("session-2").unwrap().unwrap();
        assert_eq!(loaded.status, ht_types::SessionStatus::Running);
        assert_eq!(store.session_ids().unwrap(), vec!["session-1", "session-2"]);
        assert_eq!(store.len(), 3);

        store.clear();
        assert!(store.is_empty());
    }
}
