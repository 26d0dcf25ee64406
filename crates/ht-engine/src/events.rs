//! Lifecycle events emitted by the session manager.
//!
//! Events go to an optional channel supplied at construction time. Sending
//! never blocks: a full or disconnected channel drops the event.

use crossbeam_channel::Sender;
use ht_types::{ConfigurationId, SessionId, StrategyKind};
use serde::{Deserialize, Serialize};

use ht_optimizer::TransferStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session_id: SessionId,
        strategy: StrategyKind,
        bootstrap: usize,
    },
    SuggestionIssued {
        session_id: SessionId,
        configuration_id: ConfigurationId,
    },
    EvaluationRecorded {
        session_id: SessionId,
        configuration_id: ConfigurationId,
        sequence: usize,
        primary_metric: f64,
    },
    NewBest {
        session_id: SessionId,
        configuration_id: ConfigurationId,
        score: f64,
    },
    Paused {
        session_id: SessionId,
    },
    Resumed {
        session_id: SessionId,
    },
    Completed {
        session_id: SessionId,
        reason: String,
    },
    Failed {
        session_id: SessionId,
        error: String,
    },
    KnowledgeTransferred {
        session_id: SessionId,
        sources: Vec<SessionId>,
        strategy: TransferStrategy,
        seeded: usize,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Started { session_id, .. }
            | Self::SuggestionIssued { session_id, .. }
            | Self::EvaluationRecorded { session_id, .. }
            | Self::NewBest { session_id, .. }
            | Self::Paused { session_id }
            | Self::Resumed { session_id }
            | Self::Completed { session_id, .. }
            | Self::Failed { session_id, .. }
            | Self::KnowledgeTransferred { session_id, .. } => session_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<SessionEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};

    #[test]
    fn events_reach_the_channel() {
        let (tx, rx) = unbounded();
        let sink = EventSink::new(tx);
        sink.emit(SessionEvent::Paused {
            session_id: "session-1".into(),
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.session_id(), "session-1");
    }

    #[test]
    fn full_or_missing_channels_never_block() {
        let (tx, rx) = bounded(1);
        let sink = EventSink::new(tx);
        for _ in 0..3 {
            sink.emit(SessionEvent::Resumed {
                session_id: "s".into(),
            });
        }
        assert_eq!(rx.len(), 1);

        drop(rx);
        sink.emit(SessionEvent::Resumed {
            session_id: "s".into(),
        });
        EventSink::disabled().emit(SessionEvent::Resumed {
            session_id: "s".into(),
        });
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_value(SessionEvent::Completed {
            session_id: "session-3".into(),
            reason: "Maximum evaluations reached.".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "completed");
    }
}
