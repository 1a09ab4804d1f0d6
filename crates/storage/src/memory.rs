//! In-process state store backed by a `HashMap`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::state::{AnswerState, StatePatch};
use crate::traits::StateStore;

/// A [`StateStore`] that keeps every session in memory.
///
/// Merges run under a write lock against a copy of the session's state,
/// which is swapped in only if the patch applies cleanly.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    sessions: RwLock<HashMap<String, AnswerState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions holding state.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Replace a session's state wholesale. Used to seed a session from a
    /// saved snapshot.
    pub async fn insert_state(&self, session: &str, state: AnswerState) {
        self.sessions
            .write()
            .await
            .insert(session.to_string(), state);
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_state(&self, session: &str) -> Result<AnswerState, StorageError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session)
            .cloned()
            .unwrap_or_default())
    }

    async fn merge_state(
        &self,
        session: &str,
        patch: StatePatch,
    ) -> Result<AnswerState, StorageError> {
        let mut sessions = self.sessions.write().await;
        let mut next = sessions.get(session).cloned().unwrap_or_default();
        next.apply(&patch)?;
        sessions.insert(session.to_string(), next.clone());
        Ok(next)
    }

    async fn clear_state(&self, session: &str) -> Result<(), StorageError> {
        self.sessions.write().await.remove(session);
        Ok(())
    }
}
