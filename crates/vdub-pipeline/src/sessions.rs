//! In-memory session store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use vdub_models::{Session, SessionId, Stage};

use crate::error::{PipelineError, PipelineResult};

/// Map from session ID to that session's pipeline record.
///
/// A session is inserted when a mutation first touches it and dropped again
/// once it is vacant (no artifacts, no running stage), so teardown and
/// failed precondition checks leave nothing behind.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a session, if it exists.
    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.inner.read().await.get(id).cloned()
    }

    /// Snapshot of a session; an unknown ID reads as a fresh empty session
    /// without being stored.
    pub async fn get_or_empty(&self, id: &SessionId) -> Session {
        self.get(id)
            .await
            .unwrap_or_else(|| Session::new(id.clone()))
    }

    /// Mutate a session under the write lock, creating it if needed.
    ///
    /// The entry is removed afterwards if `f` left it vacant.
    pub async fn update<R>(&self, id: &SessionId, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.inner.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        let out = f(session);
        if session.is_vacant() {
            sessions.remove(id);
        }
        out
    }

    /// Like [`update`](Self::update), refusing while a stage is running.
    pub async fn update_idle<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> PipelineResult<R> {
        self.update(id, |session| match session.active_stage {
            Some(active) => Err(PipelineError::Busy(active)),
            None => Ok(f(session)),
        })
        .await
    }

    /// Claim the session's stage slot.
    ///
    /// `check` runs under the same lock, so preconditions and the claim are
    /// atomic. Whatever `check` extracts from the session is handed back as
    /// the stage's inputs.
    pub async fn begin_stage<T>(
        &self,
        id: &SessionId,
        stage: Stage,
        check: impl FnOnce(&Session) -> PipelineResult<T>,
    ) -> PipelineResult<T> {
        self.update(id, |session| {
            if let Some(active) = session.active_stage {
                return Err(PipelineError::Busy(active));
            }
            let inputs = check(session)?;
            session.active_stage = Some(stage);
            Ok(inputs)
        })
        .await
    }

    /// Release the stage slot claimed by [`begin_stage`](Self::begin_stage).
    pub async fn end_stage(&self, id: &SessionId, stage: Stage) {
        let mut sessions = self.inner.write().await;
        let vacant = match sessions.get_mut(id) {
            Some(session) => {
                if session.active_stage == Some(stage) {
                    session.active_stage = None;
                }
                session.is_vacant()
            }
            None => false,
        };
        if vacant {
            sessions.remove(id);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
