//! An in-process `SessionStore`. Backs tests, and the server when no database is configured.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{Session, UserId};
use crate::ports::{PortResult, SessionStore};

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &UserId) -> PortResult<Option<Session>> {
        Ok(self.sessions.read().await.get(user_id).cloned())
    }

    async fn put(&self, session: &Session) -> PortResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.user_id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &UserId) -> PortResult<()> {
        self.sessions.write().await.remove(user_id);
        Ok(())
    }
}
