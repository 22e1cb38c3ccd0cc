//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-user session registry.

use documind_core::{
    ConversationOrchestrator, DocumentNormalizer, LifecyclePhase, SessionLifecycleController,
    SessionStore, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub orchestrator: ConversationOrchestrator,
    pub normalizer: Arc<DocumentNormalizer>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        orchestrator: ConversationOrchestrator,
        normalizer: DocumentNormalizer,
    ) -> Self {
        Self {
            store,
            orchestrator,
            normalizer: Arc::new(normalizer),
            sessions: SessionRegistry::default(),
        }
    }

    /// The controller for `user_id`, restoring their stored session on first use.
    pub async fn session(&self, user_id: &UserId) -> SessionLifecycleController {
        self.sessions.attach(&self.store, user_id).await
    }
}

//=========================================================================================
// SessionRegistry (One Lifecycle Controller per Signed-in User)
//=========================================================================================

#[derive(Clone, Default)]
pub struct SessionRegistry {
    controllers: Arc<Mutex<HashMap<UserId, SessionLifecycleController>>>,
}

impl SessionRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, SessionLifecycleController>> {
        self.controllers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the user's controller, creating and identifying it if needed.
    ///
    /// A controller found mid-restore is returned as-is; callers see its phase.
    pub async fn attach(
        &self,
        store: &Arc<dyn SessionStore>,
        user_id: &UserId,
    ) -> SessionLifecycleController {
        let controller = self
            .lock()
            .entry(user_id.clone())
            .or_insert_with(|| SessionLifecycleController::new(Arc::clone(store)))
            .clone();

        if controller.phase() == LifecyclePhase::Uninitialized {
            debug!(user_id = %user_id, "First request for user; restoring session");
            controller.identify(Some(user_id.clone())).await;
        }
        controller
    }

    /// Forgets the user's controller, returning it if there was one.
    pub fn detach(&self, user_id: &UserId) -> Option<SessionLifecycleController> {
        self.lock().remove(user_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
