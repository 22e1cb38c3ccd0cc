//! crates/documind_core/src/lifecycle.rs
//!
//! Owns the restore-then-autosave state machine for one client's
//! (document, history) pair.
//!
//! ```text
//!   Uninitialized ──identify(user)──▶ Restoring ──lookup settles──▶ Ready
//!         ▲                              ▲                           │
//!         └────────── sign_out ──────────┴──── identify(other) ──────┘
//! ```
//!
//! Every identity change bumps a generation counter. A restore captures the
//! generation when it starts and only applies its result if the counter is
//! unchanged when the lookup settles, so a lookup for a superseded identity
//! is discarded. Mutations are only accepted in `Ready`, and each one issues a
//! full-snapshot autosave in the background.
//!
//! Store writes go through one per-controller write lock. A snapshot older than
//! the last one written for its generation is skipped, and once `new_chat` or
//! `sign_out` has cleared a user's record, pending snapshots from before the
//! clear are dropped instead of writing the old session back.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{ChatMessage, ConversationState, Document, Session, UserId};
use crate::ports::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Uninitialized,
    Restoring,
    Ready,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Uninitialized => "uninitialized",
            LifecyclePhase::Restoring => "restoring",
            LifecyclePhase::Ready => "ready",
        }
    }
}

/// How a call to `identify` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing was stored; started empty.
    Empty,
    /// The stored pair was adopted verbatim.
    Restored,
    /// The stored history had no document and was dropped.
    Recovered,
    /// The lookup failed; started empty.
    StoreFailed,
    /// The identity changed while the lookup was in flight; the result was discarded.
    Superseded,
    /// No identity; the controller is back to `Uninitialized`.
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("The session is not ready (currently {})", .0.as_str())]
    NotReady(LifecyclePhase),
    #[error("No user is signed in")]
    NoIdentity,
    #[error("No document has been uploaded")]
    NoDocument,
    /// The document or history was replaced while an answer was being produced.
    #[error("The conversation changed before the answer arrived")]
    ConversationChanged,
}

/// Background full-snapshot write issued after a change. Awaiting it is optional.
pub type AutosaveHandle = JoinHandle<()>;

/// Identifies the conversation a question was asked in.
///
/// Changes whenever the identity, the document or the history as a whole is
/// replaced, so an answer can be matched back to the conversation it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTicket {
    generation: u64,
    epoch: u64,
}

/// What the orchestrator needs to answer a question that was just recorded.
#[derive(Debug)]
pub struct PendingTurn {
    pub document: Document,
    /// The history before the question.
    pub history: Vec<ChatMessage>,
    pub ticket: TurnTicket,
    pub autosave: AutosaveHandle,
}

struct ControllerInner {
    identity: Option<UserId>,
    generation: u64,
    /// Bumped when the document or history is replaced wholesale.
    epoch: u64,
    /// Bumped on every mutation; orders snapshots within a generation.
    revision: u64,
    phase: LifecyclePhase,
    state: ConversationState,
}

impl ControllerInner {
    /// Enter a new identity epoch, invalidating any restore in flight.
    fn advance(&mut self, identity: Option<UserId>, phase: LifecyclePhase) -> u64 {
        self.generation += 1;
        self.epoch += 1;
        self.identity = identity;
        self.phase = phase;
        self.state = ConversationState::default();
        self.generation
    }

    fn ticket(&self) -> TurnTicket {
        TurnTicket {
            generation: self.generation,
            epoch: self.epoch,
        }
    }

    fn ready_identity(&self) -> Result<UserId, LifecycleError> {
        match (&self.phase, &self.identity) {
            (LifecyclePhase::Ready, Some(user_id)) => Ok(user_id.clone()),
            (phase, _) => Err(LifecycleError::NotReady(*phase)),
        }
    }
}

/// A snapshot waiting to be written, tagged with where it came from.
struct Autosave {
    session: Session,
    generation: u64,
    revision: u64,
}

/// Bookkeeping guarded by the write lock.
#[derive(Default)]
struct WriteLedger {
    /// `(generation, revision)` of the last snapshot written.
    last_written: (u64, u64),
    /// The last user whose record was cleared, and the newest generation cleared.
    cleared: Option<(UserId, u64)>,
}

impl WriteLedger {
    fn admits(&self, save: &Autosave) -> bool {
        let (generation, revision) = self.last_written;
        if save.generation == generation && save.revision <= revision {
            return false;
        }
        !matches!(
            &self.cleared,
            Some((user_id, through)) if *user_id == save.session.user_id && save.generation <= *through
        )
    }
}

/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct SessionLifecycleController {
    store: Arc<dyn SessionStore>,
    inner: Arc<Mutex<ControllerInner>>,
    writes: Arc<AsyncMutex<WriteLedger>>,
}

impl SessionLifecycleController {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            inner: Arc::new(Mutex::new(ControllerInner {
                identity: None,
                generation: 0,
                epoch: 0,
                revision: 0,
                phase: LifecyclePhase::Uninitialized,
                state: ConversationState::default(),
            })),
            writes: Arc::new(AsyncMutex::new(WriteLedger::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        // Critical sections never panic midway, so a poisoned lock still holds consistent state.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lock().phase
    }

    pub fn identity(&self) -> Option<UserId> {
        self.lock().identity.clone()
    }

    /// A copy of the current in-memory (document, history) pair.
    pub fn snapshot(&self) -> ConversationState {
        self.lock().state.clone()
    }

    //-------------------------------------------------------------------------------------
    // Restore
    //-------------------------------------------------------------------------------------

    /// Make `user` the active identity and restore their stored session.
    ///
    /// Passing `None` drops back to `Uninitialized`. If another `identify`
    /// (or `sign_out`) happens before the lookup settles, this call returns
    /// `Superseded` and leaves the newer state untouched.
    pub async fn identify(&self, user: Option<UserId>) -> RestoreOutcome {
        let Some(user_id) = user else {
            self.lock().advance(None, LifecyclePhase::Uninitialized);
            return RestoreOutcome::Cleared;
        };

        let token = self
            .lock()
            .advance(Some(user_id.clone()), LifecyclePhase::Restoring);
        debug!(user_id = %user_id, generation = token, "Restoring session");

        let lookup = self.store.get(&user_id).await;

        let mut inner = self.lock();
        if inner.generation != token {
            debug!(
                user_id = %user_id,
                generation = token,
                current = inner.generation,
                "Discarding superseded restore"
            );
            return RestoreOutcome::Superseded;
        }

        let (state, outcome) = match lookup {
            Ok(None) => (ConversationState::default(), RestoreOutcome::Empty),
            Ok(Some(session)) if session.is_orphaned() => {
                warn!(
                    user_id = %user_id,
                    messages = session.messages.len(),
                    "Stored history has no document; starting a fresh session"
                );
                (ConversationState::default(), RestoreOutcome::Recovered)
            }
            Ok(Some(session)) => (session.into_state(), RestoreOutcome::Restored),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to restore session");
                (ConversationState::default(), RestoreOutcome::StoreFailed)
            }
        };

        inner.state = state;
        inner.phase = LifecyclePhase::Ready;
        info!(user_id = %user_id, ?outcome, "Session ready");
        outcome
    }

    //-------------------------------------------------------------------------------------
    // Mutations (Ready only, each followed by an autosave)
    //-------------------------------------------------------------------------------------

    /// Replace the document and reset the history to the upload acknowledgment.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn replace_document(&self, document: Document) -> Result<AutosaveHandle, LifecycleError> {
        self.mutate(|inner| {
            inner.epoch += 1;
            inner.state.messages = vec![ChatMessage::upload_acknowledgment(&document.name)];
            inner.state.document = Some(document);
            Ok(())
        })
    }

    /// Append one message to the history.
    pub fn append_message(&self, message: ChatMessage) -> Result<AutosaveHandle, LifecycleError> {
        self.mutate(|inner| {
            inner.state.messages.push(message);
            Ok(())
        })
    }

    /// Empty the history but keep the document.
    pub fn clear_messages(&self) -> Result<AutosaveHandle, LifecycleError> {
        self.mutate(|inner| {
            inner.epoch += 1;
            inner.state.messages.clear();
            Ok(())
        })
    }

    /// Record a question and hand back what is needed to answer it.
    ///
    /// The returned ticket must be passed to `finish_turn` with the answer.
    pub fn begin_turn(&self, question: ChatMessage) -> Result<PendingTurn, LifecycleError> {
        let mut turn = None;
        let autosave = self.mutate(|inner| {
            let document = inner
                .state
                .document
                .clone()
                .ok_or(LifecycleError::NoDocument)?;
            let history = inner.state.messages.clone();
            turn = Some((document, history, inner.ticket()));
            inner.state.messages.push(question);
            Ok(())
        })?;

        let (document, history, ticket) = turn.ok_or(LifecycleError::NoDocument)?;
        Ok(PendingTurn {
            document,
            history,
            ticket,
            autosave,
        })
    }

    /// Append the answer to the turn started with `ticket`.
    ///
    /// Fails with `ConversationChanged`, leaving the state untouched, if the
    /// identity, document or history was replaced since the turn began.
    pub fn finish_turn(
        &self,
        ticket: TurnTicket,
        answer: ChatMessage,
    ) -> Result<AutosaveHandle, LifecycleError> {
        self.mutate(|inner| {
            if inner.ticket() != ticket {
                return Err(LifecycleError::ConversationChanged);
            }
            inner.state.messages.push(answer);
            Ok(())
        })
    }

    fn mutate(
        &self,
        change: impl FnOnce(&mut ControllerInner) -> Result<(), LifecycleError>,
    ) -> Result<AutosaveHandle, LifecycleError> {
        let save = {
            let mut inner = self.lock();
            let user_id = inner.ready_identity()?;
            change(&mut *inner)?;
            inner.revision += 1;
            Autosave {
                session: Session::snapshot(user_id, &inner.state),
                generation: inner.generation,
                revision: inner.revision,
            }
        };
        Ok(self.autosave(save))
    }

    fn autosave(&self, save: Autosave) -> AutosaveHandle {
        let store = Arc::clone(&self.store);
        let writes = Arc::clone(&self.writes);
        tokio::spawn(async move {
            let mut ledger = writes.lock().await;
            let user_id = &save.session.user_id;
            if !ledger.admits(&save) {
                debug!(
                    user_id = %user_id,
                    generation = save.generation,
                    revision = save.revision,
                    "Skipping superseded auto-save"
                );
                return;
            }
            match store.put(&save.session).await {
                Ok(()) => {
                    ledger.last_written = (save.generation, save.revision);
                    debug!(
                        user_id = %user_id,
                        messages = save.session.messages.len(),
                        "Session saved"
                    );
                }
                Err(e) => warn!(
                    user_id = %user_id,
                    error = %e,
                    "Auto-save failed; the next change will retry"
                ),
            }
        })
    }

    /// Delete the stored record once every earlier write has settled, and
    /// fence off writes still queued from `through` or older generations.
    async fn clear_stored(&self, user_id: &UserId, through: u64) {
        let mut ledger = self.writes.lock().await;
        ledger.cleared = Some((user_id.clone(), through));
        if let Err(e) = self.store.delete(user_id).await {
            warn!(user_id = %user_id, error = %e, "Failed to delete stored session");
        }
    }

    //-------------------------------------------------------------------------------------
    // New chat / sign-out
    //-------------------------------------------------------------------------------------

    /// Delete the stored record and start over with `(None, [])`.
    ///
    /// Works while a restore is in flight too: that restore is discarded.
    pub async fn new_chat(&self) -> Result<(), LifecycleError> {
        let (user_id, cleared) = {
            let mut inner = self.lock();
            let user_id = inner.identity.clone().ok_or(LifecycleError::NoIdentity)?;
            let cleared = inner.generation;
            inner.advance(Some(user_id.clone()), LifecyclePhase::Ready);
            (user_id, cleared)
        };

        self.clear_stored(&user_id, cleared).await;
        info!(user_id = %user_id, "Started a new chat");
        Ok(())
    }

    /// Clear the user's stored session and forget the identity.
    pub async fn sign_out(&self) -> Result<(), LifecycleError> {
        let (user_id, cleared) = {
            let mut inner = self.lock();
            let user_id = inner.identity.clone().ok_or(LifecycleError::NoIdentity)?;
            let cleared = inner.generation;
            inner.advance(None, LifecyclePhase::Uninitialized);
            (user_id, cleared)
        };

        self.clear_stored(&user_id, cleared).await;
        info!(user_id = %user_id, "Signed out");
        Ok(())
    }
}
