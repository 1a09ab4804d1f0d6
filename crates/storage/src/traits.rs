use async_trait::async_trait;

use crate::error::StorageError;
use crate::state::{AnswerState, StatePatch};

/// The session state store used by the form flow engine.
///
/// A `StateStore` keeps one [`AnswerState`] per session key. The engine
/// only ever reads a whole state and merges patches into it; it never
/// writes a full state back.
///
/// ## Merge Semantics
///
/// `merge_state` must apply the patch as a unit: concurrent readers see
/// either the state before the patch or the state after it, never a
/// partial application. Patches addressed to one iteration of a repeated
/// section (see [`StatePatch::is_repeat_patch`]) must leave every other
/// iteration unchanged.
///
/// The engine does not serialize requests for the same session. Two
/// patches racing for the same session are applied in some order; each
/// must be applied against the state left by the other.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so they can be shared
/// across async request handlers.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Read the current state for a session.
    ///
    /// Unknown sessions yield an empty state rather than an error.
    async fn get_state(&self, session: &str) -> Result<AnswerState, StorageError>;

    /// Apply a patch atomically and return the resulting state.
    ///
    /// Returns `Err(StorageError::ShapeConflict)` if the patch addresses a
    /// section whose stored shape does not match; the stored state is
    /// left unchanged in that case.
    async fn merge_state(
        &self,
        session: &str,
        patch: StatePatch,
    ) -> Result<AnswerState, StorageError>;

    /// Drop all state for a session.
    async fn clear_state(&self, session: &str) -> Result<(), StorageError>;
}
