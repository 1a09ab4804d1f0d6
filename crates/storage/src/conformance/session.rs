use std::future::Future;

use super::{fields, TestResult};
use crate::{AnswerState, StatePatch, StateStore};

pub(super) async fn run_session_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "session",
            "unknown_session_is_empty",
            unknown_session_is_empty(factory).await,
        ),
        TestResult::from_result(
            "session",
            "sessions_are_isolated",
            sessions_are_isolated(factory).await,
        ),
        TestResult::from_result(
            "session",
            "clear_drops_session_state",
            clear_drops_session_state(factory).await,
        ),
        TestResult::from_result(
            "session",
            "merge_returns_stored_state",
            merge_returns_stored_state(factory).await,
        ),
    ]
}

async fn unknown_session_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let state = store
        .get_state("never-seen")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if state != AnswerState::default() {
        return Err(format!("expected empty state, got {state:?}"));
    }
    Ok(())
}

async fn sessions_are_isolated<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .merge_state(
            "a",
            StatePatch::Fields(fields(&[("name", serde_json::json!("Ada"))])),
        )
        .await
        .map_err(|e| format!("merge a: {e}"))?;
    let b = store
        .get_state("b")
        .await
        .map_err(|e| format!("get b: {e}"))?;
    if !b.fields.is_empty() {
        return Err(format!("session b saw session a's answers: {:?}", b.fields));
    }
    Ok(())
}

async fn clear_drops_session_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .merge_state(
            "s",
            StatePatch::Progress(vec!["/form/start".to_string()]),
        )
        .await
        .map_err(|e| format!("merge: {e}"))?;
    store
        .clear_state("s")
        .await
        .map_err(|e| format!("clear: {e}"))?;
    let state = store
        .get_state("s")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if !state.progress.is_empty() {
        return Err(format!("progress survived clear: {:?}", state.progress));
    }
    Ok(())
}

async fn merge_returns_stored_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let returned = store
        .merge_state(
            "s",
            StatePatch::Fields(fields(&[("age", serde_json::json!(30))])),
        )
        .await
        .map_err(|e| format!("merge: {e}"))?;
    let stored = store
        .get_state("s")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if returned != stored {
        return Err(format!(
            "merge returned {returned:?} but store holds {stored:?}"
        ));
    }
    Ok(())
}
