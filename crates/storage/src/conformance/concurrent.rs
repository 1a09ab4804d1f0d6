use std::future::Future;
use std::sync::Arc;

use serde_json::json;

use super::{fields, iteration_patch, TestResult};
use crate::{StatePatch, StateStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_field_merges_all_survive",
            concurrent_field_merges_all_survive(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_iteration_appends_are_not_lost",
            concurrent_iteration_appends_are_not_lost(factory).await,
        ),
    ]
}

// ── Concurrent merges: every field survives ─────────────────────────────────

/// N tasks each merge a distinct field into the same session. Because each
/// merge is atomic against the latest state, all N fields must be present.
async fn concurrent_field_merges_all_survive<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("field_{i}");
            s.merge_state(
                "shared",
                StatePatch::Fields(fields(&[(key.as_str(), json!(i))])),
            )
            .await
            .map(|_| ())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let state = store
        .get_state("shared")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if state.fields.len() != N {
        return Err(format!(
            "expected {N} fields after concurrent merges, found {}",
            state.fields.len()
        ));
    }
    Ok(())
}

// ── Double submit: appended iterations are never lost ───────────────────────

/// N tasks each submit the first page of a new iteration at the same time,
/// the way a double-clicked submit button does. The store cannot tell
/// these apart from genuine new iterations, so every one must be recorded;
/// none may overwrite another.
async fn concurrent_iteration_appends_are_not_lost<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            s.merge_state(
                "shared",
                iteration_patch("people", None, "/name", &[("name", json!(i))]),
            )
            .await
            .map(|_| ())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let state = store
        .get_state("shared")
        .await
        .map_err(|e| format!("get: {e}"))?;
    let iterations = state.iterations("people");
    if iterations.len() != N {
        return Err(format!(
            "expected {N} iterations after concurrent appends, found {}",
            iterations.len()
        ));
    }
    let mut seen: Vec<i64> = iterations
        .iter()
        .filter_map(|it| it.page("/name")?.get("name")?.as_i64())
        .collect();
    seen.sort_unstable();
    if seen != (0..N as i64).collect::<Vec<_>>() {
        return Err(format!("iteration answers lost or duplicated: {seen:?}"));
    }
    Ok(())
}
