use std::future::Future;

use serde_json::json;

use super::{fields, iteration_patch, TestResult};
use crate::{SectionState, StatePatch, StateStore, StorageError};

pub(super) async fn run_merge_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "merge",
            "fields_merge_without_dropping_keys",
            fields_merge_without_dropping_keys(factory).await,
        ),
        TestResult::from_result(
            "merge",
            "section_patch_creates_flat_section",
            section_patch_creates_flat_section(factory).await,
        ),
        TestResult::from_result(
            "merge",
            "iteration_patch_creates_slot",
            iteration_patch_creates_slot(factory).await,
        ),
        TestResult::from_result(
            "merge",
            "iteration_patch_leaves_other_iterations",
            iteration_patch_leaves_other_iterations(factory).await,
        ),
        TestResult::from_result(
            "merge",
            "shape_conflict_leaves_state_unchanged",
            shape_conflict_leaves_state_unchanged(factory).await,
        ),
    ]
}

async fn fields_merge_without_dropping_keys<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .merge_state("s", StatePatch::Fields(fields(&[("a", json!(1))])))
        .await
        .map_err(|e| format!("merge a: {e}"))?;
    let state = store
        .merge_state("s", StatePatch::Fields(fields(&[("b", json!(2))])))
        .await
        .map_err(|e| format!("merge b: {e}"))?;
    if state.fields != fields(&[("a", json!(1)), ("b", json!(2))]) {
        return Err(format!("unexpected fields: {:?}", state.fields));
    }
    Ok(())
}

async fn section_patch_creates_flat_section<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let state = store
        .merge_state(
            "s",
            StatePatch::Section {
                section: "applicant".to_string(),
                fields: fields(&[("age", json!(41))]),
            },
        )
        .await
        .map_err(|e| format!("merge: {e}"))?;
    match state.section("applicant") {
        Some(SectionState::Flat(f)) if f.get("age") == Some(&json!(41)) => Ok(()),
        other => Err(format!("expected flat applicant section, got {other:?}")),
    }
}

async fn iteration_patch_creates_slot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let state = store
        .merge_state(
            "s",
            iteration_patch("people", Some(0), "/name", &[("name", json!("Ada"))]),
        )
        .await
        .map_err(|e| format!("merge: {e}"))?;
    let iterations = state.iterations("people");
    if iterations.len() != 1 {
        return Err(format!("expected 1 iteration, got {}", iterations.len()));
    }
    if iterations[0].page("/name") != Some(&fields(&[("name", json!("Ada"))])) {
        return Err(format!("unexpected slot: {:?}", iterations[0]));
    }
    Ok(())
}

async fn iteration_patch_leaves_other_iterations<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for name in ["Ada", "Grace", "Edsger"] {
        store
            .merge_state(
                "s",
                iteration_patch("people", None, "/name", &[("name", json!(name))]),
            )
            .await
            .map_err(|e| format!("seed {name}: {e}"))?;
    }
    let before = store
        .get_state("s")
        .await
        .map_err(|e| format!("get: {e}"))?;
    let before_json: Vec<String> = before
        .iterations("people")
        .iter()
        .map(|it| serde_json::to_string(it).unwrap_or_default())
        .collect();

    let after = store
        .merge_state(
            "s",
            iteration_patch("people", Some(2), "/name", &[("field", json!("x"))]),
        )
        .await
        .map_err(|e| format!("merge: {e}"))?;
    let after_json: Vec<String> = after
        .iterations("people")
        .iter()
        .map(|it| serde_json::to_string(it).unwrap_or_default())
        .collect();

    if after_json.len() != 3 {
        return Err(format!("expected 3 iterations, got {}", after_json.len()));
    }
    if after_json[0] != before_json[0] || after_json[1] != before_json[1] {
        return Err("iterations 0 and 1 changed".to_string());
    }
    let slot = after.iterations("people")[2]
        .page("/name")
        .cloned()
        .unwrap_or_default();
    if slot.get("name") != Some(&json!("Edsger")) || slot.get("field") != Some(&json!("x")) {
        return Err(format!("iteration 2 not deep-merged: {slot:?}"));
    }
    Ok(())
}

async fn shape_conflict_leaves_state_unchanged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .merge_state(
            "s",
            StatePatch::Section {
                section: "people".to_string(),
                fields: fields(&[("count", json!(2))]),
            },
        )
        .await
        .map_err(|e| format!("seed: {e}"))?;
    let before = store
        .get_state("s")
        .await
        .map_err(|e| format!("get: {e}"))?;

    match store
        .merge_state(
            "s",
            iteration_patch("people", None, "/name", &[("name", json!("Ada"))]),
        )
        .await
    {
        Err(StorageError::ShapeConflict { .. }) => {}
        Err(e) => return Err(format!("expected ShapeConflict, got {e}")),
        Ok(_) => return Err("expected ShapeConflict, merge succeeded".to_string()),
    }

    let after = store
        .get_state("s")
        .await
        .map_err(|e| format!("get after: {e}"))?;
    if after != before {
        return Err("rejected patch modified stored state".to_string());
    }
    Ok(())
}
