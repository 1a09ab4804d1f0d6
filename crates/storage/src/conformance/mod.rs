//! Conformance test suite for `StateStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `StateStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Sessions**: empty default state, isolation between sessions, clearing
//! - **Merge**: top-level, flat-section and per-iteration patches, with
//!   iteration isolation and shape-conflict rejection
//! - **Concurrency**: racing merges for one session are all applied
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use formflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn redis_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_redis_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod merge;
mod session;

use std::fmt;
use std::future::Future;

use crate::state::{Fields, StatePatch};
use crate::StateStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "session", "merge").
    pub category: String,
    /// Test name (e.g. "iteration_patch_leaves_other_iterations").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(session::run_session_tests(&factory).await);
    results.extend(merge::run_merge_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: patch constructors ─────────────────────────────────────────────

fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn iteration_patch(
    section: &str,
    iteration: Option<usize>,
    page: &str,
    pairs: &[(&str, serde_json::Value)],
) -> StatePatch {
    StatePatch::Iteration {
        section: section.to_string(),
        iteration,
        page: page.to_string(),
        fields: fields(pairs),
    }
}
