//! Drive a form end to end from an answers file.
//!
//! The answers file maps page paths to payloads:
//!
//! ```yaml
//! /how-many: { count: "2" }
//! /full-name:
//!   - { fullName: Ada }
//!   - { fullName: Bo }
//! ```
//!
//! A page answered with an array takes one element per visit, so repeated
//! pages get one payload per iteration. Pages with no entry are submitted
//! empty, which is all a content-only page needs.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use formflow_definition::normalise_path;
use formflow_engine::{
    EngineOptions, FlowOrchestrator, GetRequest, Instruction, PostRequest, UploadOutcome,
};
use formflow_storage::{Fields, InMemoryStateStore, StateStore};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::load::{form_id, load_definition, read_document};
use crate::OutputFormat;

const SESSION: &str = "cli";

pub(crate) async fn cmd_walk(
    definition_path: &Path,
    answers_path: &Path,
    max_steps: usize,
    options: EngineOptions,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let definition = load_definition(definition_path)?;
    let answers: BTreeMap<String, Value> = read_document(answers_path)?;
    let mut answers = Answers::new(answers);
    let id = form_id(definition_path);

    let store = Arc::new(InMemoryStateStore::new());
    let orchestrator = FlowOrchestrator::new(Arc::clone(&store), options);
    orchestrator
        .register(&id, definition)
        .await
        .map_err(|e| format!("error in '{}': {}", definition_path.display(), e))?;
    let form = orchestrator
        .form(&id)
        .await
        .ok_or_else(|| format!("form '{}' was not registered", id))?;
    let terminal = form.options().url_for(&form.options().default_next_path);
    let prefix = form.options().url_for("");

    let mut location = orchestrator
        .start(Some(&id))
        .await
        .map_err(|e| e.to_string())?
        .location()
        .unwrap_or_default();
    let mut visited = Vec::new();

    for _ in 0..max_steps {
        let (target, query) = split_location(&location);
        if target == terminal {
            info!(form_id = %id, steps = visited.len(), "walk reached the end of the form");
            return report(&visited, &terminal, &store, output, quiet).await;
        }
        let Some(page_path) = target.strip_prefix(&prefix) else {
            return Err(format!("redirected outside the form to '{}'", location));
        };
        let page_path = format!("/{}", normalise_path(page_path));

        let shown = orchestrator
            .get(&GetRequest {
                session: SESSION.to_string(),
                form_id: id.clone(),
                path: page_path.clone(),
                query: query.clone(),
            })
            .await
            .map_err(|e| e.to_string())?;
        if let redirect @ Instruction::Redirect { .. } = shown {
            location = redirect.location().unwrap_or_default();
            continue;
        }

        let payload = answers.next_for(&page_path)?;
        debug!(form_id = %id, page = %page_path, fields = payload.len(), "submitting page");
        let submitted = orchestrator
            .post(PostRequest {
                session: SESSION.to_string(),
                form_id: id.clone(),
                path: page_path.clone(),
                query,
                payload: Some(payload),
                upload: UploadOutcome::default(),
            })
            .await
            .map_err(|e| e.to_string())?;

        let next = submitted.location();
        match submitted {
            Instruction::Redirect { .. } => {
                visited.push(location);
                location = next.unwrap_or_default();
            }
            Instruction::ValidationFailure(view) => {
                let messages: Vec<String> = view
                    .errors
                    .map(|errors| {
                        errors
                            .error_list
                            .into_iter()
                            .map(|e| format!("  - {}", e.message))
                            .collect()
                    })
                    .unwrap_or_default();
                return Err(format!(
                    "page '{}' rejected its answers:\n{}",
                    page_path,
                    messages.join("\n")
                ));
            }
            Instruction::Render(_) => {
                return Err(format!("page '{}' did not redirect after submission", page_path));
            }
        }
    }

    Err(format!(
        "walk did not reach '{}' within {} steps",
        terminal, max_steps
    ))
}

/// Split `/form/page?num=2` into its path and decoded query.
fn split_location(location: &str) -> (String, BTreeMap<String, String>) {
    let (path, query) = location.split_once('?').unwrap_or((location, ""));
    let query = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect();
    (path.to_string(), query)
}

fn decode(part: &str) -> String {
    urlencoding::decode(part)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| part.to_string())
}

/// Payloads per page, consumed in visit order for array entries.
struct Answers {
    pages: HashMap<String, Value>,
    used: HashMap<String, usize>,
}

impl Answers {
    fn new(answers: BTreeMap<String, Value>) -> Self {
        Self {
            pages: answers
                .into_iter()
                .map(|(path, value)| (normalise_path(&path).to_string(), value))
                .collect(),
            used: HashMap::new(),
        }
    }

    fn next_for(&mut self, page_path: &str) -> Result<Fields, String> {
        let key = normalise_path(page_path).to_string();
        let Some(entry) = self.pages.get(&key) else {
            return Ok(Fields::new());
        };
        let used = self.used.entry(key).or_insert(0);
        let value = match entry {
            Value::Array(payloads) => {
                let payload = payloads.get(*used).ok_or_else(|| {
                    format!(
                        "answers for '{}' ran out after {} submissions",
                        page_path,
                        payloads.len()
                    )
                })?;
                *used += 1;
                payload.clone()
            }
            single => single.clone(),
        };
        serde_json::from_value(value)
            .map_err(|e| format!("answers for '{}' must be an object: {}", page_path, e))
    }
}

async fn report(
    visited: &[String],
    terminal: &str,
    store: &InMemoryStateStore,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    if quiet {
        return Ok(());
    }
    match output {
        OutputFormat::Json => {
            let state = store.get_state(SESSION).await.map_err(|e| e.to_string())?;
            let report = json!({
                "visited": visited,
                "terminal": terminal,
                "state": state,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?
            );
        }
        OutputFormat::Text => {
            for location in visited {
                println!("{}", location);
            }
            println!("reached {}", terminal);
        }
    }
    Ok(())
}
