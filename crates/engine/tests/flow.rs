//! End-to-end flow tests: a registered form driven through the
//! orchestrator against the in-memory state store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use formflow_definition::FormDefinition;
use formflow_engine::{
    EngineError, EngineOptions, FixedClock, FlowOrchestrator, GetRequest, Instruction,
    ModelError, PostRequest, UploadOutcome,
};
use formflow_storage::{
    AnswerState, Fields, InMemoryStateStore, OriginalFilename, StatePatch, StateStore,
    StorageError,
};
use serde_json::{json, Value};
use time::macros::datetime;

const FORM_ID: &str = "household";
const SESSION: &str = "session-1";

fn definition() -> FormDefinition {
    serde_json::from_value(json!({
        "name": "Register your household",
        "startPage": "/start",
        "sections": [{ "name": "people", "title": "People" }],
        "feedback": { "url": "/feedback" },
        "conditions": [
            { "name": "hasPets", "value": "pets == true" },
            {
                "name": "manyPeople",
                "displayName": "More than one person",
                "value": {
                    "name": "manyPeople",
                    "conditions": [{
                        "field": { "name": "count", "type": "NumberField", "display": "count" },
                        "operator": "is more than",
                        "value": { "type": "Value", "value": "1", "display": "1" }
                    }]
                }
            }
        ],
        "lists": [{
            "name": "roles",
            "type": "string",
            "items": [
                { "text": "Adult", "value": "adult" },
                { "text": "Child", "value": "child", "condition": "manyPeople" }
            ]
        }],
        "pages": [
            {
                "path": "/start",
                "title": "How many people live here?",
                "components": [
                    { "type": "Para", "content": "Tell us about your pets too", "options": { "condition": "hasPets" } },
                    { "type": "NumberField", "name": "count", "title": "Number of people" },
                    { "type": "YesNoField", "name": "pets", "title": "Any pets?" }
                ],
                "next": [{ "path": "/name" }]
            },
            {
                "path": "/name",
                "title": "Name",
                "section": "people",
                "repeatField": "count",
                "components": [{ "type": "TextField", "name": "fullName", "title": "Full name" }],
                "next": [{ "path": "/role" }]
            },
            {
                "path": "/role",
                "title": "Role",
                "section": "people",
                "repeatField": "count",
                "components": [
                    { "type": "RadiosField", "name": "role", "title": "Role", "list": "roles" },
                    { "type": "DatePartsField", "name": "dob", "title": "Date of birth" }
                ],
                "next": [{ "path": "/summary-check" }]
            },
            {
                "path": "/summary-check",
                "title": "Check",
                "components": [{ "type": "Para", "content": "Nearly done" }]
            }
        ]
    }))
    .unwrap()
}

async fn orchestrator(options: EngineOptions) -> FlowOrchestrator<InMemoryStateStore> {
    let clock = Arc::new(FixedClock(datetime!(2021-06-15 12:00 UTC)));
    let orchestrator =
        FlowOrchestrator::with_clock(Arc::new(InMemoryStateStore::new()), options, clock);
    orchestrator.register(FORM_ID, definition()).await.unwrap();
    orchestrator
}

fn query(num: Option<usize>) -> BTreeMap<String, String> {
    num.map(|n| [("num".to_string(), n.to_string())].into_iter().collect())
        .unwrap_or_default()
}

fn get(path: &str, num: Option<usize>) -> GetRequest {
    GetRequest {
        session: SESSION.to_string(),
        form_id: FORM_ID.to_string(),
        path: path.to_string(),
        query: query(num),
    }
}

fn post(path: &str, num: Option<usize>, payload: Value) -> PostRequest {
    PostRequest {
        session: SESSION.to_string(),
        form_id: FORM_ID.to_string(),
        path: path.to_string(),
        query: query(num),
        payload: Some(serde_json::from_value::<Fields>(payload).unwrap()),
        upload: UploadOutcome::default(),
    }
}

async fn submit(
    orchestrator: &FlowOrchestrator<InMemoryStateStore>,
    path: &str,
    num: Option<usize>,
    payload: Value,
) -> String {
    match orchestrator.post(post(path, num, payload)).await.unwrap() {
        redirect @ Instruction::Redirect { .. } => redirect.location().unwrap(),
        other => panic!("expected a redirect from {}, got {:?}", path, other),
    }
}

async fn state(orchestrator: &FlowOrchestrator<InMemoryStateStore>) -> AnswerState {
    orchestrator.store().get_state(SESSION).await.unwrap()
}

fn person(role: &str) -> Value {
    json!({ "role": role, "dob__day": "1", "dob__month": "2", "dob__year": "1990" })
}

// ──────────────────────────────────────────────
// 1. Routing
// ──────────────────────────────────────────────

#[tokio::test]
async fn start_redirects_to_the_form_start_page() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    let start = orchestrator.start(Some(FORM_ID)).await.unwrap();
    assert_eq!(start.location().as_deref(), Some("/household/start"));

    let default = orchestrator.start(None).await.unwrap();
    assert_eq!(default, start);

    let empty_path = orchestrator.get(&get("/", None)).await.unwrap();
    assert_eq!(empty_path, start);
}

#[tokio::test]
async fn no_default_form_when_several_are_registered() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    orchestrator.register("other", definition()).await.unwrap();
    let err = orchestrator.start(None).await.unwrap_err();
    assert!(matches!(err, EngineError::NoDefaultForm { registered: 2 }));
}

#[tokio::test]
async fn unknown_form_or_page_is_not_found() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    let err = orchestrator.get(&get("/nowhere", None)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    let mut request = get("/start", None);
    request.form_id = "missing".into();
    assert!(matches!(
        orchestrator.get(&request).await.unwrap_err(),
        EngineError::NotFound { .. }
    ));
}

#[tokio::test]
async fn deep_link_before_starting_redirects_to_start() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    let instruction = orchestrator.get(&get("/name", None)).await.unwrap();
    assert_eq!(instruction.location().as_deref(), Some("/household/start"));

    let preview = self::orchestrator(EngineOptions {
        preview_mode: true,
        ..EngineOptions::default()
    })
    .await;
    assert!(matches!(
        preview.get(&get("/name", None)).await.unwrap(),
        Instruction::Render(_)
    ));
}

// ──────────────────────────────────────────────
// 2. Repeat sections
// ──────────────────────────────────────────────

#[tokio::test]
async fn repeat_block_loops_until_the_required_count() {
    let orchestrator = orchestrator(EngineOptions::default()).await;

    let next = submit(&orchestrator, "/start", None, json!({ "count": "2", "pets": "false" })).await;
    assert_eq!(next, "/household/name?num=1");
    let next = submit(&orchestrator, "/name", Some(1), json!({ "fullName": "Ada" })).await;
    assert_eq!(next, "/household/role?num=1");
    let next = submit(&orchestrator, "/role", Some(1), person("adult")).await;
    assert_eq!(next, "/household/name?num=2");
    let next = submit(&orchestrator, "/name", Some(2), json!({ "fullName": "Bo" })).await;
    assert_eq!(next, "/household/role?num=2");
    let next = submit(&orchestrator, "/role", Some(2), person("child")).await;
    assert_eq!(next, "/household/summary-check");

    let state = state(&orchestrator).await;
    let iterations = state.iterations("people");
    assert_eq!(iterations.len(), 2);
    assert_eq!(iterations[0].merged()["fullName"], json!("Ada"));
    assert_eq!(iterations[0].merged()["dob"], json!("1990-02-01"));
    assert_eq!(iterations[1].merged()["role"], json!("child"));
    assert_eq!(state.fields["count"], json!(2));
}

#[tokio::test]
async fn editing_one_iteration_leaves_the_others_untouched() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    submit(&orchestrator, "/start", None, json!({ "count": 3, "pets": "no" })).await;
    for (num, name) in [(1, "Ada"), (2, "Bo"), (3, "Cy")] {
        submit(&orchestrator, "/name", Some(num), json!({ "fullName": name })).await;
        submit(&orchestrator, "/role", Some(num), person("adult")).await;
    }
    let before = state(&orchestrator).await.iterations("people").to_vec();

    submit(&orchestrator, "/name", Some(3), json!({ "fullName": "x" })).await;

    let after = state(&orchestrator).await;
    let after_iterations = after.iterations("people");
    assert_eq!(after_iterations[0], before[0]);
    assert_eq!(after_iterations[1], before[1]);
    assert_eq!(after_iterations[2].merged()["fullName"], json!("x"));
}

#[tokio::test]
async fn concurrent_submissions_without_num_each_append_an_iteration() {
    let orchestrator = Arc::new(orchestrator(EngineOptions::default()).await);
    submit(&orchestrator, "/start", None, json!({ "count": 2, "pets": "no" })).await;

    let mut handles = Vec::new();
    for name in ["Ada", "Bo"] {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator
                .post(post("/name", None, json!({ "fullName": name })))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let state = state(&orchestrator).await;
    let mut names: Vec<Value> = state
        .iterations("people")
        .iter()
        .filter_map(|i| i.page("/name").and_then(|p| p.get("fullName")).cloned())
        .collect();
    names.sort_by_key(|v| v.to_string());
    assert_eq!(names, vec![json!("Ada"), json!("Bo")]);
}

// ──────────────────────────────────────────────
// 3. Validation
// ──────────────────────────────────────────────

#[tokio::test]
async fn form_schema_failure_re_renders_without_touching_state() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    let instruction = orchestrator
        .post(post("/start", None, json!({ "count": "lots" })))
        .await
        .unwrap();
    let Instruction::ValidationFailure(view) = instruction else {
        panic!("expected a validation failure");
    };
    let errors = view.errors.unwrap();
    let names: Vec<&str> = errors.error_list.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["count", "pets"]);
    assert_eq!(errors.error_list[0].display_ref, "#count");
    assert_eq!(state(&orchestrator).await, AnswerState::default());
}

#[tokio::test]
async fn state_schema_failure_is_keyed_by_the_state_path() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    submit(&orchestrator, "/start", None, json!({ "count": 1, "pets": "no" })).await;
    submit(&orchestrator, "/name", Some(1), json!({ "fullName": "Ada" })).await;

    let instruction = orchestrator
        .post(post(
            "/role",
            Some(1),
            json!({ "role": "adult", "dob__day": "31", "dob__month": "2", "dob__year": "1990" }),
        ))
        .await
        .unwrap();
    let Instruction::ValidationFailure(view) = instruction else {
        panic!("expected a validation failure");
    };
    let errors = view.errors.unwrap();
    assert_eq!(errors.error_list.len(), 1);
    assert_eq!(errors.error_list[0].path, "dob");
    assert_eq!(errors.error_list[0].message, "\"Date of birth\" must be a valid date");
}

// ──────────────────────────────────────────────
// 4. Rendering
// ──────────────────────────────────────────────

#[tokio::test]
async fn conditional_content_and_items_follow_the_answers() {
    let orchestrator = orchestrator(EngineOptions {
        preview_mode: true,
        ..EngineOptions::default()
    })
    .await;

    let Instruction::Render(view) = orchestrator.get(&get("/start", None)).await.unwrap() else {
        panic!("expected a render");
    };
    let types: Vec<&str> = view.components.iter().map(|c| c.component_type.as_str()).collect();
    assert_eq!(types, vec!["NumberField", "YesNoField"]);

    submit(&orchestrator, "/start", None, json!({ "count": 2, "pets": "yes" })).await;
    let Instruction::Render(view) = orchestrator.get(&get("/start", None)).await.unwrap() else {
        panic!("expected a render");
    };
    let types: Vec<&str> = view.components.iter().map(|c| c.component_type.as_str()).collect();
    assert_eq!(types, vec!["Para", "NumberField", "YesNoField"]);
    assert_eq!(view.components[1].value, Some(json!(2)));

    let Instruction::Render(view) = orchestrator.get(&get("/role", Some(1))).await.unwrap() else {
        panic!("expected a render");
    };
    assert_eq!(view.components[0].items.len(), 2);
    assert_eq!(view.section_title.as_deref(), Some("People 1"));
}

#[tokio::test]
async fn back_and_forward_keeps_progress_short() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    orchestrator.get(&get("/start", None)).await.unwrap();
    submit(&orchestrator, "/start", None, json!({ "count": 1, "pets": "no" })).await;
    orchestrator.get(&get("/name", Some(1))).await.unwrap();
    orchestrator.get(&get("/start", None)).await.unwrap();
    let Instruction::Render(view) = orchestrator.get(&get("/name", Some(1))).await.unwrap() else {
        panic!("expected a render");
    };

    assert_eq!(
        state(&orchestrator).await.progress,
        vec!["/household/start".to_string(), "/household/name?num=1".to_string()]
    );
    assert_eq!(view.back_link.as_deref(), Some("/household/start"));
}

#[tokio::test]
async fn pages_link_to_feedback_with_their_context() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    let Instruction::Render(view) = orchestrator.get(&get("/start", None)).await.unwrap() else {
        panic!("expected a render");
    };
    let link = view.feedback_link.unwrap();
    let encoded = link.strip_prefix("/feedback?f_t=").unwrap();
    let context = formflow_engine::FeedbackContext::decode(encoded).unwrap();
    assert_eq!(context.form_title, "Register your household");
    assert_eq!(context.page_title, "How many people live here?");
    assert_eq!(context.return_url, "/household/start");
}

// ──────────────────────────────────────────────
// 5. Loading and publishing
// ──────────────────────────────────────────────

#[tokio::test]
async fn unknown_condition_fails_registration() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    let mut broken = definition();
    broken.pages[0].next[0].condition = Some("doesNotExist".into());
    let err = orchestrator.register("broken", broken).await.unwrap_err();
    assert!(matches!(err, ModelError::UnknownCondition { ref name, .. } if name == "doesNotExist"));
    assert!(orchestrator.form("broken").await.is_none());
}

#[tokio::test]
async fn publishing_requires_preview_mode() {
    let orchestrator = orchestrator(EngineOptions::default()).await;
    let err = orchestrator.publish("new", definition()).await.unwrap_err();
    assert!(matches!(err, EngineError::PreviewOnly));
}

#[tokio::test]
async fn published_forms_are_listed_and_replaceable() {
    let orchestrator = orchestrator(EngineOptions {
        preview_mode: true,
        ..EngineOptions::default()
    })
    .await;
    let mut renamed = definition();
    renamed.name = Some("Renamed".into());
    orchestrator.publish(FORM_ID, renamed).await.unwrap();

    let listing = orchestrator.published().await;
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id, FORM_ID);
    assert_eq!(listing[0].title.as_deref(), Some("Renamed"));
    assert!(!listing[0].feedback_form);

    let stored = orchestrator.definition(FORM_ID).await.unwrap();
    assert_eq!(stored.name.unwrap().text(), "Renamed");
}

/// Counts `merge_state` calls on top of the in-memory store.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStateStore,
    merges: AtomicUsize,
}

#[async_trait]
impl StateStore for CountingStore {
    async fn get_state(&self, session: &str) -> Result<AnswerState, StorageError> {
        self.inner.get_state(session).await
    }

    async fn merge_state(
        &self,
        session: &str,
        patch: StatePatch,
    ) -> Result<AnswerState, StorageError> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        self.inner.merge_state(session, patch).await
    }

    async fn clear_state(&self, session: &str) -> Result<(), StorageError> {
        self.inner.clear_state(session).await
    }
}

#[tokio::test]
async fn upload_answer_and_filename_are_saved_in_one_write() {
    let store = Arc::new(CountingStore::default());
    let clock = Arc::new(FixedClock(datetime!(2021-06-15 12:00 UTC)));
    let orchestrator = FlowOrchestrator::with_clock(Arc::clone(&store), EngineOptions::default(), clock);
    let definition: FormDefinition = serde_json::from_value(json!({
        "startPage": "/evidence",
        "pages": [{
            "path": "/evidence",
            "title": "Evidence",
            "components": [{ "type": "FileUploadField", "name": "proof", "title": "Proof" }]
        }]
    }))
    .unwrap();
    orchestrator.register("uploads", definition).await.unwrap();

    let mut upload = UploadOutcome::default();
    upload.original_filenames.insert(
        "proof".to_string(),
        OriginalFilename {
            location: "https://files.example/abc123".to_string(),
            original_filename: "passport.pdf".to_string(),
        },
    );
    let instruction = orchestrator
        .post(PostRequest {
            session: SESSION.to_string(),
            form_id: "uploads".to_string(),
            path: "/evidence".to_string(),
            query: BTreeMap::new(),
            payload: Some(
                serde_json::from_value(json!({ "proof": "https://files.example/abc123" })).unwrap(),
            ),
            upload,
        })
        .await
        .unwrap();
    assert!(matches!(instruction, Instruction::Redirect { .. }));

    assert_eq!(store.merges.load(Ordering::SeqCst), 1);
    let saved = store.get_state(SESSION).await.unwrap();
    assert_eq!(saved.fields["proof"], json!("https://files.example/abc123"));
    assert_eq!(saved.original_filenames["proof"].original_filename, "passport.pdf");
}
