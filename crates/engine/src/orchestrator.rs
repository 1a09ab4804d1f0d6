//! Request orchestration: one registry of form models and a state store,
//! driving page GETs and POSTs and returning instructions for the HTTP
//! layer to carry out.

use std::collections::BTreeMap;
use std::sync::Arc;

use formflow_definition::{normalise_path, FormDefinition};
use formflow_storage::{Fields, StateStore, StatePatch};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, ModelError, ModelWarning};
use crate::feedback::{FeedbackContext, FEEDBACK_PARAMETER};
use crate::form::FormModel;
use crate::navigation::next_target;
use crate::options::EngineOptions;
use crate::page::{GetOutcome, PostOutcome, RequestContext, UploadOutcome};
use crate::view::ViewModel;

/// What the boundary should do with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Render(Box<ViewModel>),
    Redirect {
        target: String,
        query: BTreeMap<String, String>,
    },
    /// Re-render the submitted page with its errors.
    ValidationFailure(Box<ViewModel>),
}

impl Instruction {
    fn redirect(target: String) -> Self {
        Instruction::Redirect {
            target,
            query: BTreeMap::new(),
        }
    }

    /// Redirect target with its query string, e.g. `/form/name?num=2`.
    pub fn location(&self) -> Option<String> {
        match self {
            Instruction::Redirect { target, query } if query.is_empty() => Some(target.clone()),
            Instruction::Redirect { target, query } => {
                Some(format!("{}?{}", target, encode_query(query)))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub session: String,
    pub form_id: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostRequest {
    pub session: String,
    pub form_id: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// `None` when the body was rejected before parsing (too large).
    pub payload: Option<Fields>,
    pub upload: UploadOutcome,
}

/// Entry in the published forms listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedForm {
    pub id: String,
    pub title: Option<String>,
    pub feedback_form: bool,
}

pub struct FlowOrchestrator<S: StateStore> {
    store: Arc<S>,
    forms: RwLock<BTreeMap<String, Arc<FormModel>>>,
    options: EngineOptions,
    clock: Arc<dyn Clock>,
}

impl<S: StateStore> FlowOrchestrator<S> {
    pub fn new(store: Arc<S>, options: EngineOptions) -> Self {
        Self::with_clock(store, options, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, options: EngineOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            forms: RwLock::new(BTreeMap::new()),
            options,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Build a form model under `id` (its URL prefix) and register it,
    /// replacing any previous form with that id.
    pub async fn register(
        &self,
        id: &str,
        definition: FormDefinition,
    ) -> Result<Vec<ModelWarning>, ModelError> {
        let options = EngineOptions {
            base_path: id.to_string(),
            ..self.options.clone()
        };
        let model = FormModel::with_clock(definition, options, self.clock.clone())?;
        let warnings = model.warnings().to_vec();
        self.forms
            .write()
            .await
            .insert(id.to_string(), Arc::new(model));
        debug!(form_id = %id, warnings = warnings.len(), "form registered");
        Ok(warnings)
    }

    /// Replace a form definition at runtime. Preview mode only.
    pub async fn publish(
        &self,
        id: &str,
        definition: FormDefinition,
    ) -> Result<Vec<ModelWarning>, EngineError> {
        if !self.options.preview_mode {
            return Err(EngineError::PreviewOnly);
        }
        let warnings = self.register(id, definition).await?;
        info!(form_id = %id, "form definition published");
        Ok(warnings)
    }

    pub async fn published(&self) -> Vec<PublishedForm> {
        self.forms
            .read()
            .await
            .iter()
            .map(|(id, form)| PublishedForm {
                id: id.clone(),
                title: form.name().map(str::to_string),
                feedback_form: form.is_feedback_form(),
            })
            .collect()
    }

    /// The definition registered under `id`.
    pub async fn definition(&self, id: &str) -> Option<FormDefinition> {
        self.form(id).await.map(|form| form.definition().clone())
    }

    pub async fn form(&self, id: &str) -> Option<Arc<FormModel>> {
        self.forms.read().await.get(id).cloned()
    }

    /// Redirect to a form's start page. Without an id, the only
    /// registered form is the default.
    pub async fn start(&self, form_id: Option<&str>) -> Result<Instruction, EngineError> {
        let form = match form_id {
            Some(id) => self.require_form(id, "").await?,
            None => {
                let forms = self.forms.read().await;
                if forms.len() != 1 {
                    return Err(EngineError::NoDefaultForm {
                        registered: forms.len(),
                    });
                }
                forms
                    .values()
                    .next()
                    .cloned()
                    .ok_or(EngineError::NoDefaultForm { registered: 0 })?
            }
        };
        Ok(Instruction::redirect(form.start_page_target()))
    }

    pub async fn get(&self, request: &GetRequest) -> Result<Instruction, EngineError> {
        let form = self.require_form(&request.form_id, &request.path).await?;
        let Some(page) = form.page(&request.path) else {
            if normalise_path(&request.path).is_empty() {
                return Ok(Instruction::redirect(form.start_page_target()));
            }
            return Err(not_found(&request.form_id, &request.path));
        };

        let state = self.store.get_state(&request.session).await?;
        let context = request_context(&form, page.path(), &request.query);
        match page.get(&form, &state, &context)? {
            GetOutcome::Redirect(target) => {
                debug!(form_id = %request.form_id, path = %page.path(), %target, "redirecting to start page");
                Ok(Instruction::redirect(target))
            }
            GetOutcome::Render { view, progress } => {
                self.store
                    .merge_state(&request.session, StatePatch::Progress(progress.into_entries()))
                    .await?;
                Ok(Instruction::Render(view))
            }
        }
    }

    pub async fn post(&self, request: PostRequest) -> Result<Instruction, EngineError> {
        let form = self.require_form(&request.form_id, &request.path).await?;
        let page = form
            .page(&request.path)
            .ok_or_else(|| not_found(&request.form_id, &request.path))?;

        let state = self.store.get_state(&request.session).await?;
        let context = request_context(&form, page.path(), &request.query);
        let outcome = page.post(
            &form,
            &state,
            request.payload.as_ref(),
            &request.upload,
            &context,
        )?;

        let patches = match outcome {
            PostOutcome::Invalid(view) => {
                debug!(form_id = %request.form_id, path = %page.path(), "submission failed validation");
                return Ok(Instruction::ValidationFailure(view));
            }
            PostOutcome::Valid(patches) => patches,
        };

        let saved = if patches.is_empty() {
            state
        } else {
            self.store
                .merge_state(&request.session, StatePatch::batch(patches))
                .await?
        };

        let next = next_target(&form, page, &saved)?;
        debug!(form_id = %request.form_id, from = %page.path(), to = %next.url(), "submission accepted");
        let mut query = BTreeMap::new();
        if let Some(num) = next.num {
            query.insert("num".to_string(), num.to_string());
        }
        Ok(Instruction::Redirect {
            target: next.path,
            query,
        })
    }

    async fn require_form(&self, id: &str, path: &str) -> Result<Arc<FormModel>, EngineError> {
        self.form(id).await.ok_or_else(|| not_found(id, path))
    }
}

fn not_found(form_id: &str, path: &str) -> EngineError {
    EngineError::NotFound {
        form_id: form_id.to_string(),
        path: path.to_string(),
    }
}

fn request_context(
    form: &FormModel,
    page_path: &str,
    query: &BTreeMap<String, String>,
) -> RequestContext {
    let mut url = form.options().url_for(page_path);
    if !query.is_empty() {
        url = format!("{}?{}", url, encode_query(query));
    }
    RequestContext {
        num: query.get("num").and_then(|n| n.trim().parse().ok()),
        url,
        feedback_return: query
            .get(FEEDBACK_PARAMETER)
            .filter(|_| form.is_feedback_form())
            .and_then(|encoded| FeedbackContext::decode(encoded)),
    }
}

fn encode_query(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
