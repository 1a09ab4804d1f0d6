//! Page models and the two request algorithms.
//!
//! [`PageModel::get`] projects the answer state onto a page and builds
//! its view; [`PageModel::post`] validates a submission through the form
//! schema, coercion and the state schema, and produces the state patches
//! to persist. Neither touches the store: the orchestrator reads state
//! before calling them and writes whatever they return.

use std::collections::BTreeMap;

use formflow_definition::PageDefinition;
use formflow_storage::{AnswerState, Fields, OriginalFilename, SectionState, StatePatch};
use serde_json::Value;

use crate::component::ComponentCollection;
use crate::error::ConditionError;
use crate::feedback::FeedbackContext;
use crate::form::FormModel;
use crate::progress::NavigationProgress;
use crate::schema::{FieldError, FormSubmissionErrors, Schema, ValidationContext};
use crate::view::{collapse_heading, filter_conditional_content, ViewModel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextLink {
    /// Target path with a leading `/`.
    pub path: String,
    pub condition: Option<String>,
}

/// What the caller knows about the current request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// 1-based iteration from the `num` query parameter.
    pub num: Option<usize>,
    /// Current URL including its query string; recorded in progress.
    pub url: String,
    /// Return context decoded from the query string of a feedback form.
    pub feedback_return: Option<FeedbackContext>,
}

/// A file-related error reported by the upload handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadError {
    /// Name of the file field.
    pub name: String,
    /// Message text; `%s` is replaced with the field's title.
    pub text: String,
}

/// What the upload handler did with a multipart submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub errors: Vec<UploadError>,
    /// New storage locations mapped to user-facing names, by field.
    pub original_filenames: BTreeMap<String, OriginalFilename>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GetOutcome {
    Redirect(String),
    Render {
        view: Box<ViewModel>,
        progress: NavigationProgress,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// Re-render the page with errors.
    Invalid(Box<ViewModel>),
    /// Patches to persist, answers first.
    Valid(Vec<StatePatch>),
}

#[derive(Debug)]
pub struct PageModel {
    path: String,
    title: String,
    section: Option<Section>,
    condition: Option<String>,
    repeat_field: Option<String>,
    controller: Option<String>,
    components: ComponentCollection,
    next: Vec<NextLink>,
    form_schema: Schema,
    state_schema: Schema,
}

impl PageModel {
    pub(crate) fn new(
        definition: &PageDefinition,
        section: Option<Section>,
        condition: Option<String>,
        repeat_field: Option<String>,
        components: ComponentCollection,
        next: Vec<NextLink>,
    ) -> Self {
        let form_schema = components.form_schema();
        let state_schema = components.state_schema();
        Self {
            path: format!("/{}", formflow_definition::normalise_path(&definition.path)),
            title: definition
                .title
                .as_ref()
                .map(|t| t.text().to_string())
                .unwrap_or_default(),
            section,
            condition,
            repeat_field,
            controller: definition.controller.clone(),
            components,
            next,
            form_schema,
            state_schema,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn section(&self) -> Option<&Section> {
        self.section.as_ref()
    }

    pub fn repeat_field(&self) -> Option<&str> {
        self.repeat_field.as_deref()
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat_field.is_some()
    }

    pub fn controller(&self) -> Option<&str> {
        self.controller.as_deref()
    }

    pub fn components(&self) -> &ComponentCollection {
        &self.components
    }

    pub fn next(&self) -> &[NextLink] {
        &self.next
    }

    pub fn form_schema(&self) -> &Schema {
        &self.form_schema
    }

    pub fn state_schema(&self) -> &Schema {
        &self.state_schema
    }

    /// Whether the page's own condition (if any) holds.
    pub fn is_visible(&self, form: &FormModel, state: &AnswerState) -> Result<bool, ConditionError> {
        match &self.condition {
            Some(name) => form.evaluate(name, state),
            None => Ok(true),
        }
    }

    /// The answers this page displays. Repeated pages read one iteration
    /// (default: the latest) with every page of that iteration merged.
    pub fn form_data(&self, state: &AnswerState, num: Option<usize>) -> Fields {
        let empty = Fields::new();
        let merged;
        let source: &Fields = match (&self.section, self.is_repeat()) {
            (Some(section), true) => {
                let iterations = state.iterations(&section.name);
                let index = num
                    .and_then(|n| n.checked_sub(1))
                    .unwrap_or_else(|| iterations.len().saturating_sub(1));
                merged = iterations.get(index).map(|i| i.merged()).unwrap_or_default();
                &merged
            }
            (Some(section), false) => match state.section(&section.name) {
                Some(SectionState::Flat(fields)) => fields,
                _ => &empty,
            },
            (None, _) => &state.fields,
        };
        self.components.form_values(source)
    }

    /// Build the view for a set of form values. Runs the content filter,
    /// then heading collapse.
    pub fn view_model(
        &self,
        form: &FormModel,
        state: &AnswerState,
        values: &Fields,
        errors: Option<FormSubmissionErrors>,
        request: &RequestContext,
    ) -> Result<ViewModel, ConditionError> {
        let section_title = self.section.as_ref().map(|s| match request.num {
            Some(n) => format!("{} {}", s.title, n),
            None => s.title.clone(),
        });

        let components = self.components.views(values, errors.as_ref());
        let components =
            filter_conditional_content(components, &|name: &str| form.evaluate(name, state))?;

        let name = match (&request.feedback_return, form.is_feedback_form()) {
            (Some(context), true) => Some(context.form_title.clone()),
            _ => form.name().map(str::to_string),
        };

        let view = ViewModel {
            name,
            page_title: self.title.clone(),
            section_title,
            show_title: true,
            components,
            errors,
            back_link: None,
            feedback_link: form.feedback_link(&self.title, &request.url),
            phase_tag: form
                .definition()
                .phase_banner
                .as_ref()
                .and_then(|b| b.phase.clone()),
            start_page: form.start_page_target(),
        };
        Ok(collapse_heading(view))
    }

    /// GET: guard, project, render, record progress.
    pub fn get(
        &self,
        form: &FormModel,
        state: &AnswerState,
        request: &RequestContext,
    ) -> Result<GetOutcome, ConditionError> {
        let mut progress = NavigationProgress::new(state.progress.clone());
        if !form.options().preview_mode && progress.is_empty() && !form.is_start_page(&self.path) {
            return Ok(GetOutcome::Redirect(form.start_page_target()));
        }

        let mut values = self.form_data(state, request.num);
        substitute_filenames(&mut values, &state.original_filenames);
        let mut view = self.view_model(form, state, &values, None, request)?;

        progress.visit(&request.url);
        view.back_link = progress.back_link().map(str::to_string);
        Ok(GetOutcome::Render {
            view: Box::new(view),
            progress,
        })
    }

    /// POST: validate through both layers and build the patches.
    ///
    /// `payload` is `None` when the body was rejected upstream (too large).
    pub fn post(
        &self,
        form: &FormModel,
        state: &AnswerState,
        payload: Option<&Fields>,
        upload: &UploadOutcome,
        request: &RequestContext,
    ) -> Result<PostOutcome, ConditionError> {
        let options = form.options();
        let ctx = ValidationContext {
            today: form.today(),
            error_title: &options.error_summary_title,
        };
        let empty = Fields::new();
        let raw = payload.unwrap_or(&empty);

        let mut filenames = state.original_filenames.clone();
        filenames.extend(upload.original_filenames.clone());
        let mut display = raw.clone();
        substitute_filenames(&mut display, &filenames);

        let form_result = self.form_schema.validate(raw, &ctx);
        let mut errors = form_result.errors.clone();
        if payload.is_none() {
            errors = Some(FormSubmissionErrors {
                title_text: options.error_summary_title.clone(),
                error_list: self
                    .components
                    .file_fields()
                    .map(|field| {
                        FieldError::new(&[field.name.clone()], options.file_too_large_message.clone())
                    })
                    .collect(),
            });
        }
        if !upload.errors.is_empty() {
            errors = Some(self.merge_upload_errors(errors, &upload.errors, ctx.error_title));
        }
        if errors.is_some() {
            return self.invalid(form, state, &display, errors, request);
        }

        let coerced = self.components.state_from_form(&form_result.value);
        let state_result = self.state_schema.validate(&coerced, &ctx);
        if state_result.errors.is_some() {
            return self.invalid(form, state, &display, state_result.errors, request);
        }

        let mut patches = vec![self.patch(state_result.value, request.num)];
        patches.extend(upload.original_filenames.iter().map(|(field, filename)| {
            StatePatch::OriginalFilename {
                field: field.clone(),
                filename: filename.clone(),
            }
        }));
        Ok(PostOutcome::Valid(patches))
    }

    fn invalid(
        &self,
        form: &FormModel,
        state: &AnswerState,
        display: &Fields,
        errors: Option<FormSubmissionErrors>,
        request: &RequestContext,
    ) -> Result<PostOutcome, ConditionError> {
        let mut view = self.view_model(form, state, display, errors, request)?;
        let progress = NavigationProgress::new(state.progress.clone());
        view.back_link = progress.back_link().map(str::to_string);
        Ok(PostOutcome::Invalid(Box::new(view)))
    }

    /// Upload errors join the page's errors; they replace any schema error
    /// for the same field.
    fn merge_upload_errors(
        &self,
        errors: Option<FormSubmissionErrors>,
        upload_errors: &[UploadError],
        title: &str,
    ) -> FormSubmissionErrors {
        let mut merged = errors.unwrap_or_else(|| FormSubmissionErrors {
            title_text: title.to_string(),
            error_list: Vec::new(),
        });
        merged
            .error_list
            .retain(|e| !upload_errors.iter().any(|u| u.name == e.name));
        for error in upload_errors {
            let label = self
                .components
                .file_fields()
                .find(|f| f.name == error.name)
                .map(|f| f.title.trim().to_string())
                .unwrap_or_else(|| "the file".to_string());
            merged.error_list.push(FieldError::new(
                &[error.name.clone()],
                error.text.replacen("%s", &label, 1),
            ));
        }
        merged
    }

    /// Address validated values: top level, a flat section, or one
    /// iteration of a repeated section (`num - 1`; absent appends).
    fn patch(&self, fields: Fields, num: Option<usize>) -> StatePatch {
        match (&self.section, self.is_repeat()) {
            (Some(section), true) => StatePatch::Iteration {
                section: section.name.clone(),
                iteration: num.and_then(|n| n.checked_sub(1)),
                page: self.path.clone(),
                fields,
            },
            (Some(section), false) => StatePatch::Section {
                section: section.name.clone(),
                fields,
            },
            (None, _) => StatePatch::Fields(fields),
        }
    }
}

/// Show the uploaded name of a file wherever the value is its stored
/// location.
pub fn substitute_filenames(values: &mut Fields, filenames: &BTreeMap<String, OriginalFilename>) {
    for (field, value) in values.iter_mut() {
        let Some(original) = filenames.get(field) else {
            continue;
        };
        if value.as_str() == Some(original.location.as_str()) {
            *value = Value::String(original.original_filename.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        serde_json::from_value(v).unwrap()
    }

    fn form(options: EngineOptions) -> FormModel {
        FormModel::from_json(
            &json!({
                "name": "Pets",
                "startPage": "/start",
                "sections": [{ "name": "pets", "title": "Pets" }],
                "conditions": [{ "name": "hasDog", "value": "dog == true" }],
                "pages": [
                    {
                        "path": "/start",
                        "title": "Start",
                        "components": [
                            { "type": "YesNoField", "name": "dog", "title": "Do you have a dog?" }
                        ],
                        "next": [{ "path": "/pet" }]
                    },
                    {
                        "path": "/pet",
                        "title": "Pet name",
                        "section": "pets",
                        "repeatField": "count",
                        "components": [
                            { "type": "Para", "content": "Dogs only", "options": { "condition": "hasDog" } },
                            { "type": "TextField", "name": "petName", "title": "Name" }
                        ]
                    },
                    {
                        "path": "/upload",
                        "title": "Upload",
                        "components": [
                            { "type": "FileUploadField", "name": "photo", "title": " Photo " },
                            { "type": "TextField", "name": "caption", "title": "Caption" }
                        ]
                    }
                ]
            }),
            options,
        )
        .unwrap()
    }

    fn request(url: &str, num: Option<usize>) -> RequestContext {
        RequestContext {
            num,
            url: url.to_string(),
            feedback_return: None,
        }
    }

    #[test]
    fn deep_links_redirect_to_the_start_page() {
        let form = form(EngineOptions::default());
        let page = form.page("/pet").unwrap();
        let outcome = page
            .get(&form, &AnswerState::default(), &request("/pet", None))
            .unwrap();
        assert_eq!(outcome, GetOutcome::Redirect("/start".to_string()));
    }

    #[test]
    fn preview_mode_allows_deep_links() {
        let form = form(EngineOptions {
            preview_mode: true,
            ..EngineOptions::default()
        });
        let page = form.page("/pet").unwrap();
        let outcome = page
            .get(&form, &AnswerState::default(), &request("/pet", None))
            .unwrap();
        assert!(matches!(outcome, GetOutcome::Render { .. }));
    }

    #[test]
    fn repeat_page_reads_the_requested_iteration() {
        let form = form(EngineOptions::default());
        let page = form.page("/pet").unwrap();
        let mut state = AnswerState::default();
        for name in ["Rex", "Tom"] {
            state
                .apply(&StatePatch::Iteration {
                    section: "pets".into(),
                    iteration: None,
                    page: "/pet".into(),
                    fields: fields(json!({ "petName": name })),
                })
                .unwrap();
        }
        assert_eq!(page.form_data(&state, Some(1)), fields(json!({ "petName": "Rex" })));
        assert_eq!(page.form_data(&state, None), fields(json!({ "petName": "Tom" })));
        assert_eq!(page.form_data(&state, Some(9)), Fields::new());
    }

    #[test]
    fn view_annotates_iteration_and_filters_content() {
        let form = form(EngineOptions::default());
        let page = form.page("/pet").unwrap();
        let mut state = AnswerState::default();
        state.progress = vec!["/start".into()];

        let GetOutcome::Render { view, progress } =
            page.get(&form, &state, &request("/pet?num=2", Some(2))).unwrap()
        else {
            panic!("expected a render");
        };
        assert_eq!(view.section_title.as_deref(), Some("Pets 2"));
        assert_eq!(view.components.len(), 1);
        assert_eq!(view.back_link.as_deref(), Some("/start"));
        assert_eq!(progress.entries().len(), 2);
        // The single field is first once the Para is filtered out.
        assert!(!view.show_title);

        state.fields.insert("dog".into(), json!(true));
        let GetOutcome::Render { view, .. } =
            page.get(&form, &state, &request("/pet?num=2", Some(2))).unwrap()
        else {
            panic!("expected a render");
        };
        assert_eq!(view.components[0].component_type, "Para");
        assert!(view.show_title);
    }

    #[test]
    fn valid_repeat_submission_addresses_one_iteration() {
        let form = form(EngineOptions::default());
        let page = form.page("/pet").unwrap();
        let outcome = page
            .post(
                &form,
                &AnswerState::default(),
                Some(&fields(json!({ "petName": " Rex ", "crumb": "x" }))),
                &UploadOutcome::default(),
                &request("/pet?num=2", Some(2)),
            )
            .unwrap();
        assert_eq!(
            outcome,
            PostOutcome::Valid(vec![StatePatch::Iteration {
                section: "pets".into(),
                iteration: Some(1),
                page: "/pet".into(),
                fields: fields(json!({ "petName": "Rex" })),
            }])
        );
    }

    #[test]
    fn invalid_submission_re_renders_with_errors() {
        let form = form(EngineOptions::default());
        let page = form.page("/start").unwrap();
        let outcome = page
            .post(
                &form,
                &AnswerState::default(),
                Some(&fields(json!({ "dog": "maybe" }))),
                &UploadOutcome::default(),
                &request("/start", None),
            )
            .unwrap();
        let PostOutcome::Invalid(view) = outcome else {
            panic!("expected errors");
        };
        let errors = view.errors.unwrap();
        assert_eq!(errors.title_text, "Fix the following errors");
        assert_eq!(errors.error_list[0].display_ref, "#dog");
        assert_eq!(view.components[0].value, Some(json!("maybe")));
    }

    #[test]
    fn missing_payload_reports_file_too_large() {
        let form = form(EngineOptions::default());
        let page = form.page("/upload").unwrap();
        let PostOutcome::Invalid(view) = page
            .post(
                &form,
                &AnswerState::default(),
                None,
                &UploadOutcome::default(),
                &request("/upload", None),
            )
            .unwrap()
        else {
            panic!("expected errors");
        };
        let errors = view.errors.unwrap().error_list;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "photo");
        assert_eq!(errors[0].message, "The file you uploaded was too big");
    }

    #[test]
    fn upload_errors_merge_with_page_errors() {
        let form = form(EngineOptions::default());
        let page = form.page("/upload").unwrap();
        let upload = UploadOutcome {
            errors: vec![UploadError {
                name: "photo".into(),
                text: "%s must be a jpg".into(),
            }],
            original_filenames: BTreeMap::new(),
        };
        let PostOutcome::Invalid(view) = page
            .post(
                &form,
                &AnswerState::default(),
                Some(&Fields::new()),
                &upload,
                &request("/upload", None),
            )
            .unwrap()
        else {
            panic!("expected errors");
        };
        let messages: Vec<(String, String)> = view
            .errors
            .unwrap()
            .error_list
            .into_iter()
            .map(|e| (e.name, e.message))
            .collect();
        assert_eq!(
            messages,
            vec![
                ("caption".to_string(), "\"Caption\" is required".to_string()),
                ("photo".to_string(), "Photo must be a jpg".to_string()),
            ]
        );
    }

    #[test]
    fn stored_locations_display_as_original_filenames() {
        let form = form(EngineOptions {
            preview_mode: true,
            ..EngineOptions::default()
        });
        let page = form.page("/upload").unwrap();
        let mut state = AnswerState::default();
        state.fields.insert("photo".into(), json!("s3://bucket/abc"));
        state.original_filenames.insert(
            "photo".into(),
            OriginalFilename {
                location: "s3://bucket/abc".into(),
                original_filename: "dog.jpg".into(),
            },
        );
        let GetOutcome::Render { view, .. } = page.get(&form, &state, &request("/upload", None)).unwrap()
        else {
            panic!("expected a render");
        };
        assert_eq!(view.components[0].value, Some(json!("dog.jpg")));
    }
}
