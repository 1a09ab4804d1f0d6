//! The form model: every page of one form definition, its sections and
//! its compiled conditions, with all cross references checked.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use formflow_definition::{check_definition, normalise_path, FormDefinition, ListDefinition};
use formflow_storage::AnswerState;
use time::Date;
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::component::ComponentCollection;
use crate::condition::ConditionSet;
use crate::error::{ConditionError, ModelError, ModelWarning};
use crate::feedback::FeedbackContext;
use crate::options::EngineOptions;
use crate::page::{NextLink, PageModel, Section};

#[derive(Debug)]
pub struct FormModel {
    definition: FormDefinition,
    pages: Vec<PageModel>,
    sections: BTreeMap<String, Section>,
    conditions: ConditionSet,
    warnings: Vec<ModelWarning>,
    options: EngineOptions,
    clock: Arc<dyn Clock>,
}

impl FormModel {
    pub fn new(definition: FormDefinition, options: EngineOptions) -> Result<Self, ModelError> {
        Self::with_clock(definition, options, Arc::new(SystemClock))
    }

    pub fn from_json(
        document: &serde_json::Value,
        options: EngineOptions,
    ) -> Result<Self, ModelError> {
        Self::new(formflow_definition::from_definition(document)?, options)
    }

    /// Build and check the model. Unknown sections, conditions and lists
    /// are fatal; next links to unknown pages are dropped with a warning.
    pub fn with_clock(
        definition: FormDefinition,
        options: EngineOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ModelError> {
        check_definition(&definition)?;
        let conditions = ConditionSet::compile(&definition.conditions, clock.clone())?;

        let sections: BTreeMap<String, Section> = definition
            .sections
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    Section {
                        name: s.name.clone(),
                        title: s.title.text().to_string(),
                    },
                )
            })
            .collect();
        let lists: BTreeMap<&str, &ListDefinition> = definition
            .lists
            .iter()
            .map(|l| (l.name.as_str(), l))
            .collect();
        let known_paths: BTreeSet<&str> = definition
            .pages
            .iter()
            .map(|p| normalise_path(&p.path))
            .collect();

        let require_condition = |name: &str, referenced_by: String| {
            if conditions.contains(name) {
                Ok(())
            } else {
                Err(ModelError::UnknownCondition {
                    name: name.to_string(),
                    referenced_by,
                })
            }
        };

        let mut warnings = Vec::new();
        let mut pages = Vec::with_capacity(definition.pages.len());
        for page in &definition.pages {
            let section = match &page.section {
                Some(name) => Some(sections.get(name).cloned().ok_or_else(|| {
                    ModelError::UnknownSection {
                        name: name.clone(),
                        page: page.path.clone(),
                    }
                })?),
                None => None,
            };

            let condition = page.condition.clone().filter(|c| !c.is_empty());
            if let Some(name) = &condition {
                require_condition(name, format!("page '{}'", page.path))?;
            }

            let mut next = Vec::with_capacity(page.next.len());
            for link in &page.next {
                let link_condition = link.condition.clone().filter(|c| !c.is_empty());
                if let Some(name) = &link_condition {
                    require_condition(
                        name,
                        format!("next link from '{}' to '{}'", page.path, link.path),
                    )?;
                }
                if !known_paths.contains(normalise_path(&link.path)) {
                    warn!(page = %page.path, target = %link.path, "dropping next link to unknown page");
                    warnings.push(ModelWarning::DroppedNextLink {
                        page: page.path.clone(),
                        target: link.path.clone(),
                    });
                    continue;
                }
                next.push(NextLink {
                    path: format!("/{}", normalise_path(&link.path)),
                    condition: link_condition,
                });
            }

            let components =
                ComponentCollection::from_definitions(&page.components, &lists, &page.path)?;
            for name in components.condition_refs() {
                require_condition(name, format!("a component on page '{}'", page.path))?;
            }

            let repeat_field = page.repeat_field.clone().filter(|f| !f.trim().is_empty());
            if repeat_field.is_some() && section.is_none() {
                return Err(ModelError::InvalidRepeatField {
                    page: page.path.clone(),
                    message: "repeated pages must belong to a section".to_string(),
                });
            }

            pages.push(PageModel::new(
                page,
                section,
                condition,
                repeat_field,
                components,
                next,
            ));
        }

        check_repeat_blocks(&pages)?;

        let start = definition.start_page.trim();
        if !start.starts_with("http") && !known_paths.contains(normalise_path(start)) {
            warn!(start_page = %start, "start page is not a page in this form");
            warnings.push(ModelWarning::UnknownStartPage {
                start_page: start.to_string(),
            });
        }

        Ok(Self {
            definition,
            pages,
            sections,
            conditions,
            warnings,
            options,
            clock,
        })
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    pub fn name(&self) -> Option<&str> {
        self.definition.name.as_ref().map(|n| n.text())
    }

    pub fn pages(&self) -> &[PageModel] {
        &self.pages
    }

    /// Find a page; leading and trailing `/` are ignored.
    pub fn page(&self, path: &str) -> Option<&PageModel> {
        let wanted = normalise_path(path);
        self.pages
            .iter()
            .find(|page| normalise_path(page.path()) == wanted)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    pub fn evaluate(&self, name: &str, state: &AnswerState) -> Result<bool, ConditionError> {
        self.conditions.evaluate(name, state)
    }

    pub fn warnings(&self) -> &[ModelWarning] {
        &self.warnings
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn today(&self) -> Date {
        self.clock.now().date()
    }

    /// Pages repeated together: same section and same repeat field.
    pub fn repeat_block<'a, 'b>(
        &'a self,
        section: &'b str,
        repeat_field: &'b str,
    ) -> impl Iterator<Item = &'a PageModel> + 'b
    where
        'a: 'b,
    {
        self.pages.iter().filter(move |page| {
            page.section().is_some_and(|s| s.name == section)
                && page.repeat_field() == Some(repeat_field)
        })
    }

    pub fn is_start_page(&self, path: &str) -> bool {
        normalise_path(path) == normalise_path(&self.definition.start_page)
    }

    /// Where "start" redirects go: an absolute URL as-is, otherwise the
    /// start page under the base path.
    pub fn start_page_target(&self) -> String {
        let start = normalise_path(&self.definition.start_page);
        if start.starts_with("http") {
            start.to_string()
        } else {
            self.options.url_for(start)
        }
    }

    pub fn is_feedback_form(&self) -> bool {
        self.definition
            .feedback
            .as_ref()
            .is_some_and(|f| f.feedback_form)
    }

    /// Link to the configured feedback form for a page, if any.
    pub fn feedback_link(&self, page_title: &str, current_url: &str) -> Option<String> {
        let url = self.definition.feedback.as_ref()?.url.as_deref()?;
        let context = FeedbackContext {
            form_title: self.name().unwrap_or_default().to_string(),
            page_title: page_title.to_string(),
            return_url: current_url.to_string(),
        };
        Some(context.link(url))
    }
}

/// A section is either repeated or flat, never both, and every repeated
/// page in it shares one repeat field.
fn check_repeat_blocks(pages: &[PageModel]) -> Result<(), ModelError> {
    let mut shapes: BTreeMap<&str, (&str, Option<&str>)> = BTreeMap::new();
    for page in pages {
        let Some(section) = page.section() else {
            continue;
        };
        let shape = (page.path(), page.repeat_field());
        match shapes.get(section.name.as_str()) {
            None => {
                shapes.insert(section.name.as_str(), shape);
            }
            Some((first, field)) if *field != shape.1 => {
                return Err(ModelError::InvalidRepeatField {
                    page: page.path().to_string(),
                    message: format!(
                        "section '{}' mixes pages with different repeat fields (see '{}')",
                        section.name, first
                    ),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}
