use std::collections::BTreeMap;

use formflow_definition::{ComponentDefinition, ListDefinition};
use formflow_storage::Fields;

use super::{Component, ComponentKind, SchemaKeys};
use crate::error::ModelError;
use crate::schema::{FormSubmissionErrors, Schema, SchemaKey};
use crate::view::ComponentView;

/// The ordered components of one page.
#[derive(Debug, Clone, Default)]
pub struct ComponentCollection {
    items: Vec<Component>,
}

impl ComponentCollection {
    pub fn from_definitions(
        definitions: &[ComponentDefinition],
        lists: &BTreeMap<&str, &ListDefinition>,
        page: &str,
    ) -> Result<Self, ModelError> {
        let items = definitions
            .iter()
            .map(|definition| Component::from_definition(definition, lists, page))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { items })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Components that render an input.
    pub fn form_items(&self) -> impl Iterator<Item = &Component> {
        self.items.iter().filter(|c| c.is_form_component())
    }

    pub fn has_form_components(&self) -> bool {
        self.form_items().next().is_some()
    }

    pub fn file_fields(&self) -> impl Iterator<Item = &Component> {
        self.items
            .iter()
            .filter(|c| c.kind == ComponentKind::FileUploadField)
    }

    pub fn form_schema(&self) -> Schema {
        Schema::new(self.form_schema_keys())
    }

    pub fn state_schema(&self) -> Schema {
        Schema::new(self.state_schema_keys())
    }

    pub fn state_from_form(&self, form: &Fields) -> Fields {
        let mut out = Fields::new();
        for component in self.form_items() {
            component.state_from_form(form, &mut out);
        }
        out
    }

    pub fn form_values(&self, state: &Fields) -> Fields {
        let mut out = Fields::new();
        for component in self.form_items() {
            component.form_values(state, &mut out);
        }
        out
    }

    pub fn views(&self, values: &Fields, errors: Option<&FormSubmissionErrors>) -> Vec<ComponentView> {
        self.items.iter().map(|c| c.view(values, errors)).collect()
    }

    pub fn condition_refs(&self) -> Vec<&str> {
        self.items.iter().flat_map(Component::condition_refs).collect()
    }
}

impl SchemaKeys for ComponentCollection {
    fn form_schema_keys(&self) -> Vec<SchemaKey> {
        self.form_items().flat_map(|c| c.form_schema_keys()).collect()
    }

    fn state_schema_keys(&self) -> Vec<SchemaKey> {
        self.form_items().flat_map(|c| c.state_schema_keys()).collect()
    }
}
