use serde_json::Value;

use formflow_storage::Fields;

use super::keys::{part_name, ADDRESS_PARTS};
use super::{Component, ComponentKind};
use crate::condition::compare::loosely_equal;
use crate::schema::FormSubmissionErrors;
use crate::view::{ComponentView, ItemView, Label};

const VISUALLY_HIDDEN: &str = "govuk-visually-hidden";

impl Component {
    /// Render this component against the page's form values.
    pub fn view(&self, values: &Fields, errors: Option<&FormSubmissionErrors>) -> ComponentView {
        let error_message = errors
            .and_then(|e| e.for_field(&self.name))
            .filter(|_| self.is_form_component())
            .map(|e| e.message.clone());

        let mut view = ComponentView {
            component_type: self.kind.as_str().to_string(),
            name: self.name.clone(),
            is_form_component: self.is_form_component(),
            label: self.label(),
            hint: self.hint.clone(),
            value: None,
            items: Vec::new(),
            content: self.content.clone(),
            condition: self.condition.clone(),
            error_message,
            classes: self.classes.clone(),
            parts: Vec::new(),
        };

        match self.kind {
            ComponentKind::DatePartsField => {
                view.parts = ["day", "month", "year"]
                    .iter()
                    .map(|part| self.part_view(part, part, values, errors))
                    .collect();
            }
            ComponentKind::UkAddressField => {
                view.parts = ADDRESS_PARTS
                    .iter()
                    .map(|(part, label, _)| self.part_view(part, label, values, errors))
                    .collect();
            }
            ComponentKind::List => {
                view.items = self.item_views(None, values, errors);
            }
            _ if !self.items.is_empty() => {
                let value = values.get(&self.name);
                view.items = self.item_views(value, values, errors);
                view.value = value.cloned();
            }
            kind if kind.is_form_component() => {
                view.value = values.get(&self.name).cloned();
            }
            _ => {}
        }
        view
    }

    fn label(&self) -> Option<Label> {
        match self.kind {
            ComponentKind::Para | ComponentKind::Html | ComponentKind::InsetText => None,
            _ if self.title.is_empty() => None,
            _ => Some(Label {
                text: self.title.clone(),
                caption: None,
                is_page_heading: false,
                classes: self.hide_title.then(|| VISUALLY_HIDDEN.to_string()),
            }),
        }
    }

    fn part_view(
        &self,
        part: &str,
        label: &str,
        values: &Fields,
        errors: Option<&FormSubmissionErrors>,
    ) -> ComponentView {
        let name = part_name(&self.name, part);
        let error_message = errors
            .and_then(|e| e.error_list.iter().find(|err| err.name == name))
            .map(|e| e.message.clone());
        ComponentView {
            component_type: "TextField".to_string(),
            value: values.get(&name).cloned(),
            name,
            is_form_component: true,
            label: Some(Label {
                text: capitalise(label),
                caption: None,
                is_page_heading: false,
                classes: None,
            }),
            hint: None,
            items: Vec::new(),
            content: None,
            condition: None,
            error_message,
            classes: None,
            parts: Vec::new(),
        }
    }

    fn item_views(
        &self,
        value: Option<&Value>,
        values: &Fields,
        errors: Option<&FormSubmissionErrors>,
    ) -> Vec<ItemView> {
        self.items
            .iter()
            .map(|item| ItemView {
                text: item.text.clone(),
                value: item.value.clone(),
                checked: value.is_some_and(|v| is_selected(v, &item.value)),
                hint: item.hint.clone(),
                condition: item.condition.clone(),
                conditional: item
                    .conditional
                    .iter()
                    .map(|c| c.view(values, errors))
                    .collect(),
            })
            .collect()
    }
}

fn is_selected(value: &Value, item: &Value) -> bool {
    match value {
        Value::Array(selected) => selected.iter().any(|v| loosely_equal(v, item)),
        single => loosely_equal(single, item),
    }
}

fn capitalise(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
