//! Page components.
//!
//! A [`Component`] is built once from a [`ComponentDefinition`] with its
//! list items resolved. Each kind contributes keys to the page's form and
//! state schemas ([`SchemaKeys`]), a coercion from form values to state
//! values, and a view.

mod collection;
mod keys;
mod render;

use std::collections::BTreeMap;

use formflow_definition::{ComponentDefinition, ListDefinition, LocalisedString};
use serde_json::Value;

use crate::error::ModelError;
use crate::schema::{NumberRule, Pattern, SchemaKey, TextRule};

pub use collection::ComponentCollection;

/// Contribution of a component (or a whole collection) to the two
/// validation layers of a page.
pub trait SchemaKeys {
    /// Keys validating the raw submitted payload.
    fn form_schema_keys(&self) -> Vec<SchemaKey>;
    /// Keys validating the coerced, persisted values.
    fn state_schema_keys(&self) -> Vec<SchemaKey>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    TextField,
    MultilineTextField,
    EmailAddressField,
    TelephoneNumberField,
    NumberField,
    YesNoField,
    DateField,
    DatePartsField,
    TimeField,
    DateTimeField,
    UkAddressField,
    UkPostcodeField,
    NationalInsuranceNumberField,
    RadiosField,
    CheckboxesField,
    SelectField,
    AutocompleteField,
    FileUploadField,
    Para,
    Html,
    InsetText,
    Details,
    List,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 23] = [
        ComponentKind::TextField,
        ComponentKind::MultilineTextField,
        ComponentKind::EmailAddressField,
        ComponentKind::TelephoneNumberField,
        ComponentKind::NumberField,
        ComponentKind::YesNoField,
        ComponentKind::DateField,
        ComponentKind::DatePartsField,
        ComponentKind::TimeField,
        ComponentKind::DateTimeField,
        ComponentKind::UkAddressField,
        ComponentKind::UkPostcodeField,
        ComponentKind::NationalInsuranceNumberField,
        ComponentKind::RadiosField,
        ComponentKind::CheckboxesField,
        ComponentKind::SelectField,
        ComponentKind::AutocompleteField,
        ComponentKind::FileUploadField,
        ComponentKind::Para,
        ComponentKind::Html,
        ComponentKind::InsetText,
        ComponentKind::Details,
        ComponentKind::List,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::TextField => "TextField",
            ComponentKind::MultilineTextField => "MultilineTextField",
            ComponentKind::EmailAddressField => "EmailAddressField",
            ComponentKind::TelephoneNumberField => "TelephoneNumberField",
            ComponentKind::NumberField => "NumberField",
            ComponentKind::YesNoField => "YesNoField",
            ComponentKind::DateField => "DateField",
            ComponentKind::DatePartsField => "DatePartsField",
            ComponentKind::TimeField => "TimeField",
            ComponentKind::DateTimeField => "DateTimeField",
            ComponentKind::UkAddressField => "UkAddressField",
            ComponentKind::UkPostcodeField => "UkPostcodeField",
            ComponentKind::NationalInsuranceNumberField => "NationalInsuranceNumberField",
            ComponentKind::RadiosField => "RadiosField",
            ComponentKind::CheckboxesField => "CheckboxesField",
            ComponentKind::SelectField => "SelectField",
            ComponentKind::AutocompleteField => "AutocompleteField",
            ComponentKind::FileUploadField => "FileUploadField",
            ComponentKind::Para => "Para",
            ComponentKind::Html => "Html",
            ComponentKind::InsetText => "InsetText",
            ComponentKind::Details => "Details",
            ComponentKind::List => "List",
        }
    }

    pub fn parse(name: &str) -> Option<ComponentKind> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Kinds that render an input and contribute schema keys.
    pub fn is_form_component(self) -> bool {
        !self.is_content()
    }

    pub fn is_content(self) -> bool {
        matches!(
            self,
            ComponentKind::Para
                | ComponentKind::Html
                | ComponentKind::InsetText
                | ComponentKind::Details
                | ComponentKind::List
        )
    }

    /// Kinds whose choices come from a named list.
    pub fn uses_list(self) -> bool {
        matches!(
            self,
            ComponentKind::RadiosField
                | ComponentKind::CheckboxesField
                | ComponentKind::SelectField
                | ComponentKind::AutocompleteField
                | ComponentKind::List
        )
    }
}

/// A resolved list item.
#[derive(Debug, Clone)]
pub struct ListItem {
    pub text: String,
    pub value: Value,
    pub hint: Option<String>,
    /// Render-time condition; the item is hidden when it is false.
    pub condition: Option<String>,
    /// Components revealed when the item is selected.
    pub conditional: Vec<Component>,
}

#[derive(Debug, Clone)]
pub struct Component {
    pub kind: ComponentKind,
    /// Empty for content components without a name.
    pub name: String,
    pub title: String,
    pub hint: Option<String>,
    pub content: Option<String>,
    pub required: bool,
    pub classes: Option<String>,
    /// Render-time condition for content components.
    pub condition: Option<String>,
    pub hide_title: bool,
    pub custom_message: Option<String>,
    pub items: Vec<ListItem>,
    text_rule: TextRule,
    number_rule: NumberRule,
    max_days_in_past: Option<u32>,
    max_days_in_future: Option<u32>,
}

const POSTCODE_PATTERN: &str = r"(?i)^[A-Z]{1,2}[0-9][A-Z0-9]?\s*[0-9][A-Z]{2}$";
const NI_NUMBER_PATTERN: &str =
    r"(?i)^[ABCEGHJ-PRSTW-Z]\s*[ABCEGHJ-NPRSTW-Z]\s*\d\s*\d\s*\d\s*\d\s*\d\s*\d\s*[A-D]$";
const NI_FORBIDDEN_PREFIXES: [&str; 7] = ["BG", "GB", "NK", "KN", "TN", "NT", "ZZ"];
const TELEPHONE_PATTERN: &str = r"^[0-9\s+()\-]+$";

fn text(value: &Option<LocalisedString>) -> Option<String> {
    value.as_ref().map(|s| s.text().to_string())
}

impl Component {
    /// Build a component, resolving its list against `lists`.
    pub fn from_definition(
        definition: &ComponentDefinition,
        lists: &BTreeMap<&str, &ListDefinition>,
        page: &str,
    ) -> Result<Self, ModelError> {
        let invalid = |message: String| ModelError::InvalidComponent {
            page: page.to_string(),
            message,
        };

        let kind = ComponentKind::parse(&definition.component_type).ok_or_else(|| {
            invalid(format!(
                "unknown component type '{}'",
                definition.component_type
            ))
        })?;
        let name = definition.name.clone().unwrap_or_default();
        if kind.is_form_component() && name.trim().is_empty() {
            return Err(invalid(format!("{} has no name", kind.as_str())));
        }
        if name.contains('.') || name.contains("__") {
            return Err(invalid(format!(
                "component name '{}' may not contain '.' or '__'",
                name
            )));
        }

        let items = match (&definition.list, kind) {
            (Some(list_name), kind) if kind.uses_list() => {
                let list = lists.get(list_name.as_str()).ok_or_else(|| ModelError::UnknownList {
                    name: list_name.clone(),
                    component: name.clone(),
                })?;
                list.items
                    .iter()
                    .map(|item| {
                        let conditional = item
                            .conditional
                            .as_ref()
                            .map(|c| {
                                c.components
                                    .iter()
                                    .map(|d| Component::from_definition(d, lists, page))
                                    .collect::<Result<Vec<_>, _>>()
                            })
                            .transpose()?
                            .unwrap_or_default();
                        Ok(ListItem {
                            text: item.text.text().to_string(),
                            value: item.value.clone(),
                            hint: text(&item.description),
                            condition: item.condition.clone().filter(|c| !c.is_empty()),
                            conditional,
                        })
                    })
                    .collect::<Result<Vec<_>, ModelError>>()?
            }
            (None, kind) if kind.uses_list() => {
                return Err(invalid(format!("{} '{}' has no list", kind.as_str(), name)));
            }
            (_, ComponentKind::YesNoField) => vec![yes_no_item("Yes", true), yes_no_item("No", false)],
            _ => Vec::new(),
        };

        let options = &definition.options;
        let schema = &definition.schema;
        let decimal = |n: &serde_json::Number| crate::condition::compare::as_decimal(&Value::Number(n.clone()));

        let mut text_rule = TextRule::default();
        let mut number_rule = NumberRule::default();
        match kind {
            ComponentKind::NumberField => {
                number_rule.min = schema.min.as_ref().and_then(decimal);
                number_rule.max = schema.max.as_ref().and_then(decimal);
                number_rule.precision = schema.precision;
                number_rule.integer = schema.precision == Some(0);
            }
            _ => {
                let length = |n: &serde_json::Number| n.as_u64().map(|n| n as usize);
                text_rule.min_length = schema.min.as_ref().and_then(length);
                text_rule.max_length = schema.max.as_ref().and_then(length);
                text_rule.exact_length = schema.length.map(|n| n as usize);
                text_rule.max_words = options.max_words.map(|n| n as usize);
            }
        }

        let pattern_source = match kind {
            ComponentKind::UkPostcodeField => Some(POSTCODE_PATTERN.to_string()),
            ComponentKind::NationalInsuranceNumberField => {
                text_rule.forbidden_prefixes =
                    NI_FORBIDDEN_PREFIXES.iter().map(|p| p.to_string()).collect();
                Some(NI_NUMBER_PATTERN.to_string())
            }
            ComponentKind::TelephoneNumberField => Some(TELEPHONE_PATTERN.to_string()),
            ComponentKind::EmailAddressField => {
                text_rule.email = true;
                None
            }
            _ => schema.regex.clone().filter(|r| !r.is_empty()),
        };
        if let Some(source) = pattern_source {
            text_rule.pattern = Some(
                Pattern::new(&source)
                    .map_err(|e| invalid(format!("invalid regex for '{}': {}", name, e)))?,
            );
        }

        Ok(Self {
            kind,
            title: text(&definition.title).unwrap_or_else(|| name.clone()),
            name,
            hint: text(&definition.hint),
            content: definition.content.clone(),
            required: options.required != Some(false),
            classes: options.classes.clone(),
            condition: options.condition.clone().filter(|c| !c.is_empty()),
            hide_title: options.hide_title.unwrap_or(false),
            custom_message: options.custom_validation_message.clone(),
            items,
            text_rule,
            number_rule,
            max_days_in_past: options.max_days_in_past,
            max_days_in_future: options.max_days_in_future,
        })
    }

    pub fn is_form_component(&self) -> bool {
        self.kind.is_form_component()
    }

    /// Every condition name this component (and anything it reveals) uses.
    pub fn condition_refs(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.condition.iter().map(String::as_str).collect();
        for item in &self.items {
            out.extend(item.condition.as_deref());
            for nested in &item.conditional {
                out.extend(nested.condition_refs());
            }
        }
        out
    }

    /// Components revealed by this component's items.
    pub fn conditional_components(&self) -> impl Iterator<Item = &Component> {
        self.items.iter().flat_map(|item| item.conditional.iter())
    }
}

fn yes_no_item(text: &str, value: bool) -> ListItem {
    ListItem {
        text: text.to_string(),
        value: Value::Bool(value),
        hint: None,
        condition: None,
        conditional: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lists() -> Vec<ListDefinition> {
        serde_json::from_value(json!([{
            "name": "colours",
            "type": "string",
            "items": [
                { "text": "Red", "value": "red" },
                { "text": "Blue", "value": "blue", "condition": "likesBlue" }
            ]
        }]))
        .unwrap()
    }

    fn build(definition: serde_json::Value) -> Result<Component, ModelError> {
        let lists = lists();
        let by_name = lists.iter().map(|l| (l.name.as_str(), l)).collect();
        Component::from_definition(&serde_json::from_value(definition).unwrap(), &by_name, "/p")
    }

    #[test]
    fn kinds_round_trip_by_name() {
        for kind in ComponentKind::ALL {
            assert_eq!(ComponentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ComponentKind::parse("Flux"), None);
    }

    #[test]
    fn list_items_are_resolved_with_conditions() {
        let component = build(json!({
            "type": "RadiosField", "name": "colour", "title": "Colour", "list": "colours"
        }))
        .unwrap();
        assert_eq!(component.items.len(), 2);
        assert_eq!(component.condition_refs(), vec!["likesBlue"]);
    }

    #[test]
    fn unknown_list_is_rejected() {
        let err = build(json!({
            "type": "SelectField", "name": "colour", "title": "Colour", "list": "shades"
        }))
        .unwrap_err();
        assert!(matches!(err, ModelError::UnknownList { name, .. } if name == "shades"));
    }

    #[test]
    fn form_components_need_a_name() {
        let err = build(json!({ "type": "TextField", "title": "Name" })).unwrap_err();
        assert!(matches!(err, ModelError::InvalidComponent { .. }));
        assert!(build(json!({ "type": "Para", "content": "Hello" })).is_ok());
    }

    #[test]
    fn bad_regex_is_a_model_error() {
        let err = build(json!({
            "type": "TextField", "name": "code", "title": "Code", "schema": { "regex": "([" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn yes_no_has_built_in_items() {
        let component = build(json!({ "type": "YesNoField", "name": "agree", "title": "Agree?" }))
            .unwrap();
        let values: Vec<_> = component.items.iter().map(|i| i.value.clone()).collect();
        assert_eq!(values, vec![json!(true), json!(false)]);
    }
}
