//! Schema keys and value coercion per component kind.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use formflow_storage::Fields;

use super::{Component, ComponentKind, SchemaKeys};
use crate::schema::{
    ChoiceRule, DateRule, FieldRule, NumberRule, Schema, SchemaKey, TextRule,
};

const DATE_PARTS: [(&str, &str, i64, i64); 3] = [
    ("day", "day", 1, 31),
    ("month", "month", 1, 12),
    ("year", "year", 1000, 3000),
];

pub(super) const ADDRESS_PARTS: [(&str, &str, bool); 4] = [
    ("addressLine1", "Address line 1", true),
    ("addressLine2", "Address line 2", false),
    ("town", "Town or city", true),
    ("postcode", "Postcode", true),
];

/// Input name of one part of a composite field, e.g. `dob__day`.
pub(super) fn part_name(name: &str, part: &str) -> String {
    format!("{}__{}", name, part)
}

impl Component {
    fn key(&self, name: String, label: String, rule: FieldRule) -> SchemaKey {
        SchemaKey::new(name, label, rule)
            .required(self.required)
            .with_message(self.custom_message.clone())
    }

    fn date_rule(&self) -> DateRule {
        DateRule {
            max_days_in_past: self.max_days_in_past,
            max_days_in_future: self.max_days_in_future,
        }
    }

    fn choice_rule(&self, multiple: bool) -> ChoiceRule {
        ChoiceRule {
            allowed: self.items.iter().map(|item| item.value.clone()).collect(),
            multiple,
        }
    }

    fn address_schema(&self) -> Schema {
        Schema::new(
            ADDRESS_PARTS
                .iter()
                .map(|(part, label, required)| {
                    let rule = if *part == "postcode" {
                        TextRule {
                            pattern: self.postcode_pattern(),
                            ..TextRule::default()
                        }
                    } else {
                        TextRule {
                            max_length: Some(100),
                            ..TextRule::default()
                        }
                    };
                    SchemaKey::new(*part, *label, FieldRule::Text(rule)).required(*required)
                })
                .collect(),
        )
    }

    fn postcode_pattern(&self) -> Option<crate::schema::Pattern> {
        crate::schema::Pattern::new(super::POSTCODE_PATTERN).ok()
    }

    /// Keys shared by both layers for kinds whose stored value has the
    /// same shape as the submitted one.
    fn scalar_key(&self) -> Option<SchemaKey> {
        let name = self.name.clone();
        let label = self.title.clone();
        let rule = match self.kind {
            ComponentKind::TextField
            | ComponentKind::MultilineTextField
            | ComponentKind::EmailAddressField
            | ComponentKind::TelephoneNumberField
            | ComponentKind::UkPostcodeField
            | ComponentKind::NationalInsuranceNumberField
            | ComponentKind::FileUploadField => FieldRule::Text(self.text_rule.clone()),
            ComponentKind::NumberField => FieldRule::Number(self.number_rule.clone()),
            ComponentKind::DateField => FieldRule::Date(self.date_rule()),
            ComponentKind::TimeField => FieldRule::Time,
            ComponentKind::DateTimeField => FieldRule::DateTime,
            ComponentKind::RadiosField
            | ComponentKind::SelectField
            | ComponentKind::AutocompleteField => FieldRule::Choice(self.choice_rule(false)),
            ComponentKind::CheckboxesField => FieldRule::Choice(self.choice_rule(true)),
            _ => return None,
        };
        Some(self.key(name, label, rule))
    }

    fn nested_keys(&self, layer: fn(&Component) -> Vec<SchemaKey>) -> Vec<SchemaKey> {
        self.conditional_components()
            .flat_map(layer)
            .map(|key| key.required(false))
            .collect()
    }

    /// Turn validated form values into the values persisted for this
    /// component (and any components its items reveal).
    pub fn state_from_form(&self, form: &Fields, out: &mut Fields) {
        match self.kind {
            ComponentKind::DatePartsField => {
                let part = |p: &str| {
                    form.get(&part_name(&self.name, p))
                        .and_then(crate::condition::compare::as_decimal)
                        .and_then(|d| i64::try_from(d).ok())
                };
                let value = match (part("year"), part("month"), part("day")) {
                    (Some(y), Some(m), Some(d)) => {
                        Value::String(format!("{:04}-{:02}-{:02}", y, m, d))
                    }
                    _ => Value::Null,
                };
                out.insert(self.name.clone(), value);
            }
            ComponentKind::UkAddressField => {
                let mut address = Map::new();
                for (part, _, _) in ADDRESS_PARTS {
                    match form.get(&part_name(&self.name, part)) {
                        Some(Value::Null) | None => {}
                        Some(value) => {
                            address.insert(part.to_string(), value.clone());
                        }
                    }
                }
                let value = if address.is_empty() {
                    Value::Null
                } else {
                    Value::Object(address)
                };
                out.insert(self.name.clone(), value);
            }
            ComponentKind::UkPostcodeField | ComponentKind::NationalInsuranceNumberField => {
                let value = match form.get(&self.name) {
                    Some(Value::String(s)) => Value::String(s.to_uppercase()),
                    Some(other) => other.clone(),
                    None => Value::Null,
                };
                out.insert(self.name.clone(), value);
            }
            kind if kind.is_content() => {}
            _ => {
                out.insert(
                    self.name.clone(),
                    form.get(&self.name).cloned().unwrap_or(Value::Null),
                );
            }
        }
        for nested in self.conditional_components() {
            if form.contains_key(&nested.name)
                || form.keys().any(|k| k.starts_with(&part_name(&nested.name, "")))
            {
                nested.state_from_form(form, out);
            }
        }
    }

    /// Project persisted values back onto this component's inputs.
    pub fn form_values(&self, state: &Fields, out: &mut Fields) {
        match self.kind {
            ComponentKind::DatePartsField => {
                let date = state
                    .get(&self.name)
                    .and_then(Value::as_str)
                    .and_then(crate::condition::compare::parse_date);
                if let Some(date) = date {
                    out.insert(part_name(&self.name, "day"), Value::from(date.day()));
                    out.insert(part_name(&self.name, "month"), Value::from(u8::from(date.month())));
                    out.insert(part_name(&self.name, "year"), Value::from(date.year()));
                }
            }
            ComponentKind::UkAddressField => {
                if let Some(Value::Object(address)) = state.get(&self.name) {
                    for (part, _, _) in ADDRESS_PARTS {
                        if let Some(value) = address.get(part) {
                            out.insert(part_name(&self.name, part), value.clone());
                        }
                    }
                }
            }
            kind if kind.is_content() => {}
            _ => {
                if let Some(value) = state.get(&self.name) {
                    out.insert(self.name.clone(), value.clone());
                }
            }
        }
        for nested in self.conditional_components() {
            nested.form_values(state, out);
        }
    }
}

impl SchemaKeys for Component {
    fn form_schema_keys(&self) -> Vec<SchemaKey> {
        let mut keys = match self.kind {
            ComponentKind::YesNoField => vec![self.key(
                self.name.clone(),
                self.title.clone(),
                FieldRule::Choice(self.choice_rule(false)),
            )],
            ComponentKind::DatePartsField => DATE_PARTS
                .iter()
                .map(|(part, label, min, max)| {
                    self.key(
                        part_name(&self.name, part),
                        format!("{} {}", self.title, label),
                        FieldRule::Number(NumberRule {
                            min: Some(Decimal::from(*min)),
                            max: Some(Decimal::from(*max)),
                            precision: Some(0),
                            integer: true,
                        }),
                    )
                })
                .collect(),
            ComponentKind::UkAddressField => self
                .address_schema()
                .keys()
                .iter()
                .map(|key| {
                    SchemaKey::new(
                        part_name(&self.name, &key.name),
                        key.label.clone(),
                        key.rule.clone(),
                    )
                    .required(self.required && key.required)
                    .with_message(self.custom_message.clone())
                })
                .collect(),
            _ => self.scalar_key().into_iter().collect(),
        };
        keys.extend(self.nested_keys(Component::form_schema_keys));
        keys
    }

    fn state_schema_keys(&self) -> Vec<SchemaKey> {
        let mut keys = match self.kind {
            ComponentKind::YesNoField => vec![self.key(
                self.name.clone(),
                self.title.clone(),
                FieldRule::Boolean,
            )],
            ComponentKind::DatePartsField => vec![self.key(
                self.name.clone(),
                self.title.clone(),
                FieldRule::Date(self.date_rule()),
            )],
            ComponentKind::UkAddressField => vec![self.key(
                self.name.clone(),
                self.title.clone(),
                FieldRule::Object(self.address_schema()),
            )],
            _ => self.scalar_key().into_iter().collect(),
        };
        keys.extend(self.nested_keys(Component::state_schema_keys));
        keys
    }
}
