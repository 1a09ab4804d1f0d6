//! Typed structs representing a form definition document.
//!
//! Field names follow the camelCase keys of the definition JSON. Parts
//! of the document that only the renderer cares about (component
//! options, metadata) are kept loose so unknown keys survive a
//! round-trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Definition schema version assumed when a document omits `version`.
pub const CURRENT_VERSION: u32 = 2;

fn current_version() -> u32 {
    CURRENT_VERSION
}

/// A string that is either plain text or a map of language code to text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LocalisedString {
    Plain(String),
    Localised(BTreeMap<String, String>),
}

impl LocalisedString {
    /// The English text, falling back to the first available translation.
    pub fn text(&self) -> &str {
        match self {
            LocalisedString::Plain(s) => s,
            LocalisedString::Localised(map) => map
                .get("en")
                .or_else(|| map.values().next())
                .map(String::as_str)
                .unwrap_or(""),
        }
    }
}

impl From<&str> for LocalisedString {
    fn from(s: &str) -> Self {
        LocalisedString::Plain(s.to_string())
    }
}

// ── Form ────────────────────────────────────────────────────────────

/// Top-level form definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<LocalisedString>,
    /// Page path (e.g. `/start`) or absolute URL users are sent to first.
    pub start_page: String,
    pub pages: Vec<PageDefinition>,
    #[serde(default)]
    pub sections: Vec<SectionDefinition>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
    #[serde(default)]
    pub lists: Vec<ListDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_banner: Option<PhaseBanner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<String>,
    #[serde(default)]
    pub skip_summary: bool,
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDefinition {
    /// True when this form is itself the feedback form for other forms.
    #[serde(default)]
    pub feedback_form: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseBanner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

// ── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionDefinition {
    pub name: String,
    pub title: LocalisedString,
}

// ── Pages ───────────────────────────────────────────────────────────

/// One step of the form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageDefinition {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<LocalisedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Dotted state path whose integer value is the required iteration count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_field: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentDefinition>,
    #[serde(default)]
    pub next: Vec<NextLinkDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextLinkDefinition {
    pub path: String,
    /// Empty strings are treated the same as an absent condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

// ── Components ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentDefinition {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<LocalisedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<LocalisedString>,
    /// Body text for content components (Para, Html, InsetText, Details).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Name of a list in [`FormDefinition::lists`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<String>,
    #[serde(default)]
    pub options: ComponentOptions,
    #[serde(default)]
    pub schema: ComponentSchemaOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOptions {
    /// Fields are required unless this is explicitly `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
    /// Render-time condition for content components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_validation_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_words: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_days_in_past: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_days_in_future: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_title: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComponentSchemaOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

// ── Lists ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    String,
    Number,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<LocalisedString>,
    #[serde(rename = "type")]
    pub list_type: ListType,
    #[serde(default)]
    pub items: Vec<ListItemDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListItemDefinition {
    pub text: LocalisedString,
    /// A string or a number, matching the list's declared type.
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalisedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<ConditionalComponents>,
}

/// Components revealed when a list item is selected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionalComponents {
    #[serde(default)]
    pub components: Vec<ComponentDefinition>,
}

// ── Conditions ──────────────────────────────────────────────────────

/// A named condition. The value is either an expression string or a
/// structured model built by the designer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub value: ConditionValueDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConditionValueDefinition {
    Expression(String),
    Model(ConditionsModelDefinition),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionsModelDefinition {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<ConditionEntryDefinition>,
}

/// One entry in a structured condition list. Every entry but the first
/// carries a coordinator (`and` / `or`) joining it to its predecessor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConditionEntryDefinition {
    Field(FieldConditionDefinition),
    Ref(ConditionRefDefinition),
    Group(ConditionGroupDefinition),
}

impl ConditionEntryDefinition {
    pub fn coordinator(&self) -> Option<&str> {
        match self {
            ConditionEntryDefinition::Field(f) => f.coordinator.as_deref(),
            ConditionEntryDefinition::Ref(r) => r.coordinator.as_deref(),
            ConditionEntryDefinition::Group(g) => g.coordinator.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldConditionDefinition {
    pub field: ConditionFieldDefinition,
    pub operator: String,
    pub value: ConditionValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionFieldDefinition {
    /// Dotted state path, e.g. `applicant.age`.
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRefDefinition {
    pub condition_name: String,
    #[serde(default)]
    pub condition_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionGroupDefinition {
    pub conditions: Vec<ConditionEntryDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,
}

/// Right-hand side of a field condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConditionValue {
    RelativeTime(RelativeTimeValue),
    Static(StaticValue),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaticValue {
    #[serde(rename = "type", default)]
    pub value_type: String,
    pub value: String,
    #[serde(default)]
    pub display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelativeTimeValue {
    #[serde(rename = "type", default)]
    pub value_type: String,
    pub time_period: String,
    pub time_unit: String,
    /// `in the past` or `in the future`.
    pub direction: String,
    pub time_only: bool,
}
