//! Deserialization of form definition documents into typed structs.
//!
//! The main entry point is [`from_definition`], which takes a
//! `&serde_json::Value` and produces a [`FormDefinition`].

use std::collections::HashSet;
use std::fmt;

use crate::types::*;

/// Errors during form definition deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The document does not match the definition shape.
    InvalidDocument(String),
    /// `startPage` is missing or empty.
    MissingStartPage,
    /// Two pages share the same path.
    DuplicatePage { path: String },
    /// Two sections share the same name.
    DuplicateSection { name: String },
    /// Two conditions share the same name.
    DuplicateCondition { name: String },
    /// Two lists share the same name.
    DuplicateList { name: String },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionError::InvalidDocument(msg) => {
                write!(f, "invalid form definition: {}", msg)
            }
            DefinitionError::MissingStartPage => {
                write!(f, "form definition missing required field: 'startPage'")
            }
            DefinitionError::DuplicatePage { path } => {
                write!(f, "duplicate page path '{}'", path)
            }
            DefinitionError::DuplicateSection { name } => {
                write!(f, "duplicate section name '{}'", name)
            }
            DefinitionError::DuplicateCondition { name } => {
                write!(f, "duplicate condition name '{}'", name)
            }
            DefinitionError::DuplicateList { name } => {
                write!(f, "duplicate list name '{}'", name)
            }
        }
    }
}

impl std::error::Error for DefinitionError {}

/// Deserialize a form definition document into typed structs.
///
/// Page paths are compared after stripping leading and trailing `/`, so
/// `/name` and `name/` collide.
pub fn from_definition(document: &serde_json::Value) -> Result<FormDefinition, DefinitionError> {
    let definition: FormDefinition = serde_json::from_value(document.clone())
        .map_err(|e| DefinitionError::InvalidDocument(e.to_string()))?;
    check_definition(&definition)?;
    Ok(definition)
}

/// Parse and check a definition from JSON text.
pub fn from_json_str(source: &str) -> Result<FormDefinition, DefinitionError> {
    let document: serde_json::Value =
        serde_json::from_str(source).map_err(|e| DefinitionError::InvalidDocument(e.to_string()))?;
    from_definition(&document)
}

/// Strip leading and trailing `/` from a page path.
pub fn normalise_path(path: &str) -> &str {
    path.trim_start_matches('/').trim_end_matches('/')
}

/// Structural checks shared by every entry point: a start page is set and
/// page paths, section, condition and list names are unique.
pub fn check_definition(definition: &FormDefinition) -> Result<(), DefinitionError> {
    if definition.start_page.trim().is_empty() {
        return Err(DefinitionError::MissingStartPage);
    }

    let mut paths = HashSet::new();
    for page in &definition.pages {
        if !paths.insert(normalise_path(&page.path)) {
            return Err(DefinitionError::DuplicatePage {
                path: page.path.clone(),
            });
        }
    }

    let mut sections = HashSet::new();
    for section in &definition.sections {
        if !sections.insert(section.name.as_str()) {
            return Err(DefinitionError::DuplicateSection {
                name: section.name.clone(),
            });
        }
    }

    let mut conditions = HashSet::new();
    for condition in &definition.conditions {
        if !conditions.insert(condition.name.as_str()) {
            return Err(DefinitionError::DuplicateCondition {
                name: condition.name.clone(),
            });
        }
    }

    let mut lists = HashSet::new();
    for list in &definition.lists {
        if !lists.insert(list.name.as_str()) {
            return Err(DefinitionError::DuplicateList {
                name: list.name.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "startPage": "/first",
            "pages": [
                { "path": "/first", "title": "First", "components": [], "next": [{ "path": "/second" }] },
                { "path": "/second", "title": "Second" }
            ],
            "sections": [],
            "conditions": []
        })
    }

    #[test]
    fn parses_minimal_definition() {
        let def = from_definition(&minimal()).unwrap();
        assert_eq!(def.start_page, "/first");
        assert_eq!(def.pages.len(), 2);
        assert_eq!(def.pages[0].next[0].path, "/second");
        assert_eq!(def.version, CURRENT_VERSION);
        assert!(!def.skip_summary);
    }

    #[test]
    fn rejects_duplicate_page_paths_after_normalisation() {
        let mut doc = minimal();
        doc["pages"][1]["path"] = json!("first/");
        let err = from_definition(&doc).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::DuplicatePage {
                path: "first/".to_string()
            }
        );
    }

    #[test]
    fn rejects_duplicate_sections() {
        let mut doc = minimal();
        doc["sections"] = json!([
            { "name": "a", "title": "A" },
            { "name": "a", "title": "Again" }
        ]);
        assert!(matches!(
            from_definition(&doc),
            Err(DefinitionError::DuplicateSection { .. })
        ));
    }

    #[test]
    fn rejects_empty_start_page() {
        let mut doc = minimal();
        doc["startPage"] = json!("  ");
        assert_eq!(
            from_definition(&doc).unwrap_err(),
            DefinitionError::MissingStartPage
        );
    }

    #[test]
    fn missing_pages_is_invalid_document() {
        let doc = json!({ "startPage": "/x" });
        assert!(matches!(
            from_definition(&doc),
            Err(DefinitionError::InvalidDocument(_))
        ));
    }

    #[test]
    fn condition_values_parse_in_both_forms() {
        let mut doc = minimal();
        doc["conditions"] = json!([
            { "name": "adult", "value": "applicant.age >= 18" },
            {
                "name": "recent",
                "displayName": "Recent",
                "value": {
                    "name": "recent",
                    "conditions": [
                        {
                            "field": { "name": "applicant.moved", "type": "DatePartsField", "display": "Moved" },
                            "operator": "is after",
                            "value": {
                                "type": "RelativeTime",
                                "timePeriod": "3",
                                "timeUnit": "months",
                                "direction": "in the past",
                                "timeOnly": false
                            }
                        },
                        {
                            "conditionName": "adult",
                            "conditionDisplayName": "Adult",
                            "coordinator": "and"
                        },
                        {
                            "coordinator": "or",
                            "conditions": [
                                {
                                    "field": { "name": "applicant.country", "type": "TextField", "display": "Country" },
                                    "operator": "is",
                                    "value": { "type": "Value", "value": "UK", "display": "UK" }
                                }
                            ]
                        }
                    ]
                }
            }
        ]);
        let def = from_definition(&doc).unwrap();
        assert!(matches!(
            def.conditions[0].value,
            ConditionValueDefinition::Expression(_)
        ));
        let ConditionValueDefinition::Model(model) = &def.conditions[1].value else {
            panic!("expected structured condition");
        };
        assert!(matches!(
            &model.conditions[0],
            ConditionEntryDefinition::Field(FieldConditionDefinition {
                value: ConditionValue::RelativeTime(_),
                ..
            })
        ));
        assert!(matches!(&model.conditions[1], ConditionEntryDefinition::Ref(_)));
        assert_eq!(model.conditions[1].coordinator(), Some("and"));
        assert!(matches!(&model.conditions[2], ConditionEntryDefinition::Group(_)));
    }

    #[test]
    fn localised_string_prefers_english() {
        let s: LocalisedString = serde_json::from_value(json!({ "cy": "Enw", "en": "Name" })).unwrap();
        assert_eq!(s.text(), "Name");
        let plain: LocalisedString = serde_json::from_value(json!("Name")).unwrap();
        assert_eq!(plain.text(), "Name");
    }

    #[test]
    fn component_options_keep_unknown_keys() {
        let component: ComponentDefinition = serde_json::from_value(json!({
            "type": "TextField",
            "name": "fullName",
            "title": "Full name",
            "options": { "required": false, "autocomplete": "name" },
            "schema": { "max": 70 }
        }))
        .unwrap();
        assert_eq!(component.options.required, Some(false));
        assert_eq!(
            component.options.extra.get("autocomplete"),
            Some(&json!("name"))
        );
        assert_eq!(component.schema.max.as_ref().and_then(|n| n.as_u64()), Some(70));
    }
}
