//! View models handed to the renderer, and the pure passes applied to
//! them after they are built.

use serde::Serialize;
use serde_json::Value;

use crate::error::ConditionError;
use crate::schema::FormSubmissionErrors;

pub const PAGE_HEADING_CLASSES: &str = "govuk-label--xl";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub text: String,
    /// Section title shown above a promoted heading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub is_page_heading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub text: String,
    pub value: Value,
    pub checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditional: Vec<ComponentView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentView {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    pub is_form_component: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
    /// Inputs of a composite field (date parts, address lines).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ComponentView>,
}

impl ComponentView {
    pub fn is_content(&self) -> bool {
        !self.is_form_component
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    /// Form name; a feedback form shows the title of the form being
    /// given feedback on instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub page_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    pub show_title: bool,
    pub components: Vec<ComponentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FormSubmissionErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_tag: Option<String>,
    /// Where "start again" links point.
    pub start_page: String,
}

/// Drop content components and list items whose condition is false.
/// Relative order of everything kept is unchanged.
pub fn filter_conditional_content(
    components: Vec<ComponentView>,
    is_true: &dyn Fn(&str) -> Result<bool, ConditionError>,
) -> Result<Vec<ComponentView>, ConditionError> {
    let mut kept = Vec::with_capacity(components.len());
    for mut component in components {
        if component.is_content() {
            if let Some(condition) = &component.condition {
                if !is_true(condition)? {
                    continue;
                }
            }
        }
        component.items = filter_items(std::mem::take(&mut component.items), is_true)?;
        kept.push(component);
    }
    Ok(kept)
}

fn filter_items(
    items: Vec<ItemView>,
    is_true: &dyn Fn(&str) -> Result<bool, ConditionError>,
) -> Result<Vec<ItemView>, ConditionError> {
    let mut kept = Vec::with_capacity(items.len());
    for mut item in items {
        if let Some(condition) = &item.condition {
            if !is_true(condition)? {
                continue;
            }
        }
        item.conditional = filter_conditional_content(std::mem::take(&mut item.conditional), is_true)?;
        kept.push(item);
    }
    Ok(kept)
}

/// When the only form component is also the first component, promote the
/// page title into its label and hide the separate page heading.
pub fn collapse_heading(mut view: ViewModel) -> ViewModel {
    let form_components = view.components.iter().filter(|c| c.is_form_component).count();
    let first_is_form = view.components.first().is_some_and(|c| c.is_form_component);
    if form_components != 1 || !first_is_form {
        return view;
    }

    let page_title = view.page_title.clone();
    let caption = view.section_title.clone();
    if let Some(first) = view.components.first_mut() {
        let label = first.label.get_or_insert_with(|| Label {
            text: String::new(),
            caption: None,
            is_page_heading: false,
            classes: None,
        });
        if !page_title.is_empty() {
            label.text = page_title;
        }
        label.caption = caption;
        label.is_page_heading = true;
        label.classes = Some(PAGE_HEADING_CLASSES.to_string());
        if view.page_title.is_empty() {
            view.page_title = label.text.clone();
        }
    }
    view.show_title = false;
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str) -> ComponentView {
        ComponentView {
            component_type: "TextField".to_string(),
            name: name.to_string(),
            is_form_component: true,
            label: Some(Label {
                text: name.to_string(),
                caption: None,
                is_page_heading: false,
                classes: None,
            }),
            hint: None,
            value: None,
            items: Vec::new(),
            content: None,
            condition: None,
            error_message: None,
            classes: None,
            parts: Vec::new(),
        }
    }

    fn para(name: &str, condition: Option<&str>) -> ComponentView {
        ComponentView {
            component_type: "Para".to_string(),
            is_form_component: false,
            label: None,
            content: Some(format!("{} text", name)),
            condition: condition.map(str::to_string),
            ..field(name)
        }
    }

    fn view(components: Vec<ComponentView>) -> ViewModel {
        ViewModel {
            name: None,
            page_title: "What is your name?".to_string(),
            section_title: Some("Applicant".to_string()),
            show_title: true,
            components,
            errors: None,
            back_link: None,
            feedback_link: None,
            phase_tag: None,
            start_page: "/form/start".to_string(),
        }
    }

    fn names(components: &[ComponentView]) -> Vec<&str> {
        components.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn false_content_is_removed_in_order() {
        let components = vec![
            para("a", None),
            para("b", Some("no")),
            field("c"),
            para("d", Some("yes")),
        ];
        let kept = filter_conditional_content(components, &|name: &str| Ok(name == "yes")).unwrap();
        assert_eq!(names(&kept), vec!["a", "c", "d"]);
    }

    #[test]
    fn item_conditions_filter_items_only() {
        let mut radios = field("colour");
        radios.items = vec![
            ItemView {
                text: "Red".into(),
                value: json!("red"),
                checked: false,
                hint: None,
                condition: None,
                conditional: Vec::new(),
            },
            ItemView {
                text: "Blue".into(),
                value: json!("blue"),
                checked: false,
                hint: None,
                condition: Some("likesBlue".into()),
                conditional: Vec::new(),
            },
        ];
        let kept = filter_conditional_content(vec![radios], &|_: &str| Ok(false)).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].items.len(), 1);
        assert_eq!(kept[0].items[0].value, json!("red"));
    }

    #[test]
    fn condition_errors_propagate() {
        let err = filter_conditional_content(vec![para("a", Some("ghost"))], &|name: &str| {
            Err(ConditionError::UnknownCondition {
                name: name.to_string(),
            })
        })
        .unwrap_err();
        assert_eq!(
            err,
            ConditionError::UnknownCondition {
                name: "ghost".into()
            }
        );
    }

    #[test]
    fn single_first_field_takes_the_page_heading() {
        let collapsed = collapse_heading(view(vec![field("name"), para("help", None)]));
        assert!(!collapsed.show_title);
        let label = collapsed.components[0].label.as_ref().unwrap();
        assert_eq!(label.text, "What is your name?");
        assert_eq!(label.caption.as_deref(), Some("Applicant"));
        assert!(label.is_page_heading);
        assert_eq!(label.classes.as_deref(), Some(PAGE_HEADING_CLASSES));
    }

    #[test]
    fn heading_stays_when_content_comes_first_or_fields_are_many() {
        let original = view(vec![para("intro", None), field("name")]);
        assert_eq!(collapse_heading(original.clone()), original);

        let original = view(vec![field("first"), field("last")]);
        assert_eq!(collapse_heading(original.clone()), original);
    }
}
