use formflow_definition::DefinitionError;
use formflow_storage::StorageError;
use thiserror::Error;

/// A form definition that cannot be turned into a form model.
///
/// Raised once, at model construction, never while serving a request.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("unknown condition '{name}' referenced by {referenced_by}")]
    UnknownCondition { name: String, referenced_by: String },

    #[error("page '{page}' references unknown section '{name}'")]
    UnknownSection { name: String, page: String },

    #[error("condition '{name}' refers to itself through its references")]
    CyclicCondition { name: String },

    #[error("invalid condition '{name}': {message}")]
    InvalidCondition { name: String, message: String },

    #[error("component '{component}' references unknown list '{name}'")]
    UnknownList { name: String, component: String },

    #[error("invalid repeat field on page '{page}': {message}")]
    InvalidRepeatField { page: String, message: String },

    #[error("invalid component on page '{page}': {message}")]
    InvalidComponent { page: String, message: String },
}

/// Failure while evaluating a named condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("unknown condition '{name}'")]
    UnknownCondition { name: String },
}

/// Errors surfaced to the request boundary.
///
/// Validation failures are not errors; they come back as a
/// [`crate::Instruction::ValidationFailure`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no form or page found for form '{form_id}' at '{path}'")]
    NotFound { form_id: String, path: String },

    #[error("no default form: {registered} forms are registered")]
    NoDefaultForm { registered: usize },

    #[error("publishing form definitions requires preview mode")]
    PreviewOnly,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Condition(#[from] ConditionError),
}

/// A tolerated problem found while building a form model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelWarning {
    /// A next link whose target page does not exist. The link is dropped.
    DroppedNextLink { page: String, target: String },
    /// `startPage` is neither an absolute URL nor a page in the form.
    UnknownStartPage { start_page: String },
}

impl std::fmt::Display for ModelWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelWarning::DroppedNextLink { page, target } => {
                write!(f, "page '{}' links to unknown page '{}'; link dropped", page, target)
            }
            ModelWarning::UnknownStartPage { start_page } => {
                write!(f, "start page '{}' is not a page in this form", start_page)
            }
        }
    }
}
