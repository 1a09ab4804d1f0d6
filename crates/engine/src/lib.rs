//! formflow-engine: the form flow engine.
//!
//! Given a form definition and a session's accumulated answers, the
//! engine decides which page comes next, what a page displays, and how a
//! submitted page is validated and merged into state.
//!
//! - [`condition`] compiles named conditions (expression strings or
//!   structured models) into a small AST evaluated against [`AnswerState`].
//! - [`component`] turns component definitions into schema keys, value
//!   coercions and views; [`schema`] validates values against those keys.
//! - [`FormModel`] checks every cross reference once, at load.
//! - [`PageModel`] implements the GET and POST algorithms as pure
//!   functions of the model and the state.
//! - [`navigation`] resolves the next page, including repeat loops.
//! - [`FlowOrchestrator`] routes requests, reads and writes the
//!   [`StateStore`], and returns [`Instruction`]s for the HTTP layer.
//!
//! [`AnswerState`]: formflow_storage::AnswerState
//! [`StateStore`]: formflow_storage::StateStore

pub mod clock;
pub mod component;
pub mod condition;
pub mod error;
pub mod feedback;
pub mod form;
pub mod navigation;
pub mod options;
pub mod orchestrator;
pub mod page;
pub mod progress;
pub mod schema;
pub mod view;

pub use clock::{Clock, FixedClock, SystemClock};
pub use condition::{Condition, ConditionSet, Operator};
pub use error::{ConditionError, EngineError, ModelError, ModelWarning};
pub use feedback::FeedbackContext;
pub use form::FormModel;
pub use navigation::{next_page, next_target, NextTarget};
pub use options::EngineOptions;
pub use orchestrator::{FlowOrchestrator, GetRequest, Instruction, PostRequest, PublishedForm};
pub use page::{
    GetOutcome, PageModel, PostOutcome, RequestContext, Section, UploadError, UploadOutcome,
};
pub use progress::NavigationProgress;
pub use schema::{FieldError, FormSubmissionErrors, ValidationOutcome};
pub use view::{ComponentView, ViewModel};
