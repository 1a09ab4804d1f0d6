pub mod conformance;
mod error;
mod memory;
mod state;
mod traits;

pub use error::StorageError;
pub use memory::InMemoryStateStore;
pub use state::{
    merge_fields, merge_value, AnswerState, Fields, Iteration, OriginalFilename, PageAnswers,
    SectionState, StatePatch,
};
pub use traits::StateStore;
