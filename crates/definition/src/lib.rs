//! formflow-definition: typed form definition structs and deserialization.
//!
//! A form definition is authored elsewhere (a designer tool, a file on
//! disk) and handed to the engine as JSON. This crate owns the shape of
//! that document: pages, sections, components, lists, named conditions
//! and feedback settings, plus a single [`from_definition`] entry point
//! that turns a `serde_json::Value` into a [`FormDefinition`] and rejects
//! structurally invalid documents (duplicate page paths, duplicate
//! section names and so on).
//!
//! Reference checking (does a next link point at a real page, is a
//! condition name registered) is the engine's job, not this crate's.

pub mod deserialize;
pub mod types;

pub use deserialize::{
    check_definition, from_definition, from_json_str, normalise_path, DefinitionError,
};
pub use types::*;
