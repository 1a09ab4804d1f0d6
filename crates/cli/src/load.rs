//! Reading definitions, answers and settings from disk.

use std::path::Path;

use formflow_definition::FormDefinition;
use formflow_engine::EngineOptions;
use serde::de::DeserializeOwned;

/// Read a JSON or YAML document, chosen by file extension.
pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .map_err(|e| format!("error parsing YAML in '{}': {}", path.display(), e)),
        _ => serde_json::from_str(&content)
            .map_err(|e| format!("error parsing JSON in '{}': {}", path.display(), e)),
    }
}

pub(crate) fn load_definition(path: &Path) -> Result<FormDefinition, String> {
    let document: serde_json::Value = read_document(path)?;
    formflow_definition::from_definition(&document)
        .map_err(|e| format!("error in '{}': {}", path.display(), e))
}

/// Engine settings from a TOML file, or the defaults when none is given.
pub(crate) fn engine_options(path: Option<&Path>) -> Result<EngineOptions, String> {
    let Some(path) = path else {
        return Ok(EngineOptions::default());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading config '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

/// Form id for a definition file: its file stem, e.g. `apply` for
/// `forms/apply.json`.
pub(crate) fn form_id(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("form")
        .to_string()
}
