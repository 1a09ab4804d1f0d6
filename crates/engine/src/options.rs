use serde::{Deserialize, Serialize};

/// Engine settings, usually read from a `formflow.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineOptions {
    /// Author/preview mode: pages may be opened without first visiting the
    /// start page, and definitions may be published at runtime.
    pub preview_mode: bool,
    /// Prefix for every emitted URL. The orchestrator sets it to the form id.
    pub base_path: String,
    /// Terminal path used when a page has no resolvable next page.
    pub default_next_path: String,
    pub error_summary_title: String,
    pub file_too_large_message: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            preview_mode: false,
            base_path: String::new(),
            default_next_path: "summary".to_string(),
            error_summary_title: "Fix the following errors".to_string(),
            file_too_large_message: "The file you uploaded was too big".to_string(),
        }
    }
}

impl EngineOptions {
    /// Build an absolute path under the base path, e.g. `/my-form/summary`.
    pub fn url_for(&self, path: &str) -> String {
        let base = formflow_definition::normalise_path(&self.base_path);
        let path = formflow_definition::normalise_path(path);
        match (base.is_empty(), path.is_empty()) {
            (true, _) => format!("/{}", path),
            (false, true) => format!("/{}", base),
            (false, false) => format!("/{}/{}", base, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runner_behaviour() {
        let options = EngineOptions::default();
        assert!(!options.preview_mode);
        assert_eq!(options.default_next_path, "summary");
        assert_eq!(options.error_summary_title, "Fix the following errors");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let options: EngineOptions =
            serde_json::from_value(serde_json::json!({ "preview_mode": true })).unwrap();
        assert!(options.preview_mode);
        assert_eq!(options.default_next_path, "summary");
    }

    #[test]
    fn url_for_joins_base_and_path() {
        let mut options = EngineOptions::default();
        assert_eq!(options.url_for("/first"), "/first");
        options.base_path = "apply".to_string();
        assert_eq!(options.url_for("/first/"), "/apply/first");
        assert_eq!(options.url_for("summary"), "/apply/summary");
        assert_eq!(options.url_for(""), "/apply");
    }
}
