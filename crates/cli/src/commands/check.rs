use std::path::Path;

use formflow_engine::{EngineOptions, FormModel};
use serde_json::json;

use crate::load::load_definition;
use crate::OutputFormat;

pub(crate) fn cmd_check(
    file: &Path,
    options: EngineOptions,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let definition = load_definition(file)?;
    let form = FormModel::new(definition, options)
        .map_err(|e| format!("error in '{}': {}", file.display(), e))?;

    let pages = form.pages().len();
    let sections = form.sections().count();
    let conditions = form.conditions().len();
    let warnings: Vec<String> = form.warnings().iter().map(ToString::to_string).collect();

    if quiet {
        return Ok(());
    }
    match output {
        OutputFormat::Json => {
            let report = json!({
                "valid": true,
                "name": form.name(),
                "pages": pages,
                "sections": sections,
                "conditions": conditions,
                "warnings": warnings,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?
            );
        }
        OutputFormat::Text => {
            println!("valid");
            if let Some(name) = form.name() {
                println!("  Form: {}", name);
            }
            println!(
                "  {} pages, {} sections, {} conditions",
                pages, sections, conditions
            );
            for warning in &warnings {
                println!("  warning: {}", warning);
            }
        }
    }
    Ok(())
}
