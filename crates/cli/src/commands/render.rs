use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use formflow_engine::{EngineOptions, FlowOrchestrator, GetRequest, Instruction};
use formflow_storage::{AnswerState, InMemoryStateStore};

use crate::commands::instruction_json;
use crate::load::{form_id, load_definition, read_document};
use crate::OutputFormat;

const SESSION: &str = "cli";

pub(crate) struct RenderArgs<'a> {
    pub definition: &'a Path,
    pub path: &'a str,
    pub state: Option<&'a Path>,
    pub num: Option<usize>,
}

/// GET one page in preview mode and print the resulting instruction.
pub(crate) async fn cmd_render(
    args: RenderArgs<'_>,
    mut options: EngineOptions,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    options.preview_mode = true;
    let definition = load_definition(args.definition)?;
    let id = form_id(args.definition);

    let store = Arc::new(InMemoryStateStore::new());
    if let Some(path) = args.state {
        let state: AnswerState = read_document(path)?;
        store.insert_state(SESSION, state).await;
    }

    let orchestrator = FlowOrchestrator::new(store, options);
    orchestrator
        .register(&id, definition)
        .await
        .map_err(|e| format!("error in '{}': {}", args.definition.display(), e))?;

    let mut query = BTreeMap::new();
    if let Some(num) = args.num {
        query.insert("num".to_string(), num.to_string());
    }
    let instruction = orchestrator
        .get(&GetRequest {
            session: SESSION.to_string(),
            form_id: id,
            path: args.path.to_string(),
            query,
        })
        .await
        .map_err(|e| e.to_string())?;

    if quiet {
        return Ok(());
    }
    match output {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&instruction_json(&instruction))
                .map_err(|e| e.to_string())?
        ),
        OutputFormat::Text => print_instruction(&instruction),
    }
    Ok(())
}

fn print_instruction(instruction: &Instruction) {
    let view = match instruction {
        Instruction::Render(view) | Instruction::ValidationFailure(view) => view,
        Instruction::Redirect { .. } => {
            println!("redirect {}", instruction.location().unwrap_or_default());
            return;
        }
    };
    if let Some(section) = &view.section_title {
        println!("{}", section);
    }
    println!("{}", view.page_title);
    for component in &view.components {
        let label = component
            .label
            .as_ref()
            .map(|l| l.text.as_str())
            .or(component.content.as_deref())
            .unwrap_or("");
        if component.name.is_empty() {
            println!("  [{}] {}", component.component_type, label);
        } else {
            println!("  [{}] {}: {}", component.component_type, component.name, label);
        }
        for item in &component.items {
            let mark = if item.checked { "x" } else { " " };
            println!("    ({}) {}", mark, item.text);
        }
    }
    if let Some(back) = &view.back_link {
        println!("back: {}", back);
    }
}
