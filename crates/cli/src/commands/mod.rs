pub(crate) mod check;
pub(crate) mod render;
pub(crate) mod walk;

use formflow_engine::Instruction;
use serde_json::{json, Value};

/// JSON form of an engine instruction.
pub(crate) fn instruction_json(instruction: &Instruction) -> Value {
    match instruction {
        Instruction::Render(view) => json!({ "render": view }),
        Instruction::Redirect { .. } => json!({ "redirect": instruction.location() }),
        Instruction::ValidationFailure(view) => json!({ "validationFailure": view }),
    }
}
