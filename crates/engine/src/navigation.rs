//! Next-page resolution.

use formflow_storage::AnswerState;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::condition::compare::as_decimal;
use crate::error::ConditionError;
use crate::form::FormModel;
use crate::page::PageModel;

/// Where to send the user after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextTarget {
    /// Absolute path under the form's base path.
    pub path: String,
    /// Iteration number for a repeated destination page.
    pub num: Option<usize>,
}

impl NextTarget {
    /// The path with its `num` query, if any.
    pub fn url(&self) -> String {
        match self.num {
            Some(num) => format!("{}?num={}", self.path, num),
            None => self.path.clone(),
        }
    }
}

/// Required iteration count stored at `repeat_field`; 0 when absent or
/// not a whole number.
pub fn required_count(state: &AnswerState, repeat_field: &str) -> usize {
    state
        .lookup(repeat_field)
        .as_ref()
        .and_then(as_decimal)
        .filter(|d| d.fract().is_zero())
        .and_then(|d| d.to_usize())
        .unwrap_or(0)
}

/// Resolve the page after `page`.
///
/// A repeated page whose current iteration is complete loops back to the
/// start of its block while fewer iterations than required exist.
/// Otherwise the first next link whose condition holds wins, and the
/// last unconditioned link is the fallback. `None` means the form has
/// nowhere else to go.
pub fn next_page<'a>(
    form: &'a FormModel,
    page: &PageModel,
    state: &AnswerState,
    suppress_repetition: bool,
) -> Result<Option<&'a PageModel>, ConditionError> {
    if let (Some(section), Some(field), false) =
        (page.section(), page.repeat_field(), suppress_repetition)
    {
        let required = required_count(state, field);
        let block: Vec<&PageModel> = form.repeat_block(&section.name, field).collect();
        let iterations = state.iterations(&section.name);
        let complete = iterations
            .last()
            .is_some_and(|last| last.page_count() == block.len());
        debug!(
            page = %page.path(),
            section = %section.name,
            iterations = iterations.len(),
            required,
            complete,
            "checking repeat loop"
        );
        if complete && iterations.len() < required {
            if let Some(first) = block.first() {
                debug!(page = %page.path(), next = %first.path(), "looping back to repeat block");
                return Ok(Some(*first));
            }
        }
    }

    let mut default = None;
    for link in page.next() {
        match &link.condition {
            Some(condition) => {
                if form.evaluate(condition, state)? {
                    debug!(page = %page.path(), next = %link.path, condition = %condition, "next link matched");
                    return Ok(form.page(&link.path));
                }
            }
            None => default = Some(link),
        }
    }

    let next = default.and_then(|link| form.page(&link.path));
    debug!(
        page = %page.path(),
        next = next.map(PageModel::path).unwrap_or("<none>"),
        "resolved default next page"
    );
    Ok(next)
}

/// Resolve the redirect target after `page`, including the `num` query
/// for a repeated destination.
pub fn next_target(
    form: &FormModel,
    page: &PageModel,
    state: &AnswerState,
) -> Result<NextTarget, ConditionError> {
    let Some(next) = next_page(form, page, state, false)? else {
        return Ok(NextTarget {
            path: form.options().url_for(&form.options().default_next_path),
            num: None,
        });
    };

    let num = match (next.section(), next.repeat_field()) {
        (Some(section), Some(field)) => {
            let required = required_count(state, field);
            let block_len = form.repeat_block(&section.name, field).count();
            let iterations = state.iterations(&section.name);
            let num = match iterations.last() {
                None => 1,
                Some(last) if last.page_count() == block_len => iterations.len() + 1,
                Some(_) => iterations.len(),
            };
            (num <= required).then_some(num)
        }
        _ => None,
    };

    Ok(NextTarget {
        path: form.options().url_for(next.path()),
        num,
    })
}
