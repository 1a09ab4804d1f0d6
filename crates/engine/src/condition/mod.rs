//! Named boolean conditions over an [`AnswerState`].
//!
//! Every condition in a form definition, whether written as an expression
//! string or as a structured designer model, is compiled once into a
//! [`Condition`] tree. Evaluation is a pure walk of that tree against the
//! current answers; nothing is cached between requests.

pub mod compare;
mod expr;
mod parse;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use formflow_definition::{ConditionDefinition, ConditionValueDefinition};
use formflow_storage::AnswerState;
use serde_json::Value;
use time::OffsetDateTime;

use crate::clock::{Clock, SystemClock};
use crate::error::{ConditionError, ModelError};

pub use expr::parse_expression;

/// Comparison operators understood by field conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Is,
    IsNot,
    IsLongerThan,
    IsShorterThan,
    HasLength,
    IsMoreThan,
    IsLessThan,
    IsAtLeast,
    IsAtMost,
    Contains,
    DoesNotContain,
    IsBefore,
    IsAfter,
    IsAtOrBefore,
    IsAtOrAfter,
}

impl Operator {
    const ALL: [Operator; 15] = [
        Operator::Is,
        Operator::IsNot,
        Operator::IsLongerThan,
        Operator::IsShorterThan,
        Operator::HasLength,
        Operator::IsMoreThan,
        Operator::IsLessThan,
        Operator::IsAtLeast,
        Operator::IsAtMost,
        Operator::Contains,
        Operator::DoesNotContain,
        Operator::IsBefore,
        Operator::IsAfter,
        Operator::IsAtOrBefore,
        Operator::IsAtOrAfter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Is => "is",
            Operator::IsNot => "is not",
            Operator::IsLongerThan => "is longer than",
            Operator::IsShorterThan => "is shorter than",
            Operator::HasLength => "has length",
            Operator::IsMoreThan => "is more than",
            Operator::IsLessThan => "is less than",
            Operator::IsAtLeast => "is at least",
            Operator::IsAtMost => "is at most",
            Operator::Contains => "contains",
            Operator::DoesNotContain => "does not contain",
            Operator::IsBefore => "is before",
            Operator::IsAfter => "is after",
            Operator::IsAtOrBefore => "is at or before",
            Operator::IsAtOrAfter => "is at or after",
        }
    }

    /// Parse a designer operator name. Case and surrounding whitespace
    /// are ignored.
    pub fn parse(name: &str) -> Option<Operator> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Operators that hold when the answer is absent.
    pub fn is_negative(self) -> bool {
        matches!(self, Operator::IsNot | Operator::DoesNotContain)
    }

    /// Whether an ordering of `answer` relative to the comparison value
    /// satisfies this operator. Non-ordering operators accept nothing.
    pub fn accepts(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Operator::IsMoreThan | Operator::IsAfter => ordering == Greater,
            Operator::IsLessThan | Operator::IsBefore => ordering == Less,
            Operator::IsAtLeast | Operator::IsAtOrAfter => ordering != Less,
            Operator::IsAtMost | Operator::IsAtOrBefore => ordering != Greater,
            _ => false,
        }
    }

    pub(crate) fn is_ordering(self) -> bool {
        matches!(
            self,
            Operator::IsMoreThan
                | Operator::IsLessThan
                | Operator::IsAtLeast
                | Operator::IsAtMost
                | Operator::IsBefore
                | Operator::IsAfter
                | Operator::IsAtOrBefore
                | Operator::IsAtOrAfter
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    pub fn parse(name: &str) -> Option<TimeUnit> {
        match name.trim().to_ascii_lowercase().trim_end_matches('s') {
            "minute" => Some(TimeUnit::Minutes),
            "hour" => Some(TimeUnit::Hours),
            "day" => Some(TimeUnit::Days),
            "week" => Some(TimeUnit::Weeks),
            "month" => Some(TimeUnit::Months),
            "year" => Some(TimeUnit::Years),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Past,
    Future,
}

/// "`period` `unit`s in the past/future", measured from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeOffset {
    pub period: i64,
    pub unit: TimeUnit,
    pub direction: Direction,
    /// Compare only the time of day.
    pub time_only: bool,
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Dotted path into the answer state.
    Field(String),
    Literal(Value),
}

impl Operand {
    fn resolve(&self, state: &AnswerState) -> Option<Value> {
        match self {
            Operand::Field(path) => state.lookup(path),
            Operand::Literal(value) => Some(value.clone()),
        }
    }
}

/// A compiled condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        left: Operand,
        op: Operator,
        right: Operand,
    },
    RelativeTime {
        field: String,
        op: Operator,
        offset: RelativeOffset,
    },
    /// Another named condition.
    Ref(String),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    /// A bare field reference: true when the answer is present and truthy.
    Truthy(String),
}

impl Condition {
    /// Join `(coordinator, condition)` pairs where `and` binds tighter
    /// than `or`: `a or b and c` is `a or (b and c)`.
    pub(crate) fn coordinate(entries: Vec<(Option<Coordinator>, Condition)>) -> Condition {
        let mut groups: Vec<Vec<Condition>> = Vec::new();
        for (coordinator, condition) in entries {
            let joins_previous = coordinator != Some(Coordinator::Or);
            match groups.last_mut() {
                Some(group) if joins_previous => group.push(condition),
                _ => groups.push(vec![condition]),
            }
        }
        let mut alternatives: Vec<Condition> = groups
            .into_iter()
            .map(|mut group| {
                if group.len() == 1 {
                    group.remove(0)
                } else {
                    Condition::All(group)
                }
            })
            .collect();
        if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            Condition::Any(alternatives)
        }
    }

    /// Names of other conditions this one refers to.
    pub fn references(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Condition::Ref(name) => {
                out.insert(name.as_str());
            }
            Condition::All(items) | Condition::Any(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Condition::Not(inner) => inner.collect_references(out),
            Condition::Compare { .. } | Condition::RelativeTime { .. } | Condition::Truthy(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Coordinator {
    And,
    Or,
}

impl Coordinator {
    pub(crate) fn parse(word: &str) -> Option<Coordinator> {
        match word.trim().to_ascii_lowercase().as_str() {
            "and" => Some(Coordinator::And),
            "or" => Some(Coordinator::Or),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NamedCondition {
    pub name: String,
    pub display_name: String,
    pub condition: Condition,
}

/// All named conditions of one form, compiled and reference-checked.
#[derive(Debug, Clone)]
pub struct ConditionSet {
    conditions: BTreeMap<String, NamedCondition>,
    clock: Arc<dyn Clock>,
}

impl Default for ConditionSet {
    fn default() -> Self {
        Self {
            conditions: BTreeMap::new(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl ConditionSet {
    /// Compile every definition. Fails on syntax errors, references to
    /// unregistered conditions and reference cycles.
    pub fn compile(
        definitions: &[ConditionDefinition],
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ModelError> {
        let names: BTreeSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        let mut conditions = BTreeMap::new();

        for definition in definitions {
            let condition = match &definition.value {
                ConditionValueDefinition::Expression(source) => {
                    parse_expression(source, &|word: &str| names.contains(word)).map_err(|message| {
                        ModelError::InvalidCondition {
                            name: definition.name.clone(),
                            message,
                        }
                    })?
                }
                ConditionValueDefinition::Model(model) => {
                    parse::compile_model(&model.conditions).map_err(|message| {
                        ModelError::InvalidCondition {
                            name: definition.name.clone(),
                            message,
                        }
                    })?
                }
            };
            conditions.insert(
                definition.name.clone(),
                NamedCondition {
                    name: definition.name.clone(),
                    display_name: definition
                        .display_name
                        .clone()
                        .unwrap_or_else(|| definition.name.clone()),
                    condition,
                },
            );
        }

        let set = Self { conditions, clock };
        set.check_references()?;
        Ok(set)
    }

    fn check_references(&self) -> Result<(), ModelError> {
        for named in self.conditions.values() {
            for reference in named.condition.references() {
                if !self.conditions.contains_key(reference) {
                    return Err(ModelError::UnknownCondition {
                        name: reference.to_string(),
                        referenced_by: format!("condition '{}'", named.name),
                    });
                }
            }
        }

        // Depth-first search; a node seen again while still on the stack
        // closes a cycle.
        let mut done: BTreeSet<&str> = BTreeSet::new();
        for start in self.conditions.keys() {
            let mut on_stack: Vec<&str> = Vec::new();
            self.visit(start, &mut on_stack, &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        on_stack: &mut Vec<&'a str>,
        done: &mut BTreeSet<&'a str>,
    ) -> Result<(), ModelError> {
        if done.contains(name) {
            return Ok(());
        }
        if on_stack.contains(&name) {
            return Err(ModelError::CyclicCondition {
                name: name.to_string(),
            });
        }
        let Some(named) = self.conditions.get(name) else {
            return Ok(());
        };
        on_stack.push(name);
        for reference in named.condition.references() {
            self.visit(reference, on_stack, done)?;
        }
        on_stack.pop();
        done.insert(name);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&NamedCondition> {
        self.conditions.get(name)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }

    /// Evaluate a named condition against the current answers.
    pub fn evaluate(&self, name: &str, state: &AnswerState) -> Result<bool, ConditionError> {
        let named = self
            .conditions
            .get(name)
            .ok_or_else(|| ConditionError::UnknownCondition {
                name: name.to_string(),
            })?;
        let now = self.clock.now();
        self.eval(&named.condition, state, now)
    }

    fn eval(
        &self,
        condition: &Condition,
        state: &AnswerState,
        now: OffsetDateTime,
    ) -> Result<bool, ConditionError> {
        match condition {
            Condition::Compare { left, op, right } => {
                let left = left.resolve(state);
                let right = right.resolve(state).unwrap_or(Value::Null);
                Ok(compare::compare(left.as_ref(), *op, &right))
            }
            Condition::RelativeTime { field, op, offset } => Ok(compare::compare_relative(
                state.lookup(field).as_ref(),
                *op,
                offset,
                now,
            )),
            Condition::Ref(name) => {
                let named =
                    self.conditions
                        .get(name)
                        .ok_or_else(|| ConditionError::UnknownCondition {
                            name: name.clone(),
                        })?;
                self.eval(&named.condition, state, now)
            }
            Condition::All(items) => {
                for item in items {
                    if !self.eval(item, state, now)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any(items) => {
                for item in items {
                    if self.eval(item, state, now)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!self.eval(inner, state, now)?),
            Condition::Truthy(path) => Ok(compare::truthy(state.lookup(path).as_ref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use formflow_storage::StatePatch;
    use serde_json::json;
    use time::macros::datetime;

    fn definitions(value: Value) -> Vec<ConditionDefinition> {
        serde_json::from_value(value).unwrap()
    }

    fn compile(value: Value) -> Result<ConditionSet, ModelError> {
        ConditionSet::compile(
            &definitions(value),
            Arc::new(FixedClock(datetime!(2021-06-15 12:00 UTC))),
        )
    }

    fn state(fields: Value) -> AnswerState {
        let mut state = AnswerState::default();
        state
            .apply(&StatePatch::Fields(serde_json::from_value(fields).unwrap()))
            .unwrap();
        state
    }

    #[test]
    fn operator_names_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operator::parse("  Is At Least "), Some(Operator::IsAtLeast));
        assert_eq!(Operator::parse("equals"), None);
    }

    #[test]
    fn coordinate_gives_and_precedence() {
        let a = Condition::Truthy("a".into());
        let b = Condition::Truthy("b".into());
        let c = Condition::Truthy("c".into());
        let joined = Condition::coordinate(vec![
            (None, a.clone()),
            (Some(Coordinator::Or), b.clone()),
            (Some(Coordinator::And), c.clone()),
        ]);
        assert_eq!(joined, Condition::Any(vec![a, Condition::All(vec![b, c])]));
    }

    #[test]
    fn expression_and_model_conditions_evaluate() {
        let set = compile(json!([
            { "name": "isAdult", "value": "age >= 18" },
            {
                "name": "isUkAdult",
                "value": {
                    "name": "isUkAdult",
                    "conditions": [
                        { "conditionName": "isAdult", "conditionDisplayName": "Is adult" },
                        {
                            "field": { "name": "country", "type": "TextField", "display": "Country" },
                            "operator": "is",
                            "value": { "type": "Value", "value": "UK", "display": "UK" },
                            "coordinator": "and"
                        }
                    ]
                }
            }
        ]))
        .unwrap();

        let answers = state(json!({ "age": 30, "country": "UK" }));
        assert!(set.evaluate("isAdult", &answers).unwrap());
        assert!(set.evaluate("isUkAdult", &answers).unwrap());

        let answers = state(json!({ "age": "17", "country": "UK" }));
        assert!(!set.evaluate("isUkAdult", &answers).unwrap());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let set = compile(json!([{ "name": "c", "value": "x == 'a' or y > 2" }])).unwrap();
        let answers = state(json!({ "x": "b", "y": 3 }));
        let first = set.evaluate("c", &answers).unwrap();
        for _ in 0..10 {
            assert_eq!(set.evaluate("c", &answers).unwrap(), first);
        }
    }

    #[test]
    fn unknown_name_at_evaluation_is_an_error() {
        let set = compile(json!([])).unwrap();
        let err = set.evaluate("doesNotExist", &AnswerState::default()).unwrap_err();
        assert_eq!(
            err,
            ConditionError::UnknownCondition {
                name: "doesNotExist".to_string()
            }
        );
    }

    #[test]
    fn unknown_reference_fails_compilation() {
        let err = compile(json!([{
            "name": "a",
            "value": {
                "name": "a",
                "conditions": [{ "conditionName": "doesNotExist", "conditionDisplayName": "x" }]
            }
        }]))
        .unwrap_err();
        assert!(matches!(err, ModelError::UnknownCondition { ref name, .. } if name == "doesNotExist"));
    }

    #[test]
    fn reference_cycles_are_rejected() {
        let err = compile(json!([
            { "name": "a", "value": "b and x == 1" },
            { "name": "b", "value": "not a" }
        ]))
        .unwrap_err();
        assert!(matches!(err, ModelError::CyclicCondition { .. }));
    }

    #[test]
    fn relative_time_conditions_use_the_injected_clock() {
        let set = compile(json!([{
            "name": "isAdult",
            "value": {
                "name": "isAdult",
                "conditions": [{
                    "field": { "name": "dob", "type": "DatePartsField", "display": "Date of birth" },
                    "operator": "is at or before",
                    "value": {
                        "type": "RelativeTime",
                        "timePeriod": "18",
                        "timeUnit": "years",
                        "direction": "in the past",
                        "timeOnly": false
                    }
                }]
            }
        }]))
        .unwrap();
        assert!(set.evaluate("isAdult", &state(json!({ "dob": "2003-06-15" }))).unwrap());
        assert!(!set.evaluate("isAdult", &state(json!({ "dob": "2003-06-16" }))).unwrap());
        assert!(!set.evaluate("isAdult", &AnswerState::default()).unwrap());
    }

    #[test]
    fn invalid_operator_is_reported_with_condition_name() {
        let err = compile(json!([{
            "name": "bad",
            "value": {
                "name": "bad",
                "conditions": [{
                    "field": { "name": "x", "type": "TextField", "display": "X" },
                    "operator": "resembles",
                    "value": { "type": "Value", "value": "y", "display": "y" }
                }]
            }
        }]))
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidCondition { ref name, .. } if name == "bad"));
    }

    #[test]
    fn null_comparisons_follow_whether_the_answer_exists() {
        let set = compile(json!([
            { "name": "hasNickname", "value": "nickname != null" },
            { "name": "noNickname", "value": "nickname == null" }
        ]))
        .unwrap();
        let blank = AnswerState::default();
        assert!(!set.evaluate("hasNickname", &blank).unwrap());
        assert!(set.evaluate("noNickname", &blank).unwrap());

        let answered = state(json!({ "nickname": "Ada" }));
        assert!(set.evaluate("hasNickname", &answered).unwrap());
        assert!(!set.evaluate("noNickname", &answered).unwrap());
    }
}
