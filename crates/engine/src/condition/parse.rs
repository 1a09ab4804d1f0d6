//! Compile structured (designer) condition models.

use formflow_definition::{
    ConditionEntryDefinition, ConditionValue, FieldConditionDefinition, RelativeTimeValue,
};
use serde_json::Value;

use super::{Condition, Coordinator, Direction, Operand, Operator, RelativeOffset, TimeUnit};

pub(super) fn compile_model(entries: &[ConditionEntryDefinition]) -> Result<Condition, String> {
    let mut compiled = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let coordinator = match entry.coordinator() {
            Some(word) if index > 0 => Some(
                Coordinator::parse(word).ok_or_else(|| format!("unknown coordinator '{}'", word))?,
            ),
            _ => None,
        };
        let condition = match entry {
            ConditionEntryDefinition::Field(field) => compile_field(field)?,
            ConditionEntryDefinition::Ref(reference) => {
                Condition::Ref(reference.condition_name.clone())
            }
            ConditionEntryDefinition::Group(group) => compile_model(&group.conditions)?,
        };
        compiled.push((coordinator, condition));
    }
    Ok(Condition::coordinate(compiled))
}

fn compile_field(definition: &FieldConditionDefinition) -> Result<Condition, String> {
    let op = Operator::parse(&definition.operator)
        .ok_or_else(|| format!("unknown operator '{}'", definition.operator))?;
    let field = definition.field.name.clone();

    match &definition.value {
        ConditionValue::Static(value) => Ok(Condition::Compare {
            left: Operand::Field(field),
            op,
            right: Operand::Literal(Value::String(value.value.clone())),
        }),
        ConditionValue::RelativeTime(relative) => {
            if !op.is_ordering() {
                return Err(format!(
                    "operator '{}' cannot compare against a relative time",
                    op.as_str()
                ));
            }
            Ok(Condition::RelativeTime {
                field,
                op,
                offset: relative_offset(relative)?,
            })
        }
    }
}

/// Largest relative-time period accepted, in any unit.
const MAX_TIME_PERIOD: u64 = 100_000;

fn relative_offset(value: &RelativeTimeValue) -> Result<RelativeOffset, String> {
    let period = value
        .time_period
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("time period '{}' is not a whole number", value.time_period))?;
    if period.unsigned_abs() > MAX_TIME_PERIOD {
        return Err(format!(
            "time period '{}' is out of range (at most {})",
            value.time_period, MAX_TIME_PERIOD
        ));
    }
    let unit = TimeUnit::parse(&value.time_unit)
        .ok_or_else(|| format!("unknown time unit '{}'", value.time_unit))?;
    let direction = match value.direction.trim().to_ascii_lowercase().as_str() {
        "in the past" | "past" => Direction::Past,
        "in the future" | "future" => Direction::Future,
        other => return Err(format!("unknown direction '{}'", other)),
    };
    Ok(RelativeOffset {
        period,
        unit,
        direction,
        time_only: value.time_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(value: serde_json::Value) -> Vec<ConditionEntryDefinition> {
        serde_json::from_value(value).unwrap()
    }

    fn field(name: &str, operator: &str, value: &str, coordinator: Option<&str>) -> serde_json::Value {
        let mut entry = json!({
            "field": { "name": name, "type": "TextField", "display": name },
            "operator": operator,
            "value": { "type": "Value", "value": value, "display": value }
        });
        if let Some(c) = coordinator {
            entry["coordinator"] = json!(c);
        }
        entry
    }

    #[test]
    fn nested_groups_compile_in_order() {
        let compiled = compile_model(&entries(json!([
            field("a", "is", "1", None),
            {
                "coordinator": "or",
                "conditions": [
                    field("b", "is", "2", None),
                    field("c", "is not", "3", Some("and"))
                ]
            }
        ])))
        .unwrap();

        let compare = |name: &str, op, value: &str| Condition::Compare {
            left: Operand::Field(name.to_string()),
            op,
            right: Operand::Literal(json!(value)),
        };
        assert_eq!(
            compiled,
            Condition::Any(vec![
                compare("a", Operator::Is, "1"),
                Condition::All(vec![
                    compare("b", Operator::Is, "2"),
                    compare("c", Operator::IsNot, "3"),
                ]),
            ])
        );
    }

    #[test]
    fn coordinator_on_first_entry_is_ignored() {
        let compiled = compile_model(&entries(json!([field("a", "is", "1", Some("or"))]))).unwrap();
        assert!(matches!(compiled, Condition::Compare { .. }));
    }

    #[test]
    fn relative_time_needs_an_ordering_operator() {
        let err = compile_model(&entries(json!([{
            "field": { "name": "d", "type": "DateField", "display": "d" },
            "operator": "contains",
            "value": {
                "type": "RelativeTime",
                "timePeriod": "3",
                "timeUnit": "days",
                "direction": "in the future",
                "timeOnly": false
            }
        }])))
        .unwrap_err();
        assert!(err.contains("relative time"));
    }

    #[test]
    fn bad_time_period_is_rejected() {
        let err = compile_model(&entries(json!([{
            "field": { "name": "d", "type": "DateField", "display": "d" },
            "operator": "is before",
            "value": {
                "type": "RelativeTime",
                "timePeriod": "soon",
                "timeUnit": "days",
                "direction": "in the future",
                "timeOnly": false
            }
        }])))
        .unwrap_err();
        assert!(err.contains("soon"));
    }

    #[test]
    fn oversized_time_period_is_rejected_at_load() {
        for period in ["9223372036854775807", "-9223372036854775808", "100001"] {
            let err = compile_model(&entries(json!([{
                "field": { "name": "d", "type": "DateField", "display": "d" },
                "operator": "is before",
                "value": {
                    "type": "RelativeTime",
                    "timePeriod": period,
                    "timeUnit": "minutes",
                    "direction": "in the past",
                    "timeOnly": false
                }
            }])))
            .unwrap_err();
            assert!(err.contains("out of range"), "{}", err);
        }
        assert!(relative_offset(
            &serde_json::from_value(json!({
                "timePeriod": "100000",
                "timeUnit": "years",
                "direction": "in the future",
                "timeOnly": false
            }))
            .unwrap()
        )
        .is_ok());
    }
}
