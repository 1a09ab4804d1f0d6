//! Value comparison for condition operators.
//!
//! Answer values arrive as loosely typed JSON: numbers may be stored as
//! strings, yes/no answers as booleans or `"true"`, dates as ISO strings.
//! Comparisons coerce both sides the same way so a condition written
//! against `"18"` matches a stored `18`.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time};

use super::{Direction, Operator, RelativeOffset, TimeUnit};

/// Evaluate `left op right`. A missing or null left value equals only
/// `null`; otherwise it satisfies just the negative operators.
pub fn compare(left: Option<&Value>, op: Operator, right: &Value) -> bool {
    let left = match (left, op) {
        (Some(Value::Null) | None, Operator::Is) => return right.is_null(),
        (Some(Value::Null) | None, Operator::IsNot) => return !right.is_null(),
        (Some(Value::Null) | None, _) => return op.is_negative(),
        (Some(v), _) => v,
    };

    match op {
        Operator::Is => loosely_equal(left, right),
        Operator::IsNot => !loosely_equal(left, right),
        Operator::IsLongerThan => length_check(left, right, Ordering::Greater),
        Operator::IsShorterThan => length_check(left, right, Ordering::Less),
        Operator::HasLength => length_check(left, right, Ordering::Equal),
        Operator::Contains => contains(left, right),
        Operator::DoesNotContain => !contains(left, right),
        Operator::IsMoreThan
        | Operator::IsLessThan
        | Operator::IsAtLeast
        | Operator::IsAtMost => numeric_order(left, right)
            .or_else(|| temporal_order(left, right))
            .is_some_and(|ordering| op.accepts(ordering)),
        Operator::IsBefore | Operator::IsAfter | Operator::IsAtOrBefore | Operator::IsAtOrAfter => {
            temporal_order(left, right)
                .or_else(|| numeric_order(left, right))
                .is_some_and(|ordering| op.accepts(ordering))
        }
    }
}

/// Compare a date, time or date-time answer against `now` shifted by a
/// relative offset.
pub fn compare_relative(
    value: Option<&Value>,
    op: Operator,
    offset: &RelativeOffset,
    now: OffsetDateTime,
) -> bool {
    let Some(text) = value.and_then(Value::as_str) else {
        return op.is_negative();
    };
    let amount = match offset.direction {
        Direction::Past => offset.period.checked_neg(),
        Direction::Future => Some(offset.period),
    };
    let Some(target) = amount.and_then(|amount| shift(now, amount, offset.unit)) else {
        return false;
    };

    let ordering = if offset.time_only {
        parse_time(text).map(|t| t.cmp(&target.time()))
    } else {
        match parse_temporal(text) {
            Some(Temporal::Date(d)) => Some(d.cmp(&target.date())),
            Some(Temporal::DateTime(dt)) => {
                Some(dt.cmp(&PrimitiveDateTime::new(target.date(), target.time())))
            }
            Some(Temporal::Time(t)) => Some(t.cmp(&target.time())),
            None => None,
        }
    };
    ordering.is_some_and(|ordering| op.accepts(ordering))
}

/// Truthiness used by bare field references in expressions.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty() && s != "false",
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

pub fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    if let (Some(a), Some(b)) = (as_decimal(left), as_decimal(right)) {
        return a == b;
    }
    if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
        if let (Some(a), Some(b)) = (as_bool(left), as_bool(right)) {
            return a == b;
        }
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        if let (Some(x), Some(y)) = (parse_temporal(a), parse_temporal(b)) {
            return temporal_cmp(&x, &y) == Some(Ordering::Equal);
        }
    }
    false
}

fn contains(left: &Value, right: &Value) -> bool {
    match left {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, right)),
        Value::String(s) => match right {
            Value::String(needle) => s.contains(needle.as_str()),
            other => s.contains(&other.to_string()),
        },
        other => loosely_equal(other, right),
    }
}

fn length_check(left: &Value, right: &Value, expected: Ordering) -> bool {
    let len = match left {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Number(n) => n.to_string().chars().count(),
        _ => return false,
    };
    let Some(limit) = as_decimal(right) else {
        return false;
    };
    Decimal::from(len).cmp(&limit) == expected
}

fn numeric_order(left: &Value, right: &Value) -> Option<Ordering> {
    Some(as_decimal(left)?.cmp(&as_decimal(right)?))
}

fn temporal_order(left: &Value, right: &Value) -> Option<Ordering> {
    let left = parse_temporal(left.as_str()?)?;
    let right = parse_temporal(right.as_str()?)?;
    temporal_cmp(&left, &right)
}

// ── Dates and times ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(Date),
    DateTime(PrimitiveDateTime),
    Time(Time),
}

fn temporal_cmp(left: &Temporal, right: &Temporal) -> Option<Ordering> {
    match (left, right) {
        (Temporal::Date(a), Temporal::Date(b)) => Some(a.cmp(b)),
        (Temporal::DateTime(a), Temporal::DateTime(b)) => Some(a.cmp(b)),
        (Temporal::Time(a), Temporal::Time(b)) => Some(a.cmp(b)),
        (Temporal::Date(a), Temporal::DateTime(b)) => Some(a.cmp(&b.date())),
        (Temporal::DateTime(a), Temporal::Date(b)) => Some(a.date().cmp(b)),
        _ => None,
    }
}

pub fn parse_date(text: &str) -> Option<Date> {
    Date::parse(text.trim(), format_description!("[year]-[month]-[day]")).ok()
}

pub fn parse_time(text: &str) -> Option<Time> {
    let text = text.trim();
    Time::parse(text, format_description!("[hour]:[minute]:[second]"))
        .or_else(|_| Time::parse(text, format_description!("[hour]:[minute]")))
        .ok()
}

pub fn parse_datetime(text: &str) -> Option<PrimitiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339) {
        return Some(PrimitiveDateTime::new(dt.date(), dt.time()));
    }
    PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(text, format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    })
    .ok()
}

pub fn parse_temporal(text: &str) -> Option<Temporal> {
    parse_date(text)
        .map(Temporal::Date)
        .or_else(|| parse_datetime(text).map(Temporal::DateTime))
        .or_else(|| parse_time(text).map(Temporal::Time))
}

/// Shift an instant by a signed number of units. Month and year shifts
/// clamp the day to the end of the target month (31 Jan + 1 month is
/// 28 or 29 Feb). `None` when the result is out of range.
pub fn shift(now: OffsetDateTime, amount: i64, unit: TimeUnit) -> Option<OffsetDateTime> {
    let seconds_per_unit = match unit {
        TimeUnit::Minutes => 60,
        TimeUnit::Hours => 3_600,
        TimeUnit::Days => 86_400,
        TimeUnit::Weeks => 604_800,
        TimeUnit::Months => return shift_months(now, amount),
        TimeUnit::Years => return shift_months(now, amount.checked_mul(12)?),
    };
    let seconds = amount.checked_mul(seconds_per_unit)?;
    now.checked_add(Duration::seconds(seconds))
}

fn shift_months(now: OffsetDateTime, months: i64) -> Option<OffsetDateTime> {
    let index = (i64::from(now.year()) * 12 + i64::from(u8::from(now.month())) - 1)
        .checked_add(months)?;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(index.rem_euclid(12) + 1).ok()?).ok()?;
    let day = now.day().min(month.length(year));
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(now.replace_date(date))
}
