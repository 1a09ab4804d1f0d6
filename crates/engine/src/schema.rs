//! Validation schemas built from component rules.
//!
//! A [`Schema`] is an ordered list of keys, each with a [`FieldRule`].
//! Validation never fails outright: it returns a [`ValidationOutcome`]
//! holding the coerced values and, when anything was wrong, every failing
//! key's error. Keys the schema does not know are dropped.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use time::{Date, Duration};

use formflow_storage::Fields;

use crate::condition::compare::{
    as_bool, as_decimal, loosely_equal, parse_date, parse_datetime, parse_time,
};

/// Inputs to validation that do not come from the payload.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub today: Date,
    pub error_title: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub value: Fields,
    pub errors: Option<FormSubmissionErrors>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmissionErrors {
    pub title_text: String,
    pub error_list: Vec<FieldError>,
}

impl FormSubmissionErrors {
    /// First error for a field or any of its parts (`dob__day`, `address.town`).
    pub fn for_field(&self, name: &str) -> Option<&FieldError> {
        self.error_list.iter().find(|e| {
            e.name == name
                || e.name.starts_with(&format!("{}__", name))
                || e.path.starts_with(&format!("{}.", name))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Dotted key path, e.g. `address.postcode`.
    pub path: String,
    /// Anchor of the offending input, e.g. `#address__postcode`.
    pub display_ref: String,
    /// Input name, e.g. `address__postcode`.
    pub name: String,
    pub message: String,
}

impl FieldError {
    pub fn new(segments: &[String], message: impl Into<String>) -> Self {
        let name = segments.join("__");
        Self {
            path: segments.join("."),
            display_ref: format!("#{}", name),
            name,
            message: message.into(),
        }
    }
}

// ── Rules ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Pattern {
    regex: regex::Regex,
    source: String,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: regex::Regex::new(source)?,
            source: source.to_string(),
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextRule {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub exact_length: Option<usize>,
    pub max_words: Option<usize>,
    pub email: bool,
    pub pattern: Option<Pattern>,
    /// Values whose whitespace-free, uppercased form starts with one of
    /// these are rejected as a pattern mismatch.
    pub forbidden_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NumberRule {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub precision: Option<u32>,
    pub integer: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DateRule {
    pub max_days_in_past: Option<u32>,
    pub max_days_in_future: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ChoiceRule {
    pub allowed: Vec<Value>,
    pub multiple: bool,
}

#[derive(Debug, Clone)]
pub enum FieldRule {
    Text(TextRule),
    Number(NumberRule),
    Boolean,
    Date(DateRule),
    Time,
    DateTime,
    Choice(ChoiceRule),
    Object(Schema),
}

#[derive(Debug, Clone)]
pub struct SchemaKey {
    pub name: String,
    /// Used in messages: `"Full name" is required`.
    pub label: String,
    pub required: bool,
    pub rule: FieldRule,
    /// Replaces every generated message for this key.
    pub custom_message: Option<String>,
}

impl SchemaKey {
    pub fn new(name: impl Into<String>, label: impl Into<String>, rule: FieldRule) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            required: true,
            rule,
            custom_message: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.custom_message = message;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    keys: Vec<SchemaKey>,
}

impl Schema {
    pub fn new(keys: Vec<SchemaKey>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[SchemaKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Validate every key (no early abort) and coerce values.
    pub fn validate(&self, input: &Fields, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        let mut errors = Vec::new();
        let value = self.validate_at(input, &[], ctx.today, &mut errors);
        ValidationOutcome {
            value,
            errors: if errors.is_empty() {
                None
            } else {
                Some(FormSubmissionErrors {
                    title_text: ctx.error_title.to_string(),
                    error_list: errors,
                })
            },
        }
    }

    fn validate_at(
        &self,
        input: &Fields,
        prefix: &[String],
        today: Date,
        errors: &mut Vec<FieldError>,
    ) -> Fields {
        let mut out = Fields::new();
        for key in &self.keys {
            let mut path = prefix.to_vec();
            path.push(key.name.clone());
            let before = errors.len();
            if let Some(value) = key.check(input.get(&key.name), &path, today, errors) {
                out.insert(key.name.clone(), value);
            }
            if let Some(message) = &key.custom_message {
                for error in &mut errors[before..] {
                    error.message = message.clone();
                }
            }
        }
        out
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

impl SchemaKey {
    fn check(
        &self,
        raw: Option<&Value>,
        path: &[String],
        today: Date,
        errors: &mut Vec<FieldError>,
    ) -> Option<Value> {
        if is_blank(raw) {
            if self.required {
                errors.push(FieldError::new(path, format!("\"{}\" is required", self.label)));
                return None;
            }
            return Some(Value::Null);
        }
        let raw = raw?;

        if let FieldRule::Object(schema) = &self.rule {
            let Value::Object(map) = raw else {
                errors.push(FieldError::new(
                    path,
                    format!("\"{}\" must be of type object", self.label),
                ));
                return None;
            };
            let nested: Fields = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let before = errors.len();
            let value = schema.validate_at(&nested, path, today, errors);
            if errors.len() > before {
                return None;
            }
            return Some(Value::Object(value.into_iter().collect()));
        }

        match self.check_scalar(raw, today) {
            Ok(value) => Some(value),
            Err(message) => {
                errors.push(FieldError::new(path, message));
                None
            }
        }
    }

    fn check_scalar(&self, raw: &Value, today: Date) -> Result<Value, String> {
        let label = &self.label;
        match &self.rule {
            FieldRule::Text(rule) => check_text(rule, raw, label),
            FieldRule::Number(rule) => check_number(rule, raw, label),
            FieldRule::Boolean => as_bool(raw)
                .map(Value::Bool)
                .ok_or_else(|| format!("\"{}\" must be a boolean", label)),
            FieldRule::Date(rule) => check_date(rule, raw, label, today),
            FieldRule::Time => raw
                .as_str()
                .and_then(parse_time)
                .map(|_| Value::String(raw.as_str().unwrap_or_default().trim().to_string()))
                .ok_or_else(|| format!("\"{}\" must be a valid time", label)),
            FieldRule::DateTime => raw
                .as_str()
                .and_then(parse_datetime)
                .map(|_| Value::String(raw.as_str().unwrap_or_default().trim().to_string()))
                .ok_or_else(|| format!("\"{}\" must be a valid date and time", label)),
            FieldRule::Choice(rule) => check_choice(rule, raw, label),
            FieldRule::Object(_) => Ok(raw.clone()),
        }
    }
}

fn check_text(rule: &TextRule, raw: &Value, label: &str) -> Result<Value, String> {
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return Err(format!("\"{}\" must be a string", label)),
    };
    let length = text.chars().count();

    if let Some(n) = rule.exact_length {
        if length != n {
            return Err(format!("\"{}\" length must be {} characters long", label, n));
        }
    }
    if let Some(n) = rule.min_length {
        if length < n {
            return Err(format!(
                "\"{}\" length must be at least {} characters long",
                label, n
            ));
        }
    }
    if let Some(n) = rule.max_length {
        if length > n {
            return Err(format!(
                "\"{}\" length must be less than or equal to {} characters long",
                label, n
            ));
        }
    }
    if let Some(n) = rule.max_words {
        if text.split_whitespace().count() > n {
            return Err(format!("\"{}\" must be {} words or fewer", label, n));
        }
    }
    if rule.email && !is_email(&text) {
        return Err(format!("\"{}\" must be a valid email", label));
    }
    if let Some(pattern) = &rule.pattern {
        let compact: String = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        let forbidden = rule
            .forbidden_prefixes
            .iter()
            .any(|prefix| compact.starts_with(prefix.as_str()));
        if forbidden || !pattern.is_match(&text) {
            return Err(format!(
                "\"{}\" with value \"{}\" fails to match the required pattern: {}",
                label, text, pattern.source
            ));
        }
    }
    Ok(Value::String(text))
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !text.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

fn check_number(rule: &NumberRule, raw: &Value, label: &str) -> Result<Value, String> {
    let number = as_decimal(raw).ok_or_else(|| format!("\"{}\" must be a number", label))?;
    if rule.integer && !number.fract().is_zero() {
        return Err(format!("\"{}\" must be an integer", label));
    }
    if let Some(precision) = rule.precision {
        if number.normalize().scale() > precision {
            return Err(format!(
                "\"{}\" must have no more than {} decimal places",
                label, precision
            ));
        }
    }
    if let Some(min) = rule.min {
        if number < min {
            return Err(format!(
                "\"{}\" must be greater than or equal to {}",
                label, min
            ));
        }
    }
    if let Some(max) = rule.max {
        if number > max {
            return Err(format!("\"{}\" must be less than or equal to {}", label, max));
        }
    }
    Ok(decimal_to_value(number))
}

pub fn decimal_to_value(number: Decimal) -> Value {
    if number.fract().is_zero() {
        if let Some(i) = number.to_i64() {
            return Value::from(i);
        }
    }
    number
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(number.to_string()))
}

fn check_date(rule: &DateRule, raw: &Value, label: &str, today: Date) -> Result<Value, String> {
    let date = raw
        .as_str()
        .and_then(parse_date)
        .ok_or_else(|| format!("\"{}\" must be a valid date", label))?;
    if let Some(days) = rule.max_days_in_past {
        if let Some(earliest) = today.checked_sub(Duration::days(i64::from(days))) {
            if date < earliest {
                return Err(format!("\"{}\" must be on or after {}", label, earliest));
            }
        }
    }
    if let Some(days) = rule.max_days_in_future {
        if let Some(latest) = today.checked_add(Duration::days(i64::from(days))) {
            if date > latest {
                return Err(format!("\"{}\" must be on or before {}", label, latest));
            }
        }
    }
    Ok(Value::String(date.to_string()))
}

fn check_choice(rule: &ChoiceRule, raw: &Value, label: &str) -> Result<Value, String> {
    let pick = |candidate: &Value| {
        rule.allowed
            .iter()
            .find(|allowed| loosely_equal(allowed, candidate))
            .cloned()
    };
    let not_allowed = || {
        let options: Vec<String> = rule
            .allowed
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        format!("\"{}\" must be one of [{}]", label, options.join(", "))
    };

    if rule.multiple {
        let candidates: Vec<&Value> = match raw {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        let picked: Option<Vec<Value>> = candidates.into_iter().map(pick).collect();
        picked.map(Value::Array).ok_or_else(not_allowed)
    } else {
        pick(raw).ok_or_else(not_allowed)
    }
}
