use serde_json::Value as JsonValue;

use super::error::AggregationError;
use super::types::Options;

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn present<'a>(options: &'a Options, key: &str) -> Option<&'a JsonValue> {
    options.get(key).filter(|value| !value.is_null())
}

pub(crate) fn get_bool(
    options: &Options,
    owner: &'static str,
    option: &'static str,
) -> Result<Option<bool>, AggregationError> {
    match present(options, option) {
        None => Ok(None),
        Some(JsonValue::Bool(value)) => Ok(Some(*value)),
        Some(other) => Err(AggregationError::TypeMismatch {
            owner,
            option,
            expected: "a boolean",
            found: json_kind(other),
        }),
    }
}

pub(crate) fn get_f64(
    options: &Options,
    owner: &'static str,
    option: &'static str,
) -> Result<Option<f64>, AggregationError> {
    match present(options, option) {
        None => Ok(None),
        Some(JsonValue::Number(number)) => number.as_f64().map(Some).ok_or(
            AggregationError::InvalidOption {
                owner,
                option,
                value: number.to_string(),
            },
        ),
        Some(other) => Err(AggregationError::TypeMismatch {
            owner,
            option,
            expected: "a number",
            found: json_kind(other),
        }),
    }
}

pub(crate) fn get_str<'a>(
    options: &'a Options,
    owner: &'static str,
    option: &'static str,
) -> Result<Option<&'a str>, AggregationError> {
    match present(options, option) {
        None => Ok(None),
        Some(JsonValue::String(value)) => Ok(Some(value.as_str())),
        Some(other) => Err(AggregationError::TypeMismatch {
            owner,
            option,
            expected: "a string",
            found: json_kind(other),
        }),
    }
}

/// Parses a duration given either as a humantime string (`"1m"`, `"1h 30m"`)
/// or as an integer number of nanoseconds. Returns nanoseconds.
pub(crate) fn parse_duration_nanos(value: &JsonValue) -> Result<i64, AggregationError> {
    let nanos = match value {
        JsonValue::String(raw) => {
            let duration = humantime::parse_duration(raw.trim())
                .map_err(|err| AggregationError::InvalidInterval(format!("{raw:?}: {err}")))?;
            i64::try_from(duration.as_nanos())
                .map_err(|_| AggregationError::InvalidInterval(format!("{raw:?} is too large")))?
        }
        JsonValue::Number(number) => number.as_i64().ok_or_else(|| {
            AggregationError::InvalidInterval(format!("{number} is not an integer nanosecond count"))
        })?,
        other => {
            return Err(AggregationError::InvalidInterval(format!(
                "expected a duration string or nanoseconds, got {}",
                json_kind(other)
            )))
        }
    };
    if nanos <= 0 {
        return Err(AggregationError::InvalidInterval(format!(
            "interval must be positive, got {nanos}ns"
        )));
    }
    Ok(nanos)
}

pub(crate) fn get_duration_nanos(
    options: &Options,
    option: &'static str,
) -> Result<Option<i64>, AggregationError> {
    present(options, option).map(parse_duration_nanos).transpose()
}
