//! MeterInsight response normalization
//!
//! The usage endpoints do not agree on a shape: values are either flat or
//! nested under `flatRate`, and the interval end shows up as `endDate`,
//! `end_date` or `intervalEnd`, as ISO-8601 text or a bare epoch.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::{PortalError, UsageDatapoint};

const FLAT_RATE_KEYS: &[&str] = &["flatRate", "flatrate"];
const INTERVAL_END_KEYS: &[&str] = &["endDate", "end_date", "intervalEnd"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Raw datapoints from either `{"data": [...]}` or a bare list
pub fn extract_datapoints(payload: Value) -> Result<Vec<Value>, PortalError> {
    match payload {
        Value::Array(points) => Ok(points),
        Value::Object(mut object) if object.contains_key("data") => {
            match object.remove("data") {
                Some(Value::Array(points)) => Ok(points),
                _ => Ok(Vec::new()),
            }
        }
        Value::Object(_) => Err(PortalError::UnexpectedFormat(
            "object without a data key".to_string(),
        )),
        other => Err(PortalError::UnexpectedFormat(json_type(&other).to_string())),
    }
}

/// Normalize one raw datapoint; `None` means skip it
pub fn normalize_datapoint(point: &Value) -> Option<UsageDatapoint> {
    let object = point.as_object()?;

    let values = FLAT_RATE_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find(|value| is_truthy(value))
        .and_then(Value::as_object)
        .unwrap_or(object);

    let interval_end = INTERVAL_END_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find(|value| is_truthy(value))
        .and_then(parse_interval_end)?;

    Some(UsageDatapoint {
        consumption: number_or_zero(values.get("consumption")),
        cost: number_or_zero(values.get("cost")),
        interval_end,
    })
}

/// One-level unwrap of a `data` envelope
pub fn unwrap_bill_projection(payload: Value) -> Value {
    match payload {
        Value::Object(mut object) => match object.remove("data") {
            Some(data) if is_truthy(&data) => data,
            Some(data) => {
                object.insert("data".to_string(), data);
                Value::Object(object)
            }
            None => Value::Object(object),
        },
        other => other,
    }
}

fn parse_interval_end(value: &Value) -> Option<i64> {
    match value {
        Value::String(text) => parse_iso_timestamp(text).or_else(|| parse_epoch(text)),
        Value::Number(number) => number.as_f64().and_then(truncate_epoch),
        _ => None,
    }
}

fn parse_iso_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    let with_offset = text.replace('Z', "+00:00");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&with_offset) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(&with_offset, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.timestamp());
    }

    // No offset: read as UTC
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

fn parse_epoch(text: &str) -> Option<i64> {
    text.trim().parse::<f64>().ok().and_then(truncate_epoch)
}

fn truncate_epoch(value: f64) -> Option<i64> {
    if value.is_finite() && value.abs() < i64::MAX as f64 {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

fn number_or_zero(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(object) => !object.is_empty(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
