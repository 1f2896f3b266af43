//! Turns an opaque [`JobRecord`] into a validated [`JobData`].

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::jobs::error::JobError;
use crate::jobs::model::{JobData, JobRecord};

/// Decodes the record's payload and extracts its `type` discriminator.
///
/// The payload may be stored as a JSON object or as a string holding one.
/// An unparsable `reserved_at` is read as "unreserved" rather than failing.
pub fn parse(record: &JobRecord) -> Result<JobData, JobError> {
    let payload = decode_payload(record)?;

    let job_type = payload
        .get("type")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| JobError::MissingType(record.id.clone()))?
        .to_string();

    Ok(JobData {
        id: record.id.clone(),
        name: record.name.clone(),
        description: record.description.clone(),
        job_type,
        payload,
        attempts: record.attempts,
        reserved_at: parse_reserved_at(&record.reserved_at),
        created_at: record.created,
        updated_at: record.updated,
    })
}

/// Rejects payloads whose optional `data` or `options` members are present
/// but not objects.
pub fn validate(id: &str, payload: &Map<String, Value>) -> Result<(), JobError> {
    for field in ["data", "options"] {
        if let Some(member) = payload.get(field) {
            if !member.is_object() {
                return Err(JobError::InvalidPayloadShape {
                    id: id.to_string(),
                    field,
                });
            }
        }
    }
    Ok(())
}

fn decode_payload(record: &JobRecord) -> Result<Map<String, Value>, JobError> {
    let malformed = |reason: String| JobError::MalformedPayload {
        id: record.id.clone(),
        reason,
    };

    match &record.payload {
        Value::Object(map) => Ok(map.clone()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(malformed(format!("expected an object, got {}", kind(&other)))),
            Err(err) => Err(malformed(err.to_string())),
        },
        other => Err(malformed(format!("expected an object, got {}", kind(other)))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Best-effort parse of a `reserved_at` column value.
///
/// Accepts RFC 3339 as well as the space-separated `YYYY-MM-DD HH:MM:SS.fffZ`
/// form some row stores emit. Anything else yields `None`.
pub fn parse_reserved_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|at| at.and_utc())
}

/// The canonical form written back on reservation. Fixed width, so rows
/// compare lexicographically in timestamp order.
pub fn format_reserved_at(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `reserved_at` is set and `now - reserved_at < lease_timeout`.
///
/// A reservation in the future (clock skew) counts as active.
pub fn lease_is_active(
    reserved_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lease_timeout: Duration,
) -> bool {
    let Some(reserved_at) = reserved_at else {
        return false;
    };
    match now.signed_duration_since(reserved_at).to_std() {
        Ok(elapsed) => elapsed < lease_timeout,
        Err(_) => true,
    }
}

/// When an active lease runs out.
pub fn lease_expires_at(reserved_at: DateTime<Utc>, lease_timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease_timeout)
        .ok()
        .and_then(|lease| reserved_at.checked_add_signed(lease))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
