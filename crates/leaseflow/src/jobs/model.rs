use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A job row exactly as the durable store holds it.
///
/// `reserved_at` is an empty string while the job is available. Once a
/// worker leases the job it holds an RFC 3339 timestamp, and the lease lasts
/// until `reserved_at + lease_timeout`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub payload: Value,
    pub attempts: i32,
    pub reserved_at: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub description: String,
    pub payload: Value,
}

impl NewJob {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            payload,
        }
    }

    /// A job whose payload is the given envelope.
    pub fn typed(name: impl Into<String>, payload: JobPayload) -> Self {
        Self::new(name, payload.into())
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The envelope every persisted payload must follow.
///
/// ```json
/// { "type": "export.csv", "data": { ... }, "options": { ... } }
/// ```
///
/// Enqueuers build payloads with it; the processor checks stored payloads
/// field by field so each defect gets its own [`JobError`](crate::jobs::JobError).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl JobPayload {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            data: None,
            options: None,
        }
    }

    /// Sets `data`. Fails unless `data` serializes to a JSON object.
    pub fn with_data(mut self, data: impl Serialize) -> Result<Self, serde_json::Error> {
        self.data = Some(to_object("data", data)?);
        Ok(self)
    }

    /// Sets `options`. Fails unless `options` serializes to a JSON object.
    pub fn with_options(mut self, options: impl Serialize) -> Result<Self, serde_json::Error> {
        self.options = Some(to_object("options", options)?);
        Ok(self)
    }
}

impl From<JobPayload> for Value {
    fn from(payload: JobPayload) -> Self {
        let mut envelope = Map::new();
        envelope.insert("type".to_string(), Value::String(payload.job_type));
        if let Some(data) = payload.data {
            envelope.insert("data".to_string(), Value::Object(data));
        }
        if let Some(options) = payload.options {
            envelope.insert("options".to_string(), Value::Object(options));
        }
        Value::Object(envelope)
    }
}

fn to_object(member: &str, value: impl Serialize) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "`{member}` must be a JSON object, got {other}"
        ))),
    }
}

/// A validated, typed view of a [`JobRecord`], built for one processing
/// attempt and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct JobData {
    pub id: String,
    pub name: String,
    pub description: String,
    pub job_type: String,
    pub payload: Map<String, Value>,
    pub attempts: i32,
    pub reserved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobData {
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.payload.get("data").and_then(Value::as_object)
    }

    pub fn options(&self) -> Option<&Map<String, Value>> {
        self.payload.get("options").and_then(Value::as_object)
    }

    /// Decodes the `data` member into the handler's own type. A missing
    /// member decodes as an empty object.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        decode_member(self.data())
    }

    /// Decodes the `options` member, see [`JobData::data_as`].
    pub fn options_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        decode_member(self.options())
    }
}

fn decode_member<T: DeserializeOwned>(
    member: Option<&Map<String, Value>>,
) -> Result<T, serde_json::Error> {
    let value = member.cloned().map(Value::Object).unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(value)
}

/// Lifecycle of a single job inside [`JobProcessor::process_job`](crate::jobs::JobProcessor::process_job).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Validating,
    Reserving,
    Dispatching,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Validating => "validating",
            JobState::Reserving => "reserving",
            JobState::Dispatching => "dispatching",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
