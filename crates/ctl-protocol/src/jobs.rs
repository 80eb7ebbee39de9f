use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Lifecycle status of a job execution on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Rejected,
    Canceled,
    TimedOut,
    Removed,
}

/// Status update published on `jobs/{job_id}/update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReply {
    pub status: JobStatus,
    /// Always sent; null goes out as `{}`.
    #[serde(default, serialize_with = "details_or_empty")]
    pub status_details: Value,
    pub expected_version: u64,
}

fn details_or_empty<S: Serializer>(details: &Value, serializer: S) -> Result<S::Ok, S::Error> {
    match details {
        Value::Null => Map::new().serialize(serializer),
        other => other.serialize(serializer),
    }
}

/// Body of `jobs/start-next`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartNextRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_in_minutes: Option<u32>,
}

/// Body of `jobs/{job_id}/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeJobRequest {
    pub include_job_document: bool,
}

/// The `execution` object of start-next/accepted and `{id}/get/accepted`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecution {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub version_number: Option<u64>,
    #[serde(default)]
    pub job_document: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobExecutionResponse {
    #[serde(default)]
    pub execution: Option<JobExecution>,
}
