use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal or intermediate status of a command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandExecutionStatus {
    InProgress,
    Succeeded,
    Failed,
    Rejected,
    TimedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReason {
    pub reason_code: String,
    pub reason_description: String,
}

/// Reply published on a command's response topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub status: CommandExecutionStatus,
    #[serde(default)]
    pub status_reason: StatusReason,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
}

impl CommandReply {
    pub fn succeeded(result: Value) -> Self {
        Self {
            status: CommandExecutionStatus::Succeeded,
            status_reason: StatusReason::default(),
            result,
        }
    }

    pub fn failed(reason_code: impl Into<String>, reason_description: impl Into<String>) -> Self {
        Self {
            status: CommandExecutionStatus::Failed,
            status_reason: StatusReason {
                reason_code: reason_code.into(),
                reason_description: reason_description.into(),
            },
            result: Value::Null,
        }
    }
}
