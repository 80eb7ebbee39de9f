use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound shadow update: `{"state":{"reported": ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowUpdate {
    pub state: ReportedState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedState {
    pub reported: Value,
}

impl ShadowUpdate {
    pub fn reported(reported: Value) -> Self {
        Self {
            state: ReportedState { reported },
        }
    }
}

/// Desired/reported pair carried by get/accepted, update/accepted and
/// each side of an update/documents message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowState {
    #[serde(default)]
    pub desired: Option<Value>,
    #[serde(default)]
    pub reported: Option<Value>,
}

/// Body of a get/accepted or update/accepted reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowDocument {
    #[serde(default)]
    pub state: ShadowState,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowSnapshot {
    #[serde(default)]
    pub state: ShadowState,
}

/// Body of an update/documents message: the full document before and after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowDocuments {
    #[serde(default)]
    pub previous: Option<ShadowSnapshot>,
    #[serde(default)]
    pub current: ShadowSnapshot,
}

/// Body of a get/rejected or update/rejected reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowError {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// True for an object with at least one field.
pub fn is_non_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|o| !o.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_wraps_reported() {
        let update = ShadowUpdate::reported(json!({"led": true}));
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, json!({"state": {"reported": {"led": true}}}));
    }

    #[test]
    fn document_without_desired() {
        let doc: ShadowDocument =
            serde_json::from_value(json!({"state": {"reported": {"a": 1}}, "version": 3}))
                .unwrap();
        assert!(doc.state.desired.is_none());
        assert_eq!(doc.state.reported.unwrap()["a"], 1);
        assert_eq!(doc.version, Some(3));
    }

    #[test]
    fn documents_current_side() {
        let docs: ShadowDocuments = serde_json::from_value(json!({
            "previous": {"state": {"desired": {"a": 1}}},
            "current": {"state": {"desired": {"a": 2}, "reported": {"a": 1}}},
            "timestamp": 1700000000
        }))
        .unwrap();
        assert_eq!(docs.current.state.desired.unwrap()["a"], 2);
    }

    #[test]
    fn empty_objects_are_not_desired_state() {
        assert!(!is_non_empty_object(&json!({})));
        assert!(!is_non_empty_object(&json!(null)));
        assert!(!is_non_empty_object(&json!([1])));
        assert!(is_non_empty_object(&json!({"a": 1})));
    }
}
