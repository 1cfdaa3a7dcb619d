//! WebSocket wire protocol
//!
//! Every frame in either direction is a JSON object tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::records::{Record, RecordPatch};

/// Messages a device may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    RegisterDevice {
        #[serde(default)]
        device_type: Option<String>,
    },
    SyncRequest,
    SyncOfflineQueue {
        #[serde(default)]
        operations: Vec<QueuedOperation>,
    },
    ComputeRequest {
        record_id: String,
    },
}

impl ClientMessage {
    /// Parse one text frame
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AppError::InvalidMessage(e.to_string()))
    }
}

/// Types of buffered offline operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    /// Anything else; fails on its own without rejecting the batch
    #[serde(other)]
    Unknown,
}

/// One operation a device buffered while offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineOperation {
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    /// Required for update and delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RecordPatch>,
}

impl OfflineOperation {
    pub fn create(data: RecordPatch) -> Self {
        Self {
            operation_type: OperationType::Create,
            record_id: None,
            data: Some(data),
        }
    }

    pub fn update(record_id: impl Into<String>, data: RecordPatch) -> Self {
        Self {
            operation_type: OperationType::Update,
            record_id: Some(record_id.into()),
            data: Some(data),
        }
    }

    pub fn delete(record_id: impl Into<String>) -> Self {
        Self {
            operation_type: OperationType::Delete,
            record_id: Some(record_id.into()),
            data: None,
        }
    }
}

/// One entry of an offline queue as it arrived.
///
/// Entries are decoded one by one so a malformed entry fails on its own
/// instead of rejecting the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueuedOperation {
    Valid(OfflineOperation),
    Malformed(serde_json::Value),
}

impl QueuedOperation {
    /// The decoded operation, or why it could not be decoded
    pub fn decode(self) -> std::result::Result<OfflineOperation, String> {
        match self {
            QueuedOperation::Valid(operation) => Ok(operation),
            QueuedOperation::Malformed(raw) => match serde_json::from_value(raw) {
                Ok(operation) => Ok(operation),
                Err(e) => Err(format!("malformed operation: {}", e)),
            },
        }
    }
}

impl From<OfflineOperation> for QueuedOperation {
    fn from(operation: OfflineOperation) -> Self {
        QueuedOperation::Valid(operation)
    }
}

/// Payload of `data_created`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedData {
    pub id: String,
    pub title: Option<String>,
    pub value: f64,
    pub version: i64,
}

/// Payload of `data_updated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedData {
    pub id: String,
    pub title: Option<String>,
    pub value: f64,
    pub computed_result: Option<f64>,
    pub version: i64,
}

impl From<&Record> for CreatedData {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            value: record.value,
            version: record.version,
        }
    }
}

impl From<&Record> for UpdatedData {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            value: record.value,
            computed_result: record.computed_result,
            version: record.version,
        }
    }
}

/// Events the server pushes to devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    DeviceStatus {
        connected_devices: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    SyncResponse {
        records: Vec<Record>,
        server_time: DateTime<Utc>,
    },
    DataCreated {
        data: CreatedData,
        timestamp: DateTime<Utc>,
    },
    DataUpdated {
        data: UpdatedData,
        timestamp: DateTime<Utc>,
    },
    DataDeleted {
        record_id: String,
        timestamp: DateTime<Utc>,
    },
    ComputeResult {
        record_id: String,
        result: f64,
        version: i64,
        timestamp: DateTime<Utc>,
    },
    /// Sent only to the device whose message was rejected
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &AppError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Serialize into one text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of this event
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::DeviceStatus { .. } => "device_status",
            ServerEvent::SyncResponse { .. } => "sync_response",
            ServerEvent::DataCreated { .. } => "data_created",
            ServerEvent::DataUpdated { .. } => "data_updated",
            ServerEvent::DataDeleted { .. } => "data_deleted",
            ServerEvent::ComputeResult { .. } => "compute_result",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_register_device() {
        let msg = ClientMessage::parse(r#"{"type":"register_device","device_type":"mobile"}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::RegisterDevice {
                device_type: Some("mobile".to_string())
            }
        );
    }

    #[test]
    fn test_parse_sync_request_ignores_extra_fields() {
        let msg = ClientMessage::parse(r#"{"type":"sync_request","since":3}"#).unwrap();
        assert_eq!(msg, ClientMessage::SyncRequest);
    }

    #[test]
    fn test_parse_offline_queue() {
        let raw = json!({
            "type": "sync_offline_queue",
            "operations": [
                {"type": "create", "data": {"title": "a", "value": 4}},
                {"type": "update", "record_id": "r1", "data": {"value": 9}},
                {"type": "delete", "record_id": "r2"},
                {"type": "rename", "record_id": "r3"}
            ]
        });

        let msg = ClientMessage::parse(&raw.to_string()).unwrap();
        let ClientMessage::SyncOfflineQueue { operations } = msg else {
            panic!("expected offline queue");
        };

        let operations: Vec<OfflineOperation> = operations
            .into_iter()
            .map(|op| op.decode().unwrap())
            .collect();

        assert_eq!(operations.len(), 4);
        assert_eq!(operations[0].operation_type, OperationType::Create);
        assert_eq!(operations[0].data.as_ref().unwrap().value, Some(4.0));
        assert_eq!(operations[1].record_id.as_deref(), Some("r1"));
        assert!(operations[2].data.is_none());
        assert_eq!(operations[3].operation_type, OperationType::Unknown);
    }

    #[test]
    fn test_parse_offline_queue_keeps_malformed_items() {
        let raw = json!({
            "type": "sync_offline_queue",
            "operations": [
                {"type": "create", "data": {"title": "a", "value": 1}},
                {"type": "update", "record_id": "r1", "data": {"value": "oops"}},
                {"record_id": "r2"},
                {"type": "delete", "record_id": "r3"}
            ]
        });

        let ClientMessage::SyncOfflineQueue { operations } =
            ClientMessage::parse(&raw.to_string()).unwrap()
        else {
            panic!("expected offline queue");
        };

        assert_eq!(operations.len(), 4);
        assert!(matches!(operations[0], QueuedOperation::Valid(_)));
        assert!(matches!(operations[1], QueuedOperation::Malformed(_)));
        assert!(matches!(operations[2], QueuedOperation::Malformed(_)));
        assert_eq!(
            operations[3],
            QueuedOperation::Valid(OfflineOperation::delete("r3"))
        );

        let err = operations[1].clone().decode().unwrap_err();
        assert!(err.contains("expected f64"), "{}", err);
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err = ClientMessage::parse(r#"{"type":"launch_rockets"}"#).unwrap_err();
        assert!(matches!(err, AppError::InvalidMessage(_)));
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let err = ClientMessage::parse(r#"{"type":"compute_request"}"#).unwrap_err();
        assert!(matches!(err, AppError::InvalidMessage(_)));
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn test_event_wire_shape() {
        let event = ServerEvent::DataDeleted {
            record_id: "r1".to_string(),
            timestamp: Utc::now(),
        };
        let value: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "data_deleted");
        assert_eq!(value["record_id"], "r1");
        assert!(value["timestamp"].is_string());
        assert_eq!(event.kind(), "data_deleted");
    }

    #[test]
    fn test_error_event() {
        let event = ServerEvent::error(&AppError::InvalidMessage("bad".to_string()));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "invalid_message");
    }
}
