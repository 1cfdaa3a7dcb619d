//! Domain events produced by record mutations
//!
//! Store calls return plain records; wrapping the result in a `RecordChange`
//! turns it into something the hub can dispatch, keeping the store free of
//! any transport concerns.

use chrono::Utc;

use super::protocol::ServerEvent;
use crate::records::Record;

/// One successful mutation of the record set
#[derive(Debug, Clone, PartialEq)]
pub enum RecordChange {
    Created(Record),
    Updated(Record),
    Deleted { record_id: String },
    Computed(Record),
}

impl RecordChange {
    pub fn record_id(&self) -> &str {
        match self {
            RecordChange::Created(r) | RecordChange::Updated(r) | RecordChange::Computed(r) => {
                &r.id
            }
            RecordChange::Deleted { record_id } => record_id,
        }
    }

    /// Outbound event announcing this change to other devices
    pub fn to_event(&self) -> ServerEvent {
        match self {
            RecordChange::Created(record) => ServerEvent::DataCreated {
                data: record.into(),
                timestamp: record.created_at,
            },
            RecordChange::Updated(record) => ServerEvent::DataUpdated {
                data: record.into(),
                timestamp: record.updated_at,
            },
            RecordChange::Deleted { record_id } => ServerEvent::DataDeleted {
                record_id: record_id.clone(),
                timestamp: Utc::now(),
            },
            RecordChange::Computed(record) => ServerEvent::ComputeResult {
                record_id: record.id.clone(),
                result: record.computed_result.unwrap_or_default(),
                version: record.version,
                timestamp: record.updated_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_event_carries_version() {
        let record = Record::new(Some("t".to_string()), 16.0);
        let event = RecordChange::Created(record.clone()).to_event();

        let ServerEvent::DataCreated { data, timestamp } = event else {
            panic!("expected data_created");
        };
        assert_eq!(data.id, record.id);
        assert_eq!(data.version, 1);
        assert_eq!(timestamp, record.created_at);
    }

    #[test]
    fn test_computed_event() {
        let mut record = Record::new(None, 16.0);
        record.compute();
        record.bump_version();

        let change = RecordChange::Computed(record.clone());
        assert_eq!(change.record_id(), record.id);

        match change.to_event() {
            ServerEvent::ComputeResult {
                result, version, ..
            } => {
                assert_eq!(result, 400.0);
                assert_eq!(version, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
