//! Record data types
//!
//! Defines the versioned record that every device mirrors, plus the
//! partial field sets used to create and patch it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A versioned unit of synchronized state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-generated identifier, immutable after creation
    pub id: String,
    pub title: Option<String>,
    pub value: f64,
    /// Populated only by a compute operation
    pub computed_result: Option<f64>,
    /// Starts at 1, incremented by exactly 1 on every mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Create a fresh record at version 1
    pub fn new(title: Option<String>, value: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            value,
            computed_result: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy the fields present in `patch`, leaving the rest untouched
    pub fn apply_patch(&mut self, patch: &RecordPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(value) = patch.value {
            self.value = value;
        }
        if let Some(result) = patch.computed_result {
            self.computed_result = Some(result);
        }
    }

    /// Derive `computed_result` from `value`
    pub fn compute(&mut self) {
        self.computed_result = Some(self.value.abs().sqrt() * 100.0);
    }

    /// Record one mutation: next version, fresh timestamp.
    ///
    /// `updated_at` never moves backwards even if the wall clock does.
    pub fn bump_version(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

/// Fields accepted when creating a record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(default)]
    pub title: Option<String>,
    /// Missing values are stored as 0 rather than rejected
    #[serde(default)]
    pub value: Option<f64>,
}

impl NewRecord {
    pub fn new(title: impl Into<String>, value: f64) -> Self {
        Self {
            title: Some(title.into()),
            value: Some(value),
        }
    }
}

/// Partial field set applied by an update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Absent keeps the title; an explicit `null` clears it
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_result: Option<f64>,
}

impl RecordPatch {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn title(title: Option<&str>) -> Self {
        Self {
            title: Some(title.map(str::to_string)),
            ..Default::default()
        }
    }
}

/// Distinguish a present `null` from a missing field
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl From<RecordPatch> for NewRecord {
    fn from(patch: RecordPatch) -> Self {
        Self {
            title: patch.title.flatten(),
            value: patch.value,
        }
    }
}
