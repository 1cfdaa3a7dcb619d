//! Record CRUD endpoints
//!
//! Thin wrappers over the record store. Every successful mutation is
//! broadcast to all connected devices; REST callers have no device id to
//! exclude.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::records::{NewRecord, Record, RecordPatch};
use crate::state::AppState;
use crate::sync::RecordChange;

/// Create the records router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/:record_id", put(update_record).delete(delete_record))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordList {
    pub records: Vec<Record>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
    pub version: i64,
}

/// Update body: any subset of fields plus the version the client last saw
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(flatten)]
    pub patch: RecordPatch,
    /// `0` or absent skips the conflict check
    #[serde(default)]
    pub version: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub version: i64,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// List every record
async fn list_records(State(state): State<AppState>) -> Result<Json<RecordList>> {
    let records = state.store().list_all().await?;
    Ok(Json(RecordList { records }))
}

/// Create a record
async fn create_record(
    State(state): State<AppState>,
    Json(new): Json<NewRecord>,
) -> Result<Json<CreateResponse>> {
    let record = state.store().create(new).await?;
    let response = CreateResponse {
        id: record.id.clone(),
        version: record.version,
    };

    publish(&state, RecordChange::Created(record)).await;
    Ok(Json(response))
}

/// Update a record, rejecting stale versions
async fn update_record(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>> {
    let record = state
        .store()
        .conditional_update(&record_id, &req.patch, req.version)
        .await?;
    let response = UpdateResponse {
        version: record.version,
        status: "updated".to_string(),
    };

    publish(&state, RecordChange::Updated(record)).await;
    Ok(Json(response))
}

/// Delete a record
async fn delete_record(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    state.store().delete(&record_id).await?;

    publish(&state, RecordChange::Deleted { record_id }).await;
    Ok(Json(StatusResponse {
        status: "deleted".to_string(),
    }))
}

/// Fan a change out to every device; delivery problems never fail the request
async fn publish(state: &AppState, change: RecordChange) {
    if let Err(e) = state.hub().broadcast(&change.to_event(), None).await {
        tracing::warn!(record_id = %change.record_id(), "Failed to broadcast change: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::records::MemoryBackend;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn server() -> (TestServer, AppState) {
        let state = AppState::new(Config::default(), Arc::new(MemoryBackend::new()));
        let app = Router::new()
            .nest("/api/data", router())
            .with_state(state.clone());
        (TestServer::new(app).unwrap(), state)
    }

    #[tokio::test]
    async fn test_version_conflict_scenario() {
        let (server, _state) = server();

        let created: CreateResponse = server
            .post("/api/data")
            .json(&json!({"title": "t", "value": 16}))
            .await
            .json();
        assert_eq!(created.version, 1);

        let updated = server
            .put(&format!("/api/data/{}", created.id))
            .json(&json!({"value": 20, "version": 1}))
            .await;
        updated.assert_status_ok();
        assert_eq!(updated.json::<UpdateResponse>().version, 2);

        let stale = server
            .put(&format!("/api/data/{}", created.id))
            .json(&json!({"value": 30, "version": 1}))
            .await;
        stale.assert_status(StatusCode::CONFLICT);
        let body: Value = stale.json();
        assert_eq!(body["error"], "version_conflict");
        assert_eq!(body["current_version"], 2);

        let list: RecordList = server.get("/api/data").await.json();
        assert_eq!(list.records.len(), 1);
        assert_eq!(list.records[0].value, 20.0);
    }

    #[tokio::test]
    async fn test_null_title_clears_it() {
        let (server, state) = server();

        let created: CreateResponse = server
            .post("/api/data")
            .json(&json!({"title": "t", "value": 1}))
            .await
            .json();

        server
            .put(&format!("/api/data/{}", created.id))
            .json(&json!({"title": null, "version": 1}))
            .await
            .assert_status_ok();

        let record = state.store().get(&created.id).await.unwrap().unwrap();
        assert!(record.title.is_none());
        assert_eq!(record.value, 1.0);
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_missing_record_is_404() {
        let (server, _state) = server();

        server
            .put("/api/data/nope")
            .json(&json!({"value": 1}))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .delete("/api/data/nope")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_defaults_and_delete() {
        let (server, state) = server();

        let created: CreateResponse = server.post("/api/data").json(&json!({})).await.json();
        let record = state.store().get(&created.id).await.unwrap().unwrap();
        assert_eq!(record.value, 0.0);

        let deleted: StatusResponse = server
            .delete(&format!("/api/data/{}", created.id))
            .await
            .json();
        assert_eq!(deleted.status, "deleted");
        assert!(state.store().get(&created.id).await.unwrap().is_none());
    }
}
