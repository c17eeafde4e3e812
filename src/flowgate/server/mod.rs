// SPDX-License-Identifier: MIT

//! HTTP front end over the catalog, the engine and an instance store

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::flowgate::engine::{InstanceSummary, StateMachine};
use crate::flowgate::error::{FlowgateError, PersistenceError, Result};
use crate::flowgate::instance::{InstanceRecord, InstanceStore, WorkflowInstance};
use crate::flowgate::workflow::{CatalogEntry, WorkflowCatalog};

/// Shared server state
pub struct AppState {
    catalog: WorkflowCatalog,
    store: Arc<dyn InstanceStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(catalog: WorkflowCatalog, store: Arc<dyn InstanceStore>) -> Self {
        Self {
            catalog,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock serializing load -> transition -> save for one instance id.
    /// Pair every call with `release_lock`.
    async fn instance_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Drop the map entry for `id` once no other request holds or waits on it
    async fn release_lock(&self, id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one in `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    async fn load_instance(&self, id: &str) -> Result<WorkflowInstance> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| FlowgateError::InstanceNotFound(id.to_string()))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflows", get(list_workflows))
        .route("/api/instances", get(list_instances).post(create_instance))
        .route(
            "/api/instances/{id}",
            get(get_instance).delete(delete_instance),
        )
        .route("/api/instances/{id}/context", get(get_context))
        .route("/api/instances/{id}/transition", post(transition_instance))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, port: u16) -> Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Engine and store failures rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError(FlowgateError);

impl From<FlowgateError> for ApiError {
    fn from(err: FlowgateError) -> Self {
        Self(err)
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            e if e.is_rejection() => StatusCode::CONFLICT,
            FlowgateError::Persistence(PersistenceError::InvalidId(_)) => StatusCode::NOT_FOUND,
            FlowgateError::Validation(_) | FlowgateError::Yaml(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub workflow_name: String,
    #[serde(default)]
    pub context_data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: String,
    #[serde(default)]
    pub context_update: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    #[serde(flatten)]
    pub summary: InstanceSummary,
    pub context: String,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub previous_state: String,
    #[serde(flatten)]
    pub instance: InstanceResponse,
}

fn describe(machine: &StateMachine<'_>) -> Result<InstanceResponse> {
    Ok(InstanceResponse {
        summary: machine.instance_summary()?,
        context: machine.render_context()?,
    })
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_workflows(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<CatalogEntry>>> {
    Ok(Json(state.catalog.list().await?))
}

async fn list_instances(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<InstanceRecord>>> {
    Ok(Json(state.store.list().await?))
}

async fn create_instance(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateInstanceRequest>,
) -> ApiResult<(StatusCode, Json<InstanceResponse>)> {
    let workflow = state.catalog.load(&payload.workflow_name).await?;
    let mut machine = StateMachine::new(&workflow);
    for (key, value) in payload.context_data.unwrap_or_default() {
        machine.set_context(key, value);
    }

    let response = describe(&machine)?;
    state.store.save(machine.instance()).await?;
    log::info!(
        "Started instance {} of workflow '{}'",
        response.summary.id,
        workflow.name()
    );
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<InstanceSummary>> {
    let instance = state.load_instance(&id).await?;
    let workflow = state.catalog.load(instance.workflow_name()).await?;
    let machine = StateMachine::with_instance(&workflow, instance);
    Ok(Json(machine.instance_summary()?))
}

async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let instance = state.load_instance(&id).await?;
    let workflow = state.catalog.load(instance.workflow_name()).await?;
    let machine = StateMachine::with_instance(&workflow, instance);
    Ok(Json(json!({ "context": machine.render_context()? })))
}

async fn transition_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<TransitionRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    let lock = state.instance_lock(&id).await;
    let result = {
        let _guard = lock.lock().await;
        apply_transition(&state, &id, payload).await
    };
    state.release_lock(&id, lock).await;
    result.map(Json)
}

async fn apply_transition(
    state: &AppState,
    id: &str,
    payload: TransitionRequest,
) -> ApiResult<TransitionResponse> {
    let instance = state.load_instance(id).await?;
    let workflow = state.catalog.load(instance.workflow_name()).await?;
    let mut machine = StateMachine::with_instance(&workflow, instance);

    let previous_state = machine.current_state()?.id.clone();
    machine.transition(&payload.action, payload.context_update)?;
    let response = describe(&machine)?;

    state.store.save(machine.instance()).await?;
    Ok(TransitionResponse {
        previous_state,
        instance: response,
    })
}

async fn delete_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let lock = state.instance_lock(&id).await;
    let deleted = {
        let _guard = lock.lock().await;
        state.store.delete(&id).await
    };
    state.release_lock(&id, lock).await;

    if deleted? {
        log::info!("Deleted instance {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(FlowgateError::InstanceNotFound(id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgate::instance::MemoryStore;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const GATED: &str = r#"
name: gated
states:
  - id: start
    name: Start
    required_context: "Working on {task}"
    transitions:
      go: middle
  - id: middle
    name: Middle
    required_context: "Middle state with {data}"
    prerequisites: [data]
    transitions:
      finish: end
  - id: end
    name: End
"#;

    fn setup() -> (TempDir, Arc<AppState>, MemoryStore) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("gated.yaml"), GATED).unwrap();
        let store = MemoryStore::new();
        let state = Arc::new(AppState::new(
            WorkflowCatalog::new(dir.path()),
            Arc::new(store.clone()),
        ));
        (dir, state, store)
    }

    async fn create(state: &Arc<AppState>, context: Value) -> InstanceResponse {
        let request = CreateInstanceRequest {
            workflow_name: "gated".to_string(),
            context_data: context.as_object().cloned(),
        };
        let (status, Json(body)) = create_instance(State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    async fn transition(
        state: &Arc<AppState>,
        id: &str,
        action: &str,
        update: Value,
    ) -> ApiResult<Json<TransitionResponse>> {
        transition_instance(
            State(state.clone()),
            Path(id.to_string()),
            Json(TransitionRequest {
                action: action.to_string(),
                context_update: update.as_object().cloned(),
            }),
        )
        .await
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health_check().await;
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_list_workflows() {
        let (_dir, state, _) = setup();
        let Json(entries) = list_workflows(State(state)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "gated");
    }

    #[tokio::test]
    async fn test_create_saves_and_renders() {
        let (_dir, state, store) = setup();
        let body = create(&state, json!({"task": "docs"})).await;

        assert_eq!(body.summary.current_state_id, "start");
        assert!(body.context.contains("Working on docs"));
        assert!(store.load(&body.summary.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_unknown_workflow_is_404() {
        let (_dir, state, _) = setup();
        let request = CreateInstanceRequest {
            workflow_name: "missing".to_string(),
            context_data: None,
        };
        let err = create_instance(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_transition_flow_and_status_codes() {
        let (_dir, state, store) = setup();
        let id = create(&state, json!({})).await.summary.id;

        let err = transition(&state, &id, "bogus", json!({})).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = transition(&state, &id, "go", json!({"data": "v"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(
            err.0.to_string(),
            "Cannot transition to 'middle'. Unmet prerequisites: [data]"
        );

        let unchanged = store.load(&id).await.unwrap().unwrap();
        assert_eq!(unchanged.current_state(), "start");
        assert!(unchanged.context_data().is_empty());

        let mut instance = unchanged;
        instance.insert_context("data", json!("v"));
        store.save(&instance).await.unwrap();

        let Json(moved) = transition(&state, &id, "go", json!({})).await.unwrap();
        assert_eq!(moved.previous_state, "start");
        assert_eq!(moved.instance.summary.current_state_id, "middle");
        assert!(moved.instance.context.contains("Middle state with v"));

        let saved = store.load(&id).await.unwrap().unwrap();
        assert_eq!(saved.current_state(), "middle");
        assert_eq!(saved.history().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_instance_is_404() {
        let (_dir, state, _) = setup();
        let err = get_instance(State(state.clone()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = transition(&state, "nope", "go", json!({})).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = delete_instance(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_context_and_delete() {
        let (_dir, state, store) = setup();
        let id = create(&state, json!({"task": "x"})).await.summary.id;

        let Json(body) = get_context(State(state.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert!(body["context"].as_str().unwrap().contains("Working on x"));

        let status = delete_instance(State(state), Path(id.clone())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(store.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_transitions_are_serialized() {
        let (_dir, state, _) = setup();
        let id = create(&state, json!({"data": "v"})).await.summary.id;

        let first = tokio::spawn({
            let state = state.clone();
            let id = id.clone();
            async move { transition(&state, &id, "go", json!({})).await.is_ok() }
        });
        let second = tokio::spawn({
            let state = state.clone();
            let id = id.clone();
            async move { transition(&state, &id, "go", json!({})).await.is_ok() }
        });

        let outcomes = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    }

    #[test]
    fn test_error_status_mapping() {
        let validation = ApiError(FlowgateError::Validation(
            crate::flowgate::error::ValidationError::DuplicateState("a".into()),
        ));
        assert_eq!(validation.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let config = ApiError(FlowgateError::config("bad"));
        assert_eq!(config.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let invalid_id = ApiError(PersistenceError::InvalidId("../x".into()).into());
        assert_eq!(invalid_id.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lock_entries_do_not_accumulate() {
        let (_dir, state, _) = setup();
        for i in 0..50 {
            let ghost = format!("ghost-{}", i);
            assert!(delete_instance(State(state.clone()), Path(ghost.clone()))
                .await
                .is_err());
            assert!(transition(&state, &ghost, "go", json!({})).await.is_err());
        }
        assert!(state.locks.lock().await.is_empty());

        let id = create(&state, json!({"data": "v"})).await.summary.id;
        transition(&state, &id, "go", json!({})).await.unwrap();
        assert!(state.locks.lock().await.is_empty());

        delete_instance(State(state.clone()), Path(id)).await.unwrap();
        assert!(state.locks.lock().await.is_empty());
    }
}
