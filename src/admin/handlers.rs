use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::admin::AppState;
use crate::mirror::{ConfigUnit, GlobalConfig, MirrorError, SyncState};

/// A mirror error rendered as a JSON response.
pub struct ApiError(MirrorError);

impl From<MirrorError> for ApiError {
    fn from(e: MirrorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MirrorError::Validation(_) => StatusCode::BAD_REQUEST,
            MirrorError::Store(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub sync: SyncState,
    pub units: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        sync: state.mirror.state(),
        units: state.mirror.unit_count(),
    })
}

/// 200 while the mirror follows a live change feed, 503 otherwise.
pub async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<SyncState>) {
    let sync = state.mirror.state();
    let status = if sync.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(sync))
}

pub async fn get_datacenter_config(
    State(state): State<AppState>,
) -> Result<Json<GlobalConfig>, ApiError> {
    Ok(Json(state.mirror.get_all().await?))
}

pub async fn put_datacenter_config(
    State(state): State<AppState>,
    Json(config): Json<GlobalConfig>,
) -> Result<StatusCode, ApiError> {
    state.mirror.put_all(&config).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.mirror.get(&name) {
        Some(unit) => Json(unit).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("config {name} not found") })),
        )
            .into_response(),
    }
}

pub async fn put_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut unit): Json<ConfigUnit>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if unit.name.is_empty() {
        unit.name = name;
    } else if unit.name != name {
        return Err(MirrorError::Validation(format!(
            "body name {:?} does not match path name {:?}",
            unit.name, name
        ))
        .into());
    }
    let revision = state.mirror.put(unit).await?;
    Ok(Json(json!({ "revision": revision })))
}

pub async fn delete_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.mirror.delete(&name).await?;
    Ok(Json(json!({ "deleted": removed.is_some() })))
}
