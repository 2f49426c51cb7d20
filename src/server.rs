//! Local HTTP/JSON transport for the command surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::commands::{self, LaunchRequest};
use crate::core::error::LauncherError;
use crate::core::loaders::LoaderType;
use crate::core::state::AppState;
use crate::core::version::VersionType;

type SharedState = Arc<AppState>;

/// Error body: `{ "error": kind, "message": text }`.
pub struct ApiError(LauncherError);

impl From<LauncherError> for ApiError {
    fn from(err: LauncherError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            LauncherError::InvalidArgument(_)
            | LauncherError::InvalidMavenCoordinate(_)
            | LauncherError::UnresolvedPlaceholder { .. } => StatusCode::BAD_REQUEST,
            LauncherError::VersionNotFound(_) | LauncherError::TaskNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LauncherError::NameConflict(_)
            | LauncherError::VersionIncomplete(_)
            | LauncherError::LoaderMismatch { .. } => StatusCode::CONFLICT,
            LauncherError::JavaUnavailable { .. } => StatusCode::PRECONDITION_FAILED,
            LauncherError::ManifestFetch { .. }
            | LauncherError::LoaderApi(_)
            | LauncherError::Http(_)
            | LauncherError::DownloadFailed { .. }
            | LauncherError::DownloadExhausted { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = Json(json!({"error": self.0.kind(), "message": self.0.to_string()}));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
struct VersionsQuery {
    #[serde(rename = "type", default)]
    version_type: Option<VersionType>,
    #[serde(default)]
    refresh: bool,
}

#[derive(Debug, Deserialize)]
struct InstallBody {
    version_id: String,
    #[serde(default)]
    custom_name: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstallWithLoaderBody {
    mc_version: String,
    loader_type: LoaderType,
    loader_version: String,
    #[serde(default)]
    custom_name: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/versions", get(list_versions))
        .route("/api/loaders/:loader/:mc/versions", get(loader_versions))
        .route("/api/install", post(install))
        .route("/api/install-with-loader", post(install_with_loader))
        .route("/api/progress/:task_id", get(progress))
        .route("/api/progress/:task_id/cancel", post(cancel))
        .route("/api/installed", get(list_installed))
        .route("/api/launch", post(launch))
        .route("/api/processes", get(running_processes))
        .route("/api/processes/:pid", get(process_status))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: SharedState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

async fn list_versions(
    State(state): State<SharedState>,
    Query(query): Query<VersionsQuery>,
) -> ApiResult<serde_json::Value> {
    let versions = commands::list_versions(&state, query.version_type, query.refresh).await?;
    Ok(Json(json!({ "versions": versions })))
}

async fn loader_versions(
    State(state): State<SharedState>,
    Path((loader, mc)): Path<(String, String)>,
) -> ApiResult<serde_json::Value> {
    let loader_type: LoaderType = loader.parse()?;
    let versions = commands::loader_versions(&state, loader_type, &mc).await?;
    Ok(Json(json!({ "loader": loader_type, "mc_version": mc, "versions": versions })))
}

async fn install(
    State(state): State<SharedState>,
    Json(body): Json<InstallBody>,
) -> ApiResult<commands::TaskHandle> {
    Ok(Json(commands::install(
        &state,
        &body.version_id,
        body.custom_name,
        body.task_id,
    )?))
}

async fn install_with_loader(
    State(state): State<SharedState>,
    Json(body): Json<InstallWithLoaderBody>,
) -> ApiResult<commands::TaskHandle> {
    Ok(Json(commands::install_with_loader(
        &state,
        &body.mc_version,
        body.loader_type,
        &body.loader_version,
        body.custom_name,
        body.task_id,
    )?))
}

async fn progress(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
) -> ApiResult<crate::core::progress::InstallTask> {
    Ok(Json(commands::progress(&state, &task_id)?))
}

async fn cancel(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
) -> ApiResult<crate::core::progress::InstallTask> {
    Ok(Json(commands::cancel(&state, &task_id)?))
}

async fn list_installed(
    State(state): State<SharedState>,
) -> ApiResult<Vec<crate::core::instance::InstalledVersion>> {
    Ok(Json(commands::list_installed(&state).await?))
}

async fn launch(
    State(state): State<SharedState>,
    Json(request): Json<LaunchRequest>,
) -> ApiResult<crate::core::launch::LaunchedProcess> {
    Ok(Json(commands::launch(&state, request).await?))
}

async fn running_processes(
    State(state): State<SharedState>,
) -> Json<Vec<crate::core::launch::ProcessInfo>> {
    Json(commands::running_processes(&state))
}

async fn process_status(
    State(state): State<SharedState>,
    Path(pid): Path<u32>,
) -> Json<serde_json::Value> {
    Json(json!({ "pid": pid, "status": commands::process_status(&state, pid) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (LauncherError::TaskNotFound("x".into()), StatusCode::NOT_FOUND),
            (LauncherError::NameConflict("x".into()), StatusCode::CONFLICT),
            (
                LauncherError::LoaderMismatch {
                    loader: "fabric 0.15.11".into(),
                    expected: "1.20.1".into(),
                    found: "1.20.4".into(),
                },
                StatusCode::CONFLICT,
            ),
            (LauncherError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (
                LauncherError::JavaUnavailable {
                    required: 17,
                    checked: vec![],
                },
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                LauncherError::ManifestFetch {
                    what: "version manifest".into(),
                    reason: "offline".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (LauncherError::Other("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
