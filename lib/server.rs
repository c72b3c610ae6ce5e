//! HTTP facade exposing a chain engine to remote mounts.
//!
//! Status mapping: `NotFound` is 404, malformed bodies and parameters are
//! 400, lock conflicts are 409, a wrong verb on a known path is 405 (axum
//! method routing), anything else is 500. Error bodies are plain text.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use crate::chain::Chain;
use crate::error::FsError;
use crate::model::{FileInfo, LockType};

/// Build the facade router over a shared engine.
pub fn router(engine: Arc<Chain>) -> Router {
    Router::new()
        .route("/info", get(handle_info))
        .route("/list", get(handle_list))
        .route("/read", get(handle_read))
        .route("/write", post(handle_write))
        .route("/lock", post(handle_lock))
        .route("/unlock", post(handle_unlock))
        .with_state(engine)
}

struct ApiError(FsError);

impl From<FsError> for ApiError {
    fn from(e: FsError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FsError::NotFound(_) => StatusCode::NOT_FOUND,
            FsError::Malformed(_) => StatusCode::BAD_REQUEST,
            FsError::Busy | FsError::NotOwner | FsError::NotLocked => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        debug!(error = %self.0, %status, "request failed");
        (status, self.0.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: String,
}

async fn handle_info(
    State(engine): State<Arc<Chain>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileInfo>, ApiError> {
    Ok(Json(engine.info(&query.path).await?))
}

async fn handle_list(
    State(engine): State<Arc<Chain>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Vec<FileInfo>>, ApiError> {
    Ok(Json(engine.list(&query.path).await?))
}

async fn handle_read(
    State(engine): State<Arc<Chain>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileInfo>, ApiError> {
    let mut info = engine.info(&query.path).await?;
    let content = engine.read(&query.path).await?;
    info.content = Some(content.to_vec());
    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
struct WriteQuery {
    path: String,
    /// Pid of a caller that holds a write lock on the path, if any.
    pid: Option<u32>,
}

async fn handle_write(
    State(engine): State<Arc<Chain>>,
    Query(query): Query<WriteQuery>,
    Json(body): Json<FileInfo>,
) -> Result<StatusCode, ApiError> {
    let content = body.content.unwrap_or_default();
    engine
        .write(&query.path, &content, body.mode, query.pid)
        .await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct LockQuery {
    path: String,
    #[serde(rename = "type")]
    lock_type: u8,
    pid: u32,
}

async fn handle_lock(
    State(engine): State<Arc<Chain>>,
    Query(query): Query<LockQuery>,
) -> Result<StatusCode, ApiError> {
    let lock_type = LockType::from_wire(query.lock_type).ok_or_else(|| {
        ApiError(FsError::Malformed(format!(
            "unknown lock type {}",
            query.lock_type
        )))
    })?;
    engine.lock(&query.path, lock_type, query.pid).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct UnlockQuery {
    path: String,
    pid: u32,
}

async fn handle_unlock(
    State(engine): State<Arc<Chain>>,
    Query(query): Query<UnlockQuery>,
) -> Result<StatusCode, ApiError> {
    engine.unlock(&query.path, query.pid).await?;
    Ok(StatusCode::OK)
}
