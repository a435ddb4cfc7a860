//! Axum handlers for the todo API.
//!
//! Each handler acquires a fresh `Session`, moves it onto tokio's blocking pool
//! together with the work to do, and drops it there before the response is
//! built. Write paths go through `Session::transaction`, so any error raised
//! inside the closure rolls the transaction back before it reaches the client.

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::convert::Infallible;
use todo_core::{Store, Todo, TodoPayload};
use tracing::{debug, info, warn};

use crate::error::ApiError;

/// Run store work on the blocking pool. A panic in `work` becomes an
/// unhandled error rather than taking the connection task down.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(ApiError::unhandled)?
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// The `{id}` path segment. Only non-negative decimal integers match; anything
/// else is a routing miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TodoId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for TodoId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::NotFound)?;
        parse_todo_id(&raw).map(TodoId).ok_or(ApiError::NotFound)
    }
}

fn parse_todo_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// A lenient JSON body. Missing, unreadable, or non-JSON bodies all become the
/// empty payload; this extractor never rejects.
#[derive(Debug, Clone, Default)]
pub struct JsonPayload(pub TodoPayload);

impl<S: Send + Sync> FromRequest<S> for JsonPayload {
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !has_json_content_type(req.headers()) {
            return Ok(Self::default());
        }
        match Bytes::from_request(req, state).await {
            Ok(bytes) => Ok(Self(TodoPayload::from_json_bytes(&bytes))),
            Err(err) => {
                debug!(error = %err, "request body unreadable, treating as empty");
                Ok(Self::default())
            }
        }
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn health(State(store): State<Store>) -> Response {
    let outcome = tokio::task::spawn_blocking(move || store.ping()).await;
    let error = match outcome {
        Ok(Ok(())) => {
            let body = HealthStatus {
                status: "ok",
                database: "reachable",
                error: None,
            };
            return (StatusCode::OK, Json(body)).into_response();
        }
        Ok(Err(err)) => err.to_string(),
        Err(err) => err.to_string(),
    };

    warn!(error = %error, "health check failed");
    let body = HealthStatus {
        status: "degraded",
        database: "unreachable",
        error: Some(error),
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Todos
// ---------------------------------------------------------------------------

/// Store failures here are not caught: they surface as a bare 500.
pub async fn list_todos(State(store): State<Store>) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = run_blocking(move || {
        let mut session = store.session().map_err(ApiError::unhandled)?;
        session.list_todos().map_err(ApiError::unhandled)
    })
    .await?;
    Ok(Json(todos))
}

pub async fn create_todo(
    State(store): State<Store>,
    JsonPayload(payload): JsonPayload,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let new = payload.into_new_todo()?;
    let todo = run_blocking(move || {
        let mut session = store.session()?;
        let id = session.transaction(|unit| unit.insert(&new))?;
        Ok(session.reload_todo(id)?)
    })
    .await?;

    info!(id = todo.id, "todo created");
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_todo(
    State(store): State<Store>,
    TodoId(id): TodoId,
) -> Result<Json<Todo>, ApiError> {
    let todo = run_blocking(move || {
        let mut session = store.session()?;
        session.find_todo(id)?.ok_or(ApiError::NotFound)
    })
    .await?;
    Ok(Json(todo))
}

/// Serves both `PUT` and `PATCH`; either way only the fields present in the
/// body change.
pub async fn update_todo(
    State(store): State<Store>,
    TodoId(id): TodoId,
    JsonPayload(payload): JsonPayload,
) -> Result<Json<Todo>, ApiError> {
    let todo = run_blocking(move || {
        let mut session = store.session()?;
        session.transaction(|unit| {
            unit.get(id)?.ok_or(ApiError::NotFound)?;
            let patch = payload.into_patch();
            unit.apply(id, &patch)?;
            Ok::<_, ApiError>(())
        })?;
        Ok(session.reload_todo(id)?)
    })
    .await?;

    info!(id, "todo updated");
    Ok(Json(todo))
}

pub async fn delete_todo(
    State(store): State<Store>,
    TodoId(id): TodoId,
) -> Result<StatusCode, ApiError> {
    run_blocking(move || {
        let mut session = store.session()?;
        session.transaction(|unit| {
            unit.get(id)?.ok_or(ApiError::NotFound)?;
            unit.delete(id)?;
            Ok::<_, ApiError>(())
        })
    })
    .await?;

    info!(id, "todo deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
