//! HTTP control-plane routes.
//!
//! The wire contract: daemon records in and out as JSON, errors as
//! `{"error": "<message>"}`. All bodies are indented JSON. Engine errors
//! map onto 400/404/500 per operation; store failures are always a 500
//! "database error".

use axum::Router;
use axum::extract::{Form, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use serde::{Deserialize, Serialize};
use vigil_core::{Engine, EngineError};

/// Builds the control-plane router over an engine handle.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/", get(list_daemons).post(add_daemon))
        .route("/{key}", get(get_daemon).delete(delete_daemon))
        .route("/{key}/start", put(start_daemon))
        .route("/{key}/stop", put(stop_daemon))
        .route("/{key}/pause", put(pause_daemon))
        .route("/{key}/continue", put(continue_daemon))
        .with_state(engine)
}

/// Indented-JSON response body.
struct ApiJson<T>(StatusCode, T);

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_string_pretty(&self.1) {
            Ok(body) => (
                self.0,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response(),
            Err(err) => ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("marshalling error: {err}"),
            )
            .into_response(),
        }
    }
}

fn ok<T: Serialize>(value: T) -> ApiJson<T> {
    ApiJson(StatusCode::OK, value)
}

/// Error response: `{"error": "<message>"}` with the mapped status code.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            error: String,
        }
        let body = serde_json::to_string_pretty(&Body { error: self.1 })
            .unwrap_or_else(|_| String::from("{}"));
        (
            self.0,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound => Self(StatusCode::NOT_FOUND, "not found".to_string()),
            EngineError::KeyConflict => {
                Self(StatusCode::BAD_REQUEST, "key already exists".to_string())
            },
            EngineError::AlreadyStarted => {
                Self(StatusCode::BAD_REQUEST, "already started".to_string())
            },
            EngineError::NotStarted => Self(StatusCode::BAD_REQUEST, "not started".to_string()),
            EngineError::Store(_) => {
                Self(StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
            },
            other @ (EngineError::BadPid | EngineError::Signal(_) | EngineError::Random(_)) => {
                Self(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddForm {
    #[serde(default)]
    key: String,
    #[serde(default)]
    cmd: String,
    #[serde(default)]
    dir: String,
}

async fn list_daemons(State(engine): State<Engine>) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(engine.list()?))
}

async fn add_daemon(
    State(engine): State<Engine>,
    Form(form): Form<AddForm>,
) -> Result<impl IntoResponse, ApiError> {
    if form.cmd.is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "cmd required".to_string()));
    }
    let key = (!form.key.is_empty()).then_some(form.key.as_str());
    Ok(ok(engine.add(key, &form.cmd, &form.dir)?))
}

async fn get_daemon(
    State(engine): State<Engine>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(engine.get(&key)?))
}

async fn delete_daemon(
    State(engine): State<Engine>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    engine.remove(&key).await.map_err(|err| match err {
        EngineError::AlreadyStarted => ApiError(
            StatusCode::BAD_REQUEST,
            "stop daemon before deleting".to_string(),
        ),
        other => other.into(),
    })?;
    Ok(ok(serde_json::json!({})))
}

async fn start_daemon(
    State(engine): State<Engine>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    engine.start(&key).await?;
    Ok(ok(engine.get(&key)?))
}

async fn stop_daemon(
    State(engine): State<Engine>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    engine.stop(&key).await?;
    Ok(ok(engine.get(&key)?))
}

async fn pause_daemon(
    State(engine): State<Engine>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    engine.pause(&key).await?;
    Ok(ok(engine.get(&key)?))
}

async fn continue_daemon(
    State(engine): State<Engine>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    engine.resume(&key).await?;
    Ok(ok(engine.get(&key)?))
}
