//! Post endpoints and response envelope.
//!
//! # Responsibility
//! - Map HTTP requests onto `PostService` use-cases.
//! - Render every outcome as `{success, data}` or `{success, message, errors?}`.
//! - Emit one structured log event per request.
//!
//! # Invariants
//! - Handlers never panic on bad input; failures become envelope responses.
//! - Internal error details are logged, never returned to clients.

use crate::validation::{
    parse_create_body, parse_patch_body, FieldErrors, PatchRejection, TITLE_TAKEN_MESSAGE,
};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, info, warn};
use postdesk_core::{core_version, PostId, PostService, PostServiceError, SqlitePostRepository};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

const MISSING_PARAMETERS_MESSAGE: &str = "One or more required parameters are missing";
const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const DELETED_MESSAGE: &str = "Post deleted successfully";
const ROUTE_NOT_FOUND_MESSAGE: &str = "Route not found";
const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";

/// Raw `:id` segment; parsed by the handler so bad ids still get an envelope.
type IdPath = Result<Path<String>, PathRejection>;

#[derive(Debug, Serialize)]
struct SuccessBody<T: Serialize> {
    success: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct FailureBody<'a> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a BTreeMap<&'static str, Vec<String>>>,
}

#[derive(Debug, Serialize)]
struct DeletedBody {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
}

/// Request-level failure rendered as an error envelope.
#[derive(Debug)]
pub enum ApiError {
    /// 404 for a post key that matches no post, as written in the path.
    NotFound(String),
    /// 404 for a path outside the router.
    RouteNotFound,
    /// 405 for a known path with an unsupported method.
    MethodNotAllowed,
    /// 400 for an update body without any known field.
    MissingParameters,
    /// 400 for a path that could not be decoded.
    BadRequest(String),
    /// 422 with field messages.
    Validation(FieldErrors),
    /// 500; the detail is logged only.
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::MissingParameters | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::RouteNotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::MissingParameters | Self::BadRequest(_) => "bad_request",
            Self::Validation(_) => "invalid",
            Self::Internal(_) => "error",
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(value: PostServiceError) -> Self {
        match value {
            PostServiceError::NotFound(id) => Self::NotFound(id.to_string()),
            PostServiceError::TitleTaken(_) => title_taken(),
            PostServiceError::Validation(err) => {
                Self::Validation(FieldErrors::single("title", err.to_string()))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::NotFound(key) => failure(status, &format!("Entity #{key} not found"), None),
            Self::RouteNotFound => failure(status, ROUTE_NOT_FOUND_MESSAGE, None),
            Self::MethodNotAllowed => failure(status, METHOD_NOT_ALLOWED_MESSAGE, None),
            Self::MissingParameters => failure(status, MISSING_PARAMETERS_MESSAGE, None),
            Self::BadRequest(message) => failure(status, message, None),
            Self::Validation(errors) => {
                failure(status, errors.first_message(), Some(errors.by_field()))
            }
            Self::Internal(details) => {
                error!("event=http_internal module=http status=error error={details}");
                failure(status, INTERNAL_ERROR_MESSAGE, None)
            }
        }
    }
}

fn failure(
    status: StatusCode,
    message: &str,
    errors: Option<&BTreeMap<&'static str, Vec<String>>>,
) -> Response {
    let body = FailureBody {
        success: false,
        message,
        errors,
    };
    (status, Json(body)).into_response()
}

fn success<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(SuccessBody {
            success: true,
            data,
        }),
    )
        .into_response()
}

/// `GET /posts`
pub async fn list_posts(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let result = with_post_service(&state, |service| Ok(service.all()?)).await;
    finish("post_list", started, None, result.map(success))
}

/// `GET /posts/:id`
pub async fn get_post(State(state): State<AppState>, path: IdPath) -> Response {
    let started = Instant::now();
    let id = parse_post_id(path);
    let post_id = id.as_ref().ok().copied();
    let result = match id {
        Ok(id) => with_post_service(&state, move |service| Ok(service.find_by_id(id)?)).await,
        Err(err) => Err(err),
    };
    finish("post_get", started, post_id, result.map(success))
}

/// `POST /posts`
pub async fn create_post(State(state): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();
    let result = match parse_create_body(&body) {
        Ok(input) => {
            with_post_service(&state, move |service| {
                Ok(service.create(&input.title, &input.content, input.is_published)?)
            })
            .await
        }
        Err(errors) => Err(ApiError::Validation(errors)),
    };
    finish("post_create", started, None, result.map(success))
}

/// `PUT /posts/:id`
pub async fn update_post(State(state): State<AppState>, path: IdPath, body: Bytes) -> Response {
    let started = Instant::now();
    let id = parse_post_id(path);
    let post_id = id.as_ref().ok().copied();
    let result = match (id, parse_patch_body(&body)) {
        (Err(err), _) => Err(err),
        (Ok(_), Err(PatchRejection::NoFields)) => Err(ApiError::MissingParameters),
        (Ok(_), Err(PatchRejection::Invalid(errors))) => Err(ApiError::Validation(errors)),
        (Ok(id), Ok(patch)) => {
            with_post_service(&state, move |service| Ok(service.update(id, &patch)?)).await
        }
    };
    finish("post_update", started, post_id, result.map(success))
}

/// `DELETE /posts/:id`
pub async fn delete_post(State(state): State<AppState>, path: IdPath) -> Response {
    let started = Instant::now();
    let id = parse_post_id(path);
    let post_id = id.as_ref().ok().copied();
    let result = match id {
        Ok(id) => with_post_service(&state, move |service| Ok(service.delete(id)?)).await,
        Err(err) => Err(err),
    };
    let result = result.map(|()| {
        success(DeletedBody {
            message: DELETED_MESSAGE,
        })
    });
    finish("post_delete", started, post_id, result)
}

/// `GET /health`
pub async fn health() -> Response {
    success(HealthBody {
        status: "ok",
        version: core_version(),
    })
}

/// Router fallback for paths no route matches.
pub async fn route_not_found(method: Method, uri: Uri) -> Response {
    reject_unrouted(method, uri, ApiError::RouteNotFound)
}

/// Method fallback for routed paths.
pub async fn method_not_allowed(method: Method, uri: Uri) -> Response {
    reject_unrouted(method, uri, ApiError::MethodNotAllowed)
}

fn reject_unrouted(method: Method, uri: Uri, err: ApiError) -> Response {
    warn!(
        "event=http_unrouted module=http status={} http_status={} method={} path={}",
        err.label(),
        err.status().as_u16(),
        method,
        uri.path()
    );
    err.into_response()
}

fn parse_post_id(path: IdPath) -> Result<PostId, ApiError> {
    let Path(raw) = path.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    raw.parse().map_err(|_| ApiError::NotFound(raw))
}

fn title_taken() -> ApiError {
    ApiError::Validation(FieldErrors::single("title", TITLE_TAKEN_MESSAGE))
}

/// Runs `f` against a post service on the blocking pool while holding the
/// connection lock.
///
/// The service rejects duplicate titles inside its write transaction.
async fn with_post_service<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&PostService<SqlitePostRepository<'_>>) -> Result<T, ApiError> + Send + 'static,
{
    let conn = state.connection();
    tokio::task::spawn_blocking(move || {
        let conn = conn.lock();
        let repo = SqlitePostRepository::try_new(&conn)
            .map_err(|err| ApiError::Internal(format!("post repo init failed: {err}")))?;
        f(&PostService::new(repo).reject_duplicate_titles())
    })
    .await
    .map_err(|err| ApiError::Internal(format!("blocking task failed: {err}")))?
}

fn finish(
    event: &'static str,
    started: Instant,
    post_id: Option<PostId>,
    result: Result<Response, ApiError>,
) -> Response {
    let duration_ms = started.elapsed().as_millis();
    let post_id = post_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    match result {
        Ok(response) => {
            info!(
                "event={} module=http status=ok post_id={} duration_ms={}",
                event, post_id, duration_ms
            );
            response
        }
        Err(err) => {
            warn!(
                "event={} module=http status={} http_status={} post_id={} duration_ms={}",
                event,
                err.label(),
                err.status().as_u16(),
                post_id,
                duration_ms
            );
            err.into_response()
        }
    }
}
