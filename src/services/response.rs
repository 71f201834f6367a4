//! HTTP response building helpers
//!
//! Every handler answers through these so errors share one JSON shape,
//! `{ "error": "..." }`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::QuestError;

/// Body shown for any failure of the backing store
pub const SYSTEM_ERROR: &str = "System Error.";

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::NOT_FOUND, message)
}

/// Build a 401 Unauthorized response with message
pub fn unauthorized(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::UNAUTHORIZED, message)
}

/// Build a 500 Internal Server Error response with message
pub fn internal_error(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Status code for a service error
pub fn status_for(error: &QuestError) -> StatusCode {
    match error {
        QuestError::UnknownMember(_) | QuestError::PinMismatch(_) | QuestError::Unauthorized => {
            StatusCode::UNAUTHORIZED
        }
        QuestError::Forbidden(_) => StatusCode::FORBIDDEN,
        QuestError::NotFound { .. } => StatusCode::NOT_FOUND,
        QuestError::Busy(_) | QuestError::AlreadyExists { .. } | QuestError::AppendOnly(_) => {
            StatusCode::CONFLICT
        }
        QuestError::InvalidInput(_) | QuestError::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a QuestError to an appropriate HTTP response
///
/// Store failures are logged and answered with the generic [`SYSTEM_ERROR`].
pub fn error_response(error: QuestError) -> Response<Full<Bytes>> {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %error, "Request failed");
        return internal_error(SYSTEM_ERROR);
    }
    match &error {
        QuestError::PinMismatch(_) => unauthorized("ACCESS DENIED"),
        _ => error_body(status, &error.to_string()),
    }
}

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, QuestError>;

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, QuestError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a create result into an HTTP response with 201 Created
pub fn from_create_result<T: Serialize>(result: Result<T, QuestError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a delete result into an HTTP response with 204 No Content
pub fn from_delete_result(result: Result<(), QuestError>) -> Response<Full<Bytes>> {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Collection;

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(status_for(&QuestError::PinMismatch("u".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&QuestError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&QuestError::not_found(Collection::Habits, "h1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_for(&QuestError::Busy("habit:h1".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&QuestError::InvalidInput("bad".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_store_failure_is_generic() {
        let resp = error_response(QuestError::Store("disk on fire".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
