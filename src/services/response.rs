//! HTTP response building helpers
//!
//! Provides a consistent API for building HTTP responses across all handlers.
//! Every error body has the shape `{"error": "<message>"}`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::error::AccordError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
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

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": message }),
    )
}

/// Build a 400 Bad Request response with message
pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "error": message }),
    )
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// Build a 413 Payload Too Large response
pub fn payload_too_large(limit: usize) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &serde_json::json!({ "error": format!("Request body exceeds {} bytes", limit) }),
    )
}

/// HTTP status for an error
pub fn status_for(error: &AccordError) -> StatusCode {
    match error {
        AccordError::InvalidArgument(_) | AccordError::Json(_) => StatusCode::BAD_REQUEST,
        AccordError::Forbidden(_) => StatusCode::FORBIDDEN,
        AccordError::NotFound(_) => StatusCode::NOT_FOUND,
        AccordError::Conflict(_) => StatusCode::CONFLICT,
        AccordError::PreconditionFailed(_) | AccordError::IncompleteContract { .. } => {
            StatusCode::PRECONDITION_FAILED
        }
        AccordError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert an AccordError to an appropriate HTTP response
pub fn error_response(error: AccordError) -> Response<Full<Bytes>> {
    let status = status_for(&error);

    let body = match &error {
        AccordError::IncompleteContract { missing } => serde_json::json!({
            "error": error.to_string(),
            "missing": missing.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
        }),
        _ => serde_json::json!({ "error": error.to_string() }),
    };

    json_response(status, &body)
}

/// Wrap a delete result into an HTTP response with 204 No Content
pub fn from_delete_result(result: Result<(), AccordError>) -> Response<Full<Bytes>> {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(e),
    }
}
