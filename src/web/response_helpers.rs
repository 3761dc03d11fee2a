// HTTP response helper functions shared by the route handlers

use hyper::{Body, Response, StatusCode};
use serde::Serialize;

/// Standard CORS headers
const CORS_ORIGIN: &str = "*";
const CORS_METHODS: &str = "GET, POST, OPTIONS";
const CORS_HEADERS: &str = "content-type";

/// Build a JSON response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let json = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"status":"error","message":"Serialization failed"}"#.to_string());
    json_raw(status, json)
}

/// Build an error response in the `{"status":"error","message":...}` shape
/// the frontend expects
pub fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    let json = format!(
        r#"{{"status":"error","message":"{}"}}"#,
        message.replace('"', "\\\"")
    );
    json_raw(status, json)
}

/// Build a raw JSON string response
pub fn json_raw(status: StatusCode, json: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("access-control-allow-origin", CORS_ORIGIN)
        .header("access-control-allow-methods", CORS_METHODS)
        .header("access-control-allow-headers", CORS_HEADERS)
        .body(Body::from(json))
        .unwrap()
}

/// Build an HTML response
pub fn html_response(html: String) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/html; charset=utf-8")
        .body(Body::from(html))
        .unwrap()
}

/// Build an empty response with CORS headers
pub fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("access-control-allow-origin", CORS_ORIGIN)
        .header("access-control-allow-methods", CORS_METHODS)
        .header("access-control-allow-headers", CORS_HEADERS)
        .body(Body::empty())
        .unwrap()
}

/// CORS preflight response
pub fn cors_preflight() -> Response<Body> {
    empty_response(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_status() {
        let response = json_error(StatusCode::BAD_REQUEST, "Invalid environment");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_json_error_escapes_quotes() {
        let response = json_error(StatusCode::INTERNAL_SERVER_ERROR, r#"kill "failed""#);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_json_response_serializes_body() {
        #[derive(Serialize)]
        struct Status {
            is_training: bool,
        }
        let response = json_response(StatusCode::OK, &Status { is_training: true });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
    }
}
