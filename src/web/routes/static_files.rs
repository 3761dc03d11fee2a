//! Serves recorded gameplay files under `/static/videos/`.

use std::convert::Infallible;
use std::path::Path;

use hyper::{Body, Response, StatusCode};

use crate::config::VIDEOS_DIR;
use crate::web::response_helpers::json_error;

const ROUTE_PREFIX: &str = "/static/videos/";

pub async fn handle(path: &str) -> Result<Response<Body>, Infallible> {
    let filename = &path[ROUTE_PREFIX.len()..];

    // Reject path traversal
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid filename"));
    }

    let file_path = Path::new(VIDEOS_DIR).join(filename);
    match std::fs::read(&file_path) {
        Ok(content) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", content_type(filename))
            .header("cache-control", "no-cache")
            .body(Body::from(content))
            .unwrap()),
        Err(_) => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Video not found"))
            .unwrap()),
    }
}

fn content_type(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".mp4") {
        "video/mp4"
    } else if lower.ends_with(".webm") {
        "video/webm"
    } else if lower.ends_with(".ogg") {
        "video/ogg"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type("a.mp4"), "video/mp4");
        assert_eq!(content_type("a.webm"), "video/webm");
        assert_eq!(content_type("a.GIF"), "image/gif");
        assert_eq!(content_type("a.bin"), "application/octet-stream");
    }
}
