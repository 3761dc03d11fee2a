// Request parsing utilities for HTTP handlers

use std::collections::HashMap;

use hyper::{Body, Response, StatusCode, Uri};

use crate::log_error;
use crate::web::response_helpers::json_error;

/// Parse an `application/x-www-form-urlencoded` request body into a map.
///
/// Returns the decoded key/value pairs on success, or an error `Response`
/// (with CORS headers and a JSON error body) that the handler can return
/// directly.
pub async fn parse_form_body(body: Body) -> Result<HashMap<String, String>, Response<Body>> {
    let body_bytes = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log_error!("[REQUEST] Failed to read request body: {}", e);
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
            ));
        }
    };

    match std::str::from_utf8(&body_bytes) {
        Ok(text) => Ok(parse_urlencoded(text)),
        Err(e) => {
            log_error!("[REQUEST] Form body is not valid UTF-8: {}", e);
            Err(json_error(StatusCode::BAD_REQUEST, "Invalid form body"))
        }
    }
}

/// Decode a urlencoded key/value string. Later occurrences of a key win.
pub fn parse_urlencoded(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in text.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(raw_key);
        let value = decode_component(raw_value);
        map.insert(key, value);
    }
    map
}

// Form encoding uses '+' for spaces, which urlencoding::decode leaves alone
fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|s| s.into_owned())
        .unwrap_or(plus_decoded)
}

/// Extract a query parameter from a URI. The value is URL-decoded.
pub fn get_query_param(uri: &Uri, key: &str) -> Option<String> {
    let query = uri.query()?;

    for param in query.split('&') {
        if let Some((param_key, param_value)) = param.split_once('=') {
            if param_key == key {
                return urlencoding::decode(param_value).ok().map(|s| s.to_string());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_urlencoded_basic() {
        let map = parse_urlencoded("environment=cartpole&learning_rate=0.001");
        assert_eq!(map.get("environment"), Some(&"cartpole".to_string()));
        assert_eq!(map.get("learning_rate"), Some(&"0.001".to_string()));
    }

    #[test]
    fn test_parse_urlencoded_decodes_escapes() {
        let map = parse_urlencoded("name=donkey%20kong&toggle=on");
        assert_eq!(map.get("name"), Some(&"donkey kong".to_string()));
        assert_eq!(map.get("toggle"), Some(&"on".to_string()));
    }

    #[test]
    fn test_parse_urlencoded_plus_is_space() {
        let map = parse_urlencoded("name=donkey+kong");
        assert_eq!(map.get("name"), Some(&"donkey kong".to_string()));
    }

    #[test]
    fn test_parse_urlencoded_missing_value() {
        let map = parse_urlencoded("flag&key=");
        assert_eq!(map.get("flag"), Some(&String::new()));
        assert_eq!(map.get("key"), Some(&String::new()));
    }

    #[test]
    fn test_parse_urlencoded_last_value_wins() {
        let map = parse_urlencoded("env=cartpole&env=pacman");
        assert_eq!(map.get("env"), Some(&"pacman".to_string()));
    }

    #[test]
    fn test_get_query_param_basic() {
        let uri: Uri = "/videos?name=cartpole".parse().unwrap();
        assert_eq!(get_query_param(&uri, "name"), Some("cartpole".to_string()));
    }

    #[test]
    fn test_get_query_param_not_found() {
        let uri: Uri = "/videos?name=cartpole".parse().unwrap();
        assert_eq!(get_query_param(&uri, "missing"), None);
    }

    #[test]
    fn test_get_query_param_no_query() {
        let uri: Uri = "/videos".parse().unwrap();
        assert_eq!(get_query_param(&uri, "name"), None);
    }
}
