//! Maps unsuccessful responses into the [`X402Error`] taxonomy

use crate::types::defaults;
use crate::X402Error;
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};

/// Code used when the server does not supply one
pub const DEFAULT_API_CODE: &str = "API_ERROR";

/// Classify an unsuccessful response
///
/// A 429 always becomes [`X402Error::RateLimited`], whatever the body says.
/// Everything else becomes [`X402Error::Api`] carrying the server's
/// `error`/`message` and `code` fields verbatim. A body that is not a JSON
/// object is treated as empty.
pub fn classify_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> X402Error {
    classify_with_default_code(status, headers, body, DEFAULT_API_CODE)
}

/// Classify an unsuccessful response, using `default_code` when the body has none
pub fn classify_with_default_code(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    default_code: &str,
) -> X402Error {
    let body = parse_error_body(body);

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = headers
            .get(http::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(defaults::RATE_LIMIT_RETRY_AFTER);
        let limit = body.get("limit").and_then(Value::as_u64).unwrap_or(0);
        return X402Error::RateLimited { retry_after, limit };
    }

    let message = body
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
        .unwrap_or("Unknown API error")
        .to_string();
    let code = body
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or(default_code)
        .to_string();

    X402Error::Api {
        message,
        code,
        status: Some(status.as_u16()),
        details: Value::Object(body),
    }
}

fn parse_error_body(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
