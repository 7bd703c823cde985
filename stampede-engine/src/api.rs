//! Typed views of the target API's response bodies
//!
//! Bodies are decoded leniently (a listing may be a bare array or wrapped in
//! an object) but never defaulted: anything that does not fit is reported as
//! a [`ParseError`] so the caller can count it.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use stampede_http::{ResponseBody, TransportResponse};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("response body is empty")]
    Empty,

    #[error("response body is not JSON: {0}")]
    NotJson(String),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Book {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, alias = "isRead")]
    pub read: bool,
}

fn json(body: &ResponseBody) -> Result<&JsonValue, ParseError> {
    match body {
        ResponseBody::Json(value) => Ok(value),
        ResponseBody::Empty => Err(ParseError::Empty),
        ResponseBody::Unparsed { error, .. } => Err(ParseError::NotJson(error.clone())),
    }
}

/// A list that is either the whole body or the first of `keys` holding an array
fn list<T: DeserializeOwned>(body: &ResponseBody, keys: &[&str]) -> Result<Vec<T>, ParseError> {
    let value = json(body)?;
    let array = match value {
        JsonValue::Array(_) => value,
        JsonValue::Object(map) => keys
            .iter()
            .find_map(|key| map.get(*key).filter(|v| v.is_array()))
            .ok_or_else(|| {
                ParseError::UnexpectedShape(format!("expected an array under one of {:?}", keys))
            })?,
        _ => return Err(ParseError::UnexpectedShape("expected array or object".to_string())),
    };
    serde_json::from_value(array.clone()).map_err(|e| ParseError::UnexpectedShape(e.to_string()))
}

pub fn parse_books(body: &ResponseBody) -> Result<Vec<Book>, ParseError> {
    list(body, &["books", "data", "results"])
}

pub fn parse_notifications(body: &ResponseBody) -> Result<Vec<Notification>, ParseError> {
    list(body, &["notifications", "data"])
}

/// Id of a created entity: `_id` at the top level or inside one of `wrappers`
pub fn parse_created_id(body: &ResponseBody, wrappers: &[&str]) -> Result<String, ParseError> {
    let value = json(body)?;
    let id_of = |v: &JsonValue| v.get("_id").and_then(JsonValue::as_str).map(str::to_string);

    id_of(value)
        .or_else(|| wrappers.iter().find_map(|key| value.get(*key).and_then(id_of)))
        .ok_or_else(|| ParseError::UnexpectedShape("no _id in response".to_string()))
}

/// String field at the top level of the body
pub fn parse_token(body: &ResponseBody, field: &str) -> Result<String, ParseError> {
    json(body)?
        .get(field)
        .and_then(JsonValue::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ParseError::UnexpectedShape(format!("missing string field '{}'", field)))
}

/// Server guidance attached to a rate-limited response
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryAdvice {
    After(Duration),
    Missing,
    Malformed,
}

/// Read `retryAfter` (seconds) from the body, falling back to the
/// `Retry-After` header
pub fn parse_retry_after(response: &TransportResponse) -> RetryAdvice {
    let from_body = response.json_body().and_then(|body| body.get("retryAfter"));

    let seconds = match from_body {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => match response.header("retry-after") {
            Some(header) => header.trim().parse::<f64>().ok(),
            None => return RetryAdvice::Missing,
        },
    };

    // Negative, NaN and out-of-range values are all unusable
    match seconds.map(Duration::try_from_secs_f64) {
        Some(Ok(delay)) => RetryAdvice::After(delay),
        _ => RetryAdvice::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_books_bare_and_wrapped() {
        let bare = ResponseBody::Json(json!([{"_id": "b1", "available": true}, {"_id": "b2"}]));
        let books = parse_books(&bare).unwrap();
        assert_eq!(books.len(), 2);
        assert!(books[0].is_available());
        assert!(!books[1].is_available());

        let wrapped = ResponseBody::Json(json!({"books": [{"_id": "b3", "title": "Dune"}], "total": 1}));
        assert_eq!(parse_books(&wrapped).unwrap()[0].title.as_deref(), Some("Dune"));
    }

    #[test]
    fn test_books_malformed_is_an_error() {
        assert_eq!(parse_books(&ResponseBody::Empty), Err(ParseError::Empty));
        assert!(matches!(
            parse_books(&ResponseBody::from_bytes(b"<html>")),
            Err(ParseError::NotJson(_))
        ));
        assert!(matches!(
            parse_books(&ResponseBody::Json(json!({"status": "ok"}))),
            Err(ParseError::UnexpectedShape(_))
        ));
        // An entry without an id does not become a default book
        assert!(parse_books(&ResponseBody::Json(json!([{"title": "x"}]))).is_err());
    }

    #[test]
    fn test_created_id_lookup() {
        let book = ResponseBody::Json(json!({"_id": "b1", "title": "t"}));
        assert_eq!(parse_created_id(&book, &["book"]).unwrap(), "b1");

        let borrow = ResponseBody::Json(json!({"status": "success", "borrow": {"_id": "r1"}}));
        assert_eq!(parse_created_id(&borrow, &["borrow"]).unwrap(), "r1");

        assert!(parse_created_id(&ResponseBody::Json(json!({"ok": true})), &["borrow"]).is_err());
    }

    #[test]
    fn test_notifications() {
        let body = ResponseBody::Json(json!({
            "status": "success",
            "notifications": [{"_id": "n1", "read": false}, {"_id": "n2", "read": true}],
            "unreadCount": 1
        }));
        let notifications = parse_notifications(&body).unwrap();
        assert_eq!(notifications.len(), 2);
        assert!(!notifications[0].read);
        assert!(notifications[1].read);
    }

    #[test]
    fn test_retry_after_sources() {
        let body = TransportResponse::json(429, json!({"retryAfter": 2}));
        assert_eq!(parse_retry_after(&body), RetryAdvice::After(Duration::from_secs(2)));

        let text = TransportResponse::json(429, json!({"retryAfter": "3"}));
        assert_eq!(parse_retry_after(&text), RetryAdvice::After(Duration::from_secs(3)));

        let header = TransportResponse::empty(429).with_header("Retry-After", "4");
        assert_eq!(parse_retry_after(&header), RetryAdvice::After(Duration::from_secs(4)));

        assert_eq!(parse_retry_after(&TransportResponse::empty(429)), RetryAdvice::Missing);
        assert_eq!(
            parse_retry_after(&TransportResponse::json(429, json!({"retryAfter": "soon"}))),
            RetryAdvice::Malformed
        );
        assert_eq!(
            parse_retry_after(&TransportResponse::json(429, json!({"retryAfter": -1}))),
            RetryAdvice::Malformed
        );
    }

    #[test]
    fn test_retry_after_too_large_for_a_duration() {
        assert_eq!(
            parse_retry_after(&TransportResponse::json(429, json!({"retryAfter": 1e20}))),
            RetryAdvice::Malformed
        );
        let header = TransportResponse::empty(429).with_header("Retry-After", "1e300");
        assert_eq!(parse_retry_after(&header), RetryAdvice::Malformed);
        let fractional = TransportResponse::json(429, json!({"retryAfter": 0.25}));
        assert_eq!(parse_retry_after(&fractional), RetryAdvice::After(Duration::from_millis(250)));
    }

    #[test]
    fn test_token() {
        let body = ResponseBody::Json(json!({"accessToken": "abc"}));
        assert_eq!(parse_token(&body, "accessToken").unwrap(), "abc");
        assert!(parse_token(&body, "token").is_err());
        assert!(parse_token(&ResponseBody::Json(json!({"accessToken": ""})), "accessToken").is_err());
    }
}
