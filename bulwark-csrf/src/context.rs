//! Request and response context passed explicitly through validation.

use http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use http::StatusCode;
use std::collections::HashMap;

/// The parts of an inbound request the token protocol reads.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    /// Header names are kept lowercase; a repeated name replaces the earlier value
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.headers.insert(name, value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set an `application/x-www-form-urlencoded` body from field pairs.
    pub fn with_form(self, fields: &[(&str, &str)]) -> Self {
        let body = serde_urlencoded::to_string(fields).unwrap_or_default();
        self.with_header(CONTENT_TYPE.as_str(), "application/x-www-form-urlencoded")
            .with_body(body)
    }

    /// Look up a header by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the body was declared as JSON.
    pub fn is_json(&self) -> bool {
        self.header(CONTENT_TYPE.as_str())
            .map(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false)
    }

    /// Cookies sent with the request, keyed by name.
    pub fn cookies(&self) -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        let Some(raw) = self.header(COOKIE.as_str()) else {
            return cookies;
        };

        for pair in raw.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    cookies
                        .entry(name.to_string())
                        .or_insert_with(|| value.trim().trim_matches('"').to_string());
                }
            }
        }

        cookies
    }

    /// A single request cookie by name.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }
}

/// Outbound response a host sends after protection has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK.as_u16())
    }

    /// The terminal response for a request that failed validation.
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST.as_u16())
            .with_header(CONTENT_TYPE.as_str(), "text/plain; charset=utf-8")
            .with_body(b"Bad Request".to_vec())
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// The `Set-Cookie` header, if one was written.
    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(SET_COOKIE.as_str()))
            .map(|(_, value)| value.as_str())
    }
}
