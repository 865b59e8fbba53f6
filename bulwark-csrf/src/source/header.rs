use super::TokenSource;
use crate::context::HttpRequest;

/// Reads the token from a request header, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct HeaderSource {
    header_name: String,
}

impl HeaderSource {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }
}

impl Default for HeaderSource {
    fn default() -> Self {
        Self::new("X-CSRF-Token")
    }
}

impl TokenSource for HeaderSource {
    fn get_request_token(&self, request: &HttpRequest) -> Option<String> {
        request
            .header(&self.header_name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}
