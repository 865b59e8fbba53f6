use super::TokenSource;
use crate::context::HttpRequest;

/// Reads the token from a form field in the request body.
///
/// Accepts `application/x-www-form-urlencoded` bodies and JSON object
/// bodies. An empty field counts as absent.
#[derive(Debug, Clone)]
pub struct PostSource {
    field_name: String,
}

impl PostSource {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
        }
    }

    fn read_json(&self, body: &[u8]) -> Option<String> {
        let json = serde_json::from_slice::<serde_json::Value>(body).ok()?;
        json.get(&self.field_name)?.as_str().map(str::to_string)
    }

    fn read_form(&self, body: &[u8]) -> Option<String> {
        let fields = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body).ok()?;
        fields
            .into_iter()
            .find(|(key, _)| *key == self.field_name)
            .map(|(_, value)| value)
    }
}

impl Default for PostSource {
    fn default() -> Self {
        Self::new("csrf_token")
    }
}

impl TokenSource for PostSource {
    fn get_request_token(&self, request: &HttpRequest) -> Option<String> {
        if request.body.is_empty() {
            return None;
        }

        let token = if request.is_json() {
            self.read_json(&request.body)
        } else {
            self.read_form(&request.body)
                .or_else(|| self.read_json(&request.body))
        };

        token.filter(|value| !value.is_empty())
    }
}
