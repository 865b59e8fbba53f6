//! Locations a submitted token is read from.

mod header;
mod post;

pub use header::HeaderSource;
pub use post::PostSource;

use crate::context::HttpRequest;

/// Extracts a submitted token from a request. Read-only.
pub trait TokenSource: Send + Sync {
    /// The submitted token, or `None` if this source has none.
    fn get_request_token(&self, request: &HttpRequest) -> Option<String>;
}

/// Query `sources` in order and return the first token found.
pub fn first_token(sources: &[Box<dyn TokenSource>], request: &HttpRequest) -> Option<String> {
    sources.iter().find_map(|source| source.get_request_token(request))
}
