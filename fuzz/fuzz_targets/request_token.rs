//! Fuzz target for extracting submitted tokens from requests.
//!
//! Exercises header lookup, cookie parsing, form and JSON body parsing.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use bulwark_csrf::{
    CookieStorage, CsrfConfig, HeaderSource, HttpRequest, PostSource, TokenSource, TokenStorage,
};

#[derive(Debug, Arbitrary)]
struct FuzzRequest {
    method: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

fuzz_target!(|data: FuzzRequest| {
    let mut request = HttpRequest::new(data.method, "/").with_body(data.body);
    for (name, value) in data.headers {
        request = request.with_header(name, value);
    }

    let _ = request.cookies();
    let _ = request.is_json();

    if let Some(token) = PostSource::default().get_request_token(&request) {
        assert!(!token.is_empty());
    }
    if let Some(token) = HeaderSource::default().get_request_token(&request) {
        assert!(!token.is_empty());
    }

    let config = CsrfConfig::default();
    let mut storage = CookieStorage::from_request(&config, &request);
    if let Ok(Some(secret)) = storage.get_stored_token() {
        assert!(!secret.is_empty());
    }
});
