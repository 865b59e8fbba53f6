use super::{TokenStorage, decode_secret, encode_secret};
use crate::config::{CsrfConfig, SameSite};
use crate::context::{HttpRequest, HttpResponse};
use crate::error::StorageError;
use bulwark_log::debug;
use chrono::{Duration, Utc};
use http::header::SET_COOKIE;

/// Stores the secret base64-encoded in a browser cookie.
///
/// The incoming value is read from the request's `Cookie` header. A new
/// value becomes a pending `Set-Cookie` header that [`commit`] writes to
/// the response; once committed, headers count as sent and storing fails.
///
/// [`commit`]: TokenStorage::commit
#[derive(Debug, Clone)]
pub struct CookieStorage {
    name: String,
    path: String,
    domain: Option<String>,
    lifetime: i64,
    secure: bool,
    http_only: bool,
    same_site: SameSite,
    current: Option<String>,
    pending: Option<String>,
    headers_sent: bool,
}

impl CookieStorage {
    /// Cookie storage with no incoming cookie.
    pub fn new(config: &CsrfConfig) -> Self {
        Self {
            name: config.storage_name.clone(),
            path: config.cookie_path.clone(),
            domain: config.cookie_domain.clone(),
            lifetime: config.cookie_lifetime,
            secure: config.cookie_secure,
            http_only: config.cookie_http_only,
            same_site: config.cookie_same_site,
            current: None,
            pending: None,
            headers_sent: false,
        }
    }

    /// Cookie storage seeded from the request's cookies.
    pub fn from_request(config: &CsrfConfig, request: &HttpRequest) -> Self {
        let mut storage = Self::new(config);
        storage.current = request.cookie(&config.storage_name);
        storage
    }

    /// Record that response headers went out; later writes fail.
    pub fn mark_headers_sent(&mut self) {
        self.headers_sent = true;
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// The `Set-Cookie` value waiting to be committed.
    pub fn pending_cookie(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    fn set_cookie_value(&self, value: &str) -> Result<String, StorageError> {
        let mut cookie = format!("{}={}; Path={}", self.name, value, self.path);

        if let Some(ref domain) = self.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }

        if self.lifetime > 0 {
            let expires = Duration::try_seconds(self.lifetime)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                .ok_or(StorageError::InvalidLifetime(self.lifetime))?;
            cookie.push_str(&format!(
                "; Expires={}; Max-Age={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT"),
                self.lifetime
            ));
        }

        if self.secure {
            cookie.push_str("; Secure");
        }

        if self.http_only {
            cookie.push_str("; HttpOnly");
        }

        cookie.push_str(&format!("; SameSite={}", self.same_site.as_str()));
        Ok(cookie)
    }
}

impl TokenStorage for CookieStorage {
    fn store_token(&mut self, secret: &[u8]) -> Result<(), StorageError> {
        if self.headers_sent {
            return Err(StorageError::HeadersSent);
        }

        let encoded = encode_secret(secret);
        self.pending = Some(self.set_cookie_value(&encoded)?);
        self.current = Some(encoded);
        Ok(())
    }

    fn get_stored_token(&mut self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.current.as_deref().and_then(decode_secret))
    }

    fn commit(&mut self, response: &mut HttpResponse) {
        if let Some(cookie) = self.pending.take() {
            debug!(target: "bulwark::csrf::storage", "Writing {} cookie", self.name);
            response.headers.insert(SET_COOKIE.as_str().to_string(), cookie);
        }
        self.headers_sent = true;
    }
}
