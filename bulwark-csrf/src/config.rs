use crate::codec::MaskPolicy;
use crate::error::{CsrfError, Result};
use http::header::HeaderName;
use serde::{Deserialize, Serialize};

/// Smallest secret length accepted, in bytes.
pub const MIN_TOKEN_LENGTH: usize = 16;

/// Largest secret length accepted, in bytes.
pub const MAX_TOKEN_LENGTH: usize = 1024;

/// Longest cookie lifetime accepted, in seconds (400 days, the browser cap).
pub const MAX_COOKIE_LIFETIME: i64 = 400 * 24 * 60 * 60;

/// CSRF protection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Length of the secret and of each masking key, in bytes
    pub token_length: usize,

    /// How the secret is masked for each issued token
    pub mask_policy: MaskPolicy,

    /// Cookie or session variable holding the secret
    pub storage_name: String,

    /// Session variable holding the nonce ledger
    pub nonce_storage_name: String,

    /// Form field carrying the submitted token
    pub field_name: String,

    /// Header carrying the submitted token
    pub header_name: String,

    /// Methods whose requests must carry a valid token
    pub validated_methods: Vec<String>,

    /// Cookie path
    pub cookie_path: String,

    /// Cookie domain
    pub cookie_domain: Option<String>,

    /// Cookie lifetime in seconds, 0 for a browser-session cookie
    pub cookie_lifetime: i64,

    /// Cookie secure flag (HTTPS only)
    pub cookie_secure: bool,

    /// Cookie HttpOnly flag
    pub cookie_http_only: bool,

    /// Cookie SameSite policy
    pub cookie_same_site: SameSite,
}

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_length: 32,
            mask_policy: MaskPolicy::default(),
            storage_name: "csrf_token".to_string(),
            nonce_storage_name: "csrf_nonces".to_string(),
            field_name: "csrf_token".to_string(),
            header_name: "X-CSRF-Token".to_string(),
            validated_methods: vec!["POST".to_string(), "PUT".to_string(), "DELETE".to_string()],
            cookie_path: "/".to_string(),
            cookie_domain: None,
            cookie_lifetime: 0,
            cookie_secure: false,
            cookie_http_only: true,
            cookie_same_site: SameSite::Lax,
        }
    }
}

impl CsrfConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that the configuration can be used to issue tokens
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&self.token_length) {
            return Err(CsrfError::Config(format!(
                "token length must be between {} and {} bytes, got {}",
                MIN_TOKEN_LENGTH, MAX_TOKEN_LENGTH, self.token_length
            )));
        }

        if self.storage_name.is_empty() || self.nonce_storage_name.is_empty() {
            return Err(CsrfError::Config("storage names must not be empty".to_string()));
        }

        if self.storage_name == self.nonce_storage_name {
            return Err(CsrfError::Config(
                "secret and nonce ledger must use different storage names".to_string(),
            ));
        }

        if self.field_name.is_empty() {
            return Err(CsrfError::Config("form field name must not be empty".to_string()));
        }

        HeaderName::from_bytes(self.header_name.as_bytes()).map_err(|_| {
            CsrfError::Config(format!("'{}' is not a valid header name", self.header_name))
        })?;

        if self.cookie_lifetime < 0 {
            return Err(CsrfError::Config("cookie lifetime must not be negative".to_string()));
        }

        if self.cookie_lifetime > MAX_COOKIE_LIFETIME {
            return Err(CsrfError::Config(format!(
                "cookie lifetime must be at most {} seconds",
                MAX_COOKIE_LIFETIME
            )));
        }

        if self.cookie_same_site == SameSite::None && !self.cookie_secure {
            return Err(CsrfError::Config(
                "SameSite=None cookies must also be marked Secure".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether requests with `method` must carry a valid token
    pub fn is_validated_method(&self, method: &str) -> bool {
        self.validated_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.trim()))
    }

    /// Set the secret length in bytes
    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length;
        self
    }

    /// Set the masking policy
    pub fn with_mask_policy(mut self, policy: MaskPolicy) -> Self {
        self.mask_policy = policy;
        self
    }

    /// Set the cookie or session variable name for the secret
    pub fn with_storage_name(mut self, name: impl Into<String>) -> Self {
        self.storage_name = name.into();
        self
    }

    /// Set the session variable name for the nonce ledger
    pub fn with_nonce_storage_name(mut self, name: impl Into<String>) -> Self {
        self.nonce_storage_name = name.into();
        self
    }

    /// Set field name
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Set header name
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Replace the set of validated methods
    pub fn with_validated_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validated_methods = methods
            .into_iter()
            .map(|m| m.into().to_ascii_uppercase())
            .collect();
        self
    }

    /// Set cookie path
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Set cookie domain
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set cookie lifetime in seconds
    pub fn with_cookie_lifetime(mut self, seconds: i64) -> Self {
        self.cookie_lifetime = seconds;
        self
    }

    /// Set cookie secure flag
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Set cookie HttpOnly flag
    pub fn with_cookie_http_only(mut self, http_only: bool) -> Self {
        self.cookie_http_only = http_only;
        self
    }

    /// Set cookie SameSite policy
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }
}
