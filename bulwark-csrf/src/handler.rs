use crate::codec::{MaskedToken, TokenCodec};
use crate::config::CsrfConfig;
use crate::context::{HttpRequest, HttpResponse};
use crate::error::{CsrfError, Result};
use crate::random::{OsRandom, RandomSource, random_bytes};
use crate::source::{HeaderSource, PostSource, TokenSource, first_token};
use crate::storage::{CookieStorage, SessionHandle, SessionStorage, TokenStorage};
use bulwark_log::{debug, error, warn};
use std::fmt;
use std::sync::Arc;

const LOG_TARGET: &str = "bulwark::csrf";

/// Anything that can hand out tokens for embedding in a page.
pub trait TokenIssuer {
    fn get_token(&mut self) -> Result<String>;
}

/// Issues and validates anti-forgery tokens for one request.
///
/// The secret is loaded from storage on first use, or generated and stored
/// if storage holds nothing usable. Each issued token masks that secret
/// with a fresh random key, so every call to [`get_token`] returns a
/// different string and all of them validate until the secret is
/// regenerated.
///
/// [`get_token`]: CsrfHandler::get_token
pub struct CsrfHandler {
    config: Arc<CsrfConfig>,
    codec: TokenCodec,
    storage: Box<dyn TokenStorage>,
    sources: Vec<Box<dyn TokenSource>>,
    random: Arc<dyn RandomSource>,
    secret: Option<Vec<u8>>,
}

impl CsrfHandler {
    /// Create a handler storing its secret in `storage`.
    ///
    /// Submitted tokens are looked up in the configured form field first,
    /// then in the configured header.
    pub fn new(
        config: impl Into<Arc<CsrfConfig>>,
        storage: impl TokenStorage + 'static,
    ) -> Result<Self> {
        let config = config.into();
        config.validate()?;

        let sources: Vec<Box<dyn TokenSource>> = vec![
            Box::new(PostSource::new(config.field_name.clone())),
            Box::new(HeaderSource::new(config.header_name.clone())),
        ];

        Ok(Self {
            codec: TokenCodec::new(config.token_length, config.mask_policy),
            storage: Box::new(storage),
            sources,
            random: Arc::new(OsRandom),
            secret: None,
            config,
        })
    }

    /// Handler keeping the secret in a cookie read from `request`.
    pub fn with_cookies(
        config: impl Into<Arc<CsrfConfig>>,
        request: &HttpRequest,
    ) -> Result<Self> {
        let config = config.into();
        let storage = CookieStorage::from_request(&config, request);
        Self::new(config, storage)
    }

    /// Handler keeping the secret in a session variable.
    pub fn with_session(config: impl Into<Arc<CsrfConfig>>, session: SessionHandle) -> Result<Self> {
        let config = config.into();
        let storage = SessionStorage::new(session, config.storage_name.clone());
        Self::new(config, storage)
    }

    /// Replace the random byte source.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Replace the ordered list of token sources.
    pub fn with_sources(mut self, sources: Vec<Box<dyn TokenSource>>) -> Self {
        self.sources = sources;
        self
    }

    /// Append a token source with the lowest priority.
    pub fn add_source(mut self, source: impl TokenSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// The current secret, loading or generating it on first access.
    pub fn true_secret(&mut self) -> Result<&[u8]> {
        let secret = match self.secret.take() {
            Some(secret) => secret,
            None => self.load_secret()?,
        };
        Ok(self.secret.insert(secret).as_slice())
    }

    /// Drop the cached secret and read it from storage again.
    ///
    /// Use after the secret may have been regenerated elsewhere.
    pub fn reload_secret(&mut self) -> Result<&[u8]> {
        self.secret = None;
        self.true_secret()
    }

    /// Mask the secret with a fresh key.
    pub fn issue(&mut self) -> Result<MaskedToken> {
        let key = random_bytes(self.random.as_ref(), self.codec.token_length())?;
        let codec = self.codec;
        let secret = self.true_secret()?;
        Ok(codec.issue(secret, key))
    }

    /// A new encoded token for the current secret.
    pub fn get_token(&mut self) -> Result<String> {
        let token = self.issue()?;
        Ok(self.codec.encode(&token))
    }

    /// Replace the secret, invalidating every token issued so far.
    pub fn regenerate_token(&mut self) -> Result<&mut Self> {
        let previous = match self.secret.take() {
            Some(secret) => Some(secret),
            None => self.stored_secret()?,
        };

        let secret = self.generate_secret(previous.as_deref())?;
        self.secret = Some(secret);
        debug!(target: LOG_TARGET, "Regenerated secret; earlier tokens no longer validate");
        Ok(self)
    }

    /// Check a submitted token against the current secret.
    ///
    /// Malformed tokens yield `Ok(false)`; only storage and entropy faults
    /// are errors.
    pub fn validate_token(&mut self, token: &str) -> Result<bool> {
        let Some(decoded) = self.codec.decode(token) else {
            debug!(target: LOG_TARGET, "Submitted token is malformed");
            return Ok(false);
        };

        let codec = self.codec;
        let secret = self.true_secret()?;
        Ok(codec.verify(secret, &decoded))
    }

    /// Whether requests with `method` must carry a valid token.
    pub fn is_validated_request(&self, method: &str) -> bool {
        self.config.is_validated_method(method)
    }

    /// The submitted token from the first source that has one.
    pub fn get_request_token(&self, request: &HttpRequest) -> Option<String> {
        first_token(&self.sources, request)
    }

    /// Validate `request`, loading or storing the secret on the way.
    ///
    /// Call before the response headers are committed. Requests with
    /// methods outside the validated set always pass. On failure, returns
    /// [`CsrfError::InvalidToken`] when `throw_on_failure` is set and
    /// otherwise [`CsrfError::Rejected`] carrying the 400 response the host
    /// must send before stopping.
    pub fn validate_request(&mut self, request: &HttpRequest, throw_on_failure: bool) -> Result<bool> {
        self.guard_request(request, throw_on_failure, |handler, token| {
            handler.validate_token(token)
        })
    }

    pub(crate) fn guard_request<F>(
        &mut self,
        request: &HttpRequest,
        throw_on_failure: bool,
        validate: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut Self, &str) -> Result<bool>,
    {
        self.true_secret()?;

        if !self.is_validated_request(&request.method) {
            return Ok(true);
        }

        let reason = match self.get_request_token(request) {
            Some(token) => {
                if validate(self, &token)? {
                    return Ok(true);
                }
                "invalid"
            }
            None => "missing",
        };

        warn!(
            target: LOG_TARGET,
            "Rejected {} {}: {} CSRF token", request.method, request.path, reason
        );

        if throw_on_failure {
            Err(CsrfError::InvalidToken)
        } else {
            Err(CsrfError::Rejected(Box::new(HttpResponse::bad_request())))
        }
    }

    /// Write pending storage state (such as the secret cookie) into
    /// `response`. The secret cannot be stored again afterwards.
    pub fn commit(&mut self, response: &mut HttpResponse) {
        self.storage.commit(response);
    }

    fn stored_secret(&mut self) -> Result<Option<Vec<u8>>> {
        self.storage.get_stored_token().map_err(|e| {
            error!(target: LOG_TARGET, "Failed to load secret: {}", e);
            CsrfError::from(e)
        })
    }

    fn load_secret(&mut self) -> Result<Vec<u8>> {
        match self.stored_secret()? {
            Some(secret) if secret.len() == self.codec.token_length() => Ok(secret),
            Some(secret) => {
                debug!(
                    target: LOG_TARGET,
                    "Stored secret has {} bytes instead of {}; replacing it",
                    secret.len(),
                    self.codec.token_length()
                );
                self.generate_secret(Some(&secret))
            }
            None => {
                debug!(target: LOG_TARGET, "No stored secret; generating one");
                self.generate_secret(None)
            }
        }
    }

    fn generate_secret(&mut self, previous: Option<&[u8]>) -> Result<Vec<u8>> {
        let secret = loop {
            let candidate = random_bytes(self.random.as_ref(), self.codec.token_length())?;
            if previous != Some(candidate.as_slice()) {
                break candidate;
            }
        };

        self.storage.store_token(&secret).map_err(|e| {
            error!(target: LOG_TARGET, "Failed to store secret: {}", e);
            CsrfError::from(e)
        })?;

        Ok(secret)
    }
}

impl TokenIssuer for CsrfHandler {
    fn get_token(&mut self) -> Result<String> {
        CsrfHandler::get_token(self)
    }
}

impl fmt::Debug for CsrfHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfHandler")
            .field("config", &self.config)
            .field("sources", &self.sources.len())
            .field("secret_loaded", &self.secret.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MaskPolicy;
    use crate::error::StorageError;
    use crate::random::{FailingRandom, FixedRandom};
    use crate::storage::Session;
    use base64::{Engine, engine::general_purpose::STANDARD};

    fn session_handler() -> (CsrfHandler, SessionHandle) {
        let session = SessionHandle::start(Session::new("test"));
        let handler = CsrfHandler::with_session(CsrfConfig::default(), session.clone()).unwrap();
        (handler, session)
    }

    fn flip_bit(token: &str, byte: usize, bit: u8) -> String {
        let mut raw = STANDARD.decode(token).unwrap();
        raw[byte] ^= 1 << bit;
        STANDARD.encode(raw)
    }

    #[test]
    fn test_secret_is_generated_and_stored() {
        let (mut handler, session) = session_handler();
        let secret = handler.true_secret().unwrap().to_vec();
        assert_eq!(secret.len(), 32);

        let stored: String = session.snapshot().unwrap().get("csrf_token").unwrap();
        assert_eq!(STANDARD.decode(stored).unwrap(), secret);
        assert_eq!(handler.true_secret().unwrap(), secret.as_slice());
    }

    #[test]
    fn test_wrong_length_secret_is_replaced() {
        let mut session = Session::new("test");
        session.set("csrf_token", STANDARD.encode([7u8; 10])).unwrap();
        let session = SessionHandle::start(session);

        let mut handler = CsrfHandler::with_session(CsrfConfig::default(), session).unwrap();
        let secret = handler.true_secret().unwrap();
        assert_eq!(secret.len(), 32);
        assert_ne!(secret, [7u8; 32].as_slice());
    }

    #[test]
    fn test_tokens_differ_but_both_validate() {
        let (mut handler, _) = session_handler();
        let a = handler.get_token().unwrap();
        let b = handler.get_token().unwrap();

        assert_ne!(a, b);
        assert!(handler.validate_token(&a).unwrap());
        assert!(handler.validate_token(&b).unwrap());
    }

    #[test]
    fn test_single_bit_flips_fail() {
        for policy in [MaskPolicy::Xor, MaskPolicy::HmacSha256] {
            let session = SessionHandle::start(Session::new("test"));
            let config = CsrfConfig::default().with_mask_policy(policy);
            let mut handler = CsrfHandler::with_session(config, session).unwrap();
            let token = handler.get_token().unwrap();

            for byte in 0..64 {
                for bit in 0..8 {
                    let forged = flip_bit(&token, byte, bit);
                    assert!(
                        !handler.validate_token(&forged).unwrap(),
                        "{:?}: flip of byte {} bit {} validated",
                        policy,
                        byte,
                        bit
                    );
                }
            }
            assert!(handler.validate_token(&token).unwrap());
        }
    }

    #[test]
    fn test_regenerate_invalidates_tokens() {
        let (mut handler, _) = session_handler();
        let token = handler.get_token().unwrap();
        let before = handler.true_secret().unwrap().to_vec();

        handler.regenerate_token().unwrap();
        assert_ne!(handler.true_secret().unwrap(), before.as_slice());
        assert!(!handler.validate_token(&token).unwrap());
        assert!(handler.get_token().is_ok());
    }

    #[test]
    fn test_regenerate_retries_on_collision() {
        let session = SessionHandle::start(Session::new("test"));
        let random = Arc::new(FixedRandom::sequence(vec![
            vec![1; 32],
            vec![1; 32],
            vec![2; 32],
        ]));
        let mut handler = CsrfHandler::with_session(CsrfConfig::default(), session)
            .unwrap()
            .with_random(random.clone());

        assert_eq!(handler.true_secret().unwrap(), [1u8; 32].as_slice());
        handler.regenerate_token().unwrap();
        assert_eq!(handler.true_secret().unwrap(), [2u8; 32].as_slice());
        assert_eq!(random.remaining(), 0);
    }

    #[test]
    fn test_malformed_tokens_are_false() {
        let (mut handler, _) = session_handler();
        assert!(!handler.validate_token("").unwrap());
        assert!(!handler.validate_token("***").unwrap());
        assert!(!handler.validate_token(&STANDARD.encode([0u8; 32])).unwrap());
        assert!(!handler.validate_token(&STANDARD.encode([0u8; 65])).unwrap());
    }

    #[test]
    fn test_storage_fault_propagates() {
        let mut handler =
            CsrfHandler::with_session(CsrfConfig::default(), SessionHandle::inactive()).unwrap();
        let err = handler.get_token().unwrap_err();
        assert!(matches!(err, CsrfError::Storage(StorageError::SessionInactive)));

        let token = STANDARD.encode([0u8; 64]);
        assert!(handler.validate_token(&token).is_err());
    }

    #[test]
    fn test_entropy_fault_propagates() {
        let (handler, _) = session_handler();
        let mut handler = handler.with_random(Arc::new(FailingRandom));
        assert!(matches!(handler.get_token(), Err(CsrfError::Entropy(_))));
    }

    #[test]
    fn test_reload_sees_external_regeneration() {
        let session = SessionHandle::start(Session::new("test"));
        let mut first = CsrfHandler::with_session(CsrfConfig::default(), session.clone()).unwrap();
        let mut second = CsrfHandler::with_session(CsrfConfig::default(), session).unwrap();

        let token = first.get_token().unwrap();
        assert!(second.validate_token(&token).unwrap());

        second.regenerate_token().unwrap();
        assert!(first.validate_token(&token).unwrap());
        first.reload_secret().unwrap();
        assert!(!first.validate_token(&token).unwrap());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CsrfConfig::default().with_token_length(4);
        let result = CsrfHandler::with_session(config, SessionHandle::inactive());
        assert!(matches!(result, Err(CsrfError::Config(_))));
    }

    #[test]
    fn test_oversized_cookie_lifetime_is_rejected() {
        let config = CsrfConfig::default().with_cookie_lifetime(i64::MAX);
        let result = CsrfHandler::with_cookies(config, &HttpRequest::new("GET", "/"));
        assert!(matches!(result, Err(CsrfError::Config(_))));
    }

    #[test]
    fn test_debug_does_not_print_secret() {
        let (mut handler, _) = session_handler();
        let secret = STANDARD.encode(handler.true_secret().unwrap());
        let printed = format!("{:?}", handler);
        assert!(printed.contains("secret_loaded: true"));
        assert!(!printed.contains(&secret));
    }
}
