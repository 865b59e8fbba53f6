use crate::error::Result;
use crate::handler::TokenIssuer;
use once_cell::unsync::OnceCell;
use std::cell::RefCell;
use std::fmt;

/// One token per page.
///
/// Requests a token from the issuer the first time it is needed and returns
/// that same string on every later access, so a page embedding the token
/// in several forms draws only one masking key (and, with a
/// [`NonceHandler`](crate::NonceHandler), registers only one nonce).
///
/// Issue through [`token`](Self::token) so storage and entropy faults
/// surface as errors. `Display` only renders a token already issued and
/// writes nothing otherwise.
///
/// ```rust
/// use bulwark_csrf::{CsrfConfig, CsrfHandler, Session, SessionHandle, SingleToken};
///
/// let session = SessionHandle::start(Session::new("sid"));
/// let mut csrf = CsrfHandler::with_session(CsrfConfig::default(), session).unwrap();
///
/// let token = SingleToken::new(&mut csrf);
/// let first = token.token().unwrap().to_string();
/// assert_eq!(first, token.to_string());
/// ```
pub struct SingleToken<'a, I: TokenIssuer + ?Sized> {
    issuer: RefCell<&'a mut I>,
    token: OnceCell<String>,
}

impl<'a, I: TokenIssuer + ?Sized> SingleToken<'a, I> {
    pub fn new(issuer: &'a mut I) -> Self {
        Self {
            issuer: RefCell::new(issuer),
            token: OnceCell::new(),
        }
    }

    /// The token, issued on first call.
    pub fn token(&self) -> Result<&str> {
        self.token
            .get_or_try_init(|| self.issuer.borrow_mut().get_token())
            .map(String::as_str)
    }

    /// Whether the token has been issued yet.
    pub fn is_issued(&self) -> bool {
        self.token.get().is_some()
    }

    /// The issued token, if any, releasing the issuer.
    pub fn into_token(self) -> Option<String> {
        self.token.into_inner()
    }
}

impl<I: TokenIssuer + ?Sized> fmt::Display for SingleToken<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token.get().map(String::as_str).unwrap_or_default())
    }
}
