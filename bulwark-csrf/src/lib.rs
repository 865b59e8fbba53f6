//! # Bulwark CSRF Protection
//!
//! Anti-forgery tokens bound to a server-held secret.
//!
//! ## Features
//!
//! - ✅ **Masked Tokens** - Every issued token masks the secret with a fresh
//!   random key, so no token repeats on the wire (BREACH resistant)
//! - ✅ **Two Masking Policies** - One-way HMAC-SHA256 (default) or XOR
//! - ✅ **Constant-time Checks** - Validation never leaks where a mismatch sits
//! - ✅ **Pluggable Storage** - Secret kept in a cookie or a session
//! - ✅ **Pluggable Sources** - Token read from a form field or a header
//! - ✅ **One-time Tokens** - Nonce variant accepting each token at most once
//!
//! ## Quick Start
//!
//! ```rust
//! use bulwark_csrf::{CsrfConfig, CsrfHandler, HttpRequest, HttpResponse};
//!
//! // Rendering a form: the secret cookie is created on first use
//! let request = HttpRequest::new("GET", "/form");
//! let mut csrf = CsrfHandler::with_cookies(CsrfConfig::default(), &request).unwrap();
//! csrf.validate_request(&request, true).unwrap();
//! let token = csrf.get_token().unwrap();
//!
//! let mut response = HttpResponse::ok();
//! csrf.commit(&mut response);
//! let cookie = response.set_cookie().unwrap().split(';').next().unwrap().to_string();
//!
//! // Submitting the form on the next request
//! let submit = HttpRequest::new("POST", "/form")
//!     .with_header("Cookie", cookie)
//!     .with_form(&[("csrf_token", token.as_str())]);
//! let mut csrf = CsrfHandler::with_cookies(CsrfConfig::default(), &submit).unwrap();
//! assert!(csrf.validate_request(&submit, true).unwrap());
//! ```
//!
//! ## Rejection Modes
//!
//! ```rust
//! use bulwark_csrf::{CsrfConfig, CsrfError, CsrfHandler, HttpRequest};
//!
//! let forged = HttpRequest::new("POST", "/transfer");
//! let mut csrf = CsrfHandler::with_cookies(CsrfConfig::default(), &forged).unwrap();
//!
//! // Typed error, the caller decides what to answer
//! assert!(matches!(csrf.validate_request(&forged, true), Err(CsrfError::InvalidToken)));
//!
//! // Ready-made 400 response the host sends before stopping
//! match csrf.validate_request(&forged, false) {
//!     Err(CsrfError::Rejected(response)) => assert_eq!(response.status, 400),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```
//!
//! ## One-time Tokens
//!
//! ```rust
//! use bulwark_csrf::{CsrfConfig, NonceHandler, Session, SessionHandle};
//!
//! let session = SessionHandle::start(Session::new("sid"));
//! let mut nonce = NonceHandler::new(CsrfConfig::default(), session).unwrap();
//!
//! let token = nonce.get_token().unwrap();
//! assert!(nonce.validate_token(&token).unwrap());
//! assert!(!nonce.validate_token(&token).unwrap());
//! ```

pub mod codec;
pub mod compare;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod nonce;
pub mod random;
pub mod single;
pub mod source;
pub mod storage;

pub use codec::{MaskPolicy, MaskedToken, TokenCodec};
pub use compare::timed_equals;
pub use config::{CsrfConfig, SameSite};
pub use context::{HttpRequest, HttpResponse};
pub use error::{CsrfError, Result, StorageError};
pub use handler::{CsrfHandler, TokenIssuer};
pub use nonce::{NonceEntry, NonceHandler, NonceLedger};
pub use random::{FailingRandom, FixedRandom, OsRandom, RandomSource};
pub use single::SingleToken;
pub use source::{HeaderSource, PostSource, TokenSource};
pub use storage::{CookieStorage, Session, SessionHandle, SessionStorage, TokenStorage};
