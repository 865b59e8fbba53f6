// Bulwark - Request-forgery protection for Rust web applications
//
// This library issues masked anti-forgery tokens bound to a secret kept in a
// cookie or session, and validates them on state-changing requests.

// Re-export the token system
pub use bulwark_csrf::*;

// Re-export logging
pub use bulwark_log as log;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CookieStorage,
        CsrfConfig,
        CsrfError,
        CsrfHandler,
        HeaderSource,
        HttpRequest,
        HttpResponse,
        MaskPolicy,
        NonceHandler,
        PostSource,
        RandomSource,
        SameSite,
        Session,
        SessionHandle,
        SessionStorage,
        SingleToken,
        StorageError,
        TokenIssuer,
        TokenSource,
        TokenStorage,
    };
}
