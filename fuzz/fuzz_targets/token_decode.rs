//! Fuzz target for submitted token decoding and validation.
//!
//! Arbitrary strings must never panic and must never validate against a
//! freshly generated secret.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use bulwark_csrf::{CsrfConfig, CsrfHandler, MaskPolicy, Session, SessionHandle, TokenCodec};

#[derive(Debug, Arbitrary)]
struct FuzzToken {
    token: String,
    xor: bool,
    token_length: u8,
}

fuzz_target!(|data: FuzzToken| {
    let policy = if data.xor {
        MaskPolicy::Xor
    } else {
        MaskPolicy::HmacSha256
    };

    // Decoding alone, at any length
    let codec = TokenCodec::new(usize::from(data.token_length), policy);
    if let Some(decoded) = codec.decode(&data.token) {
        assert_eq!(decoded.key.len(), codec.token_length());
        assert_eq!(decoded.masked.len(), codec.token_length());
        let _ = codec.encode(&decoded);
    }

    // Full validation against a random secret
    let session = SessionHandle::start(Session::new("fuzz"));
    let config = CsrfConfig::default().with_mask_policy(policy);
    if let Ok(mut csrf) = CsrfHandler::with_session(config, session) {
        if let Ok(valid) = csrf.validate_token(&data.token) {
            assert!(!valid);
        }
    }
});
