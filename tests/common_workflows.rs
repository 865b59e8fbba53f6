//! Integration tests for common Bulwark workflows.
//!
//! These tests walk through the request sequences a host application goes
//! through when protecting forms and APIs.

use bulwark::log::{Level, capture};
use bulwark::prelude::*;
use bulwark::FixedRandom;
use std::sync::Arc;

fn cookie_pair(response: &HttpResponse) -> String {
    response
        .set_cookie()
        .and_then(|c| c.split(';').next())
        .unwrap()
        .to_string()
}

/// Render a page: validate the GET, issue a token, commit the response.
fn render_form(config: &Arc<CsrfConfig>) -> (String, HttpResponse) {
    let request = HttpRequest::new("GET", "/profile");
    let mut csrf = CsrfHandler::with_cookies(config.clone(), &request).unwrap();
    assert!(csrf.validate_request(&request, false).unwrap());

    let token = csrf.get_token().unwrap();
    let mut response = HttpResponse::ok();
    csrf.commit(&mut response);
    (token, response)
}

// =============================================================================
// Cookie-backed Forms
// =============================================================================

#[test]
fn test_form_submission_with_cookie_secret() {
    let config = Arc::new(CsrfConfig::default());
    let (token, response) = render_form(&config);

    let cookie = response.set_cookie().unwrap();
    assert!(cookie.starts_with("csrf_token="));
    assert!(cookie.contains("; Path=/"));
    assert!(cookie.contains("; HttpOnly"));

    let submit = HttpRequest::new("POST", "/profile")
        .with_header("Cookie", format!("theme=dark; {}", cookie_pair(&response)))
        .with_form(&[("name", "Ada"), ("csrf_token", token.as_str())]);
    let mut csrf = CsrfHandler::with_cookies(config, &submit).unwrap();
    assert!(csrf.validate_request(&submit, false).unwrap());
}

#[test]
fn test_token_from_another_browser_is_rejected() {
    let config = Arc::new(CsrfConfig::default());
    let (_, victim) = render_form(&config);
    let (attacker_token, _) = render_form(&config);

    let forged = HttpRequest::new("POST", "/profile")
        .with_header("Cookie", cookie_pair(&victim))
        .with_header("X-CSRF-Token", attacker_token);
    let mut csrf = CsrfHandler::with_cookies(config, &forged).unwrap();

    match csrf.validate_request(&forged, false) {
        Err(CsrfError::Rejected(response)) => assert_eq!(response.status, 400),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_post_without_cookie_writes_fresh_secret() {
    let config = Arc::new(CsrfConfig::default());
    let submit = HttpRequest::new("POST", "/profile").with_header("X-CSRF-Token", "whatever");
    let mut csrf = CsrfHandler::with_cookies(config, &submit).unwrap();

    assert!(matches!(
        csrf.validate_request(&submit, true),
        Err(CsrfError::InvalidToken)
    ));

    // The failed request still leaves a secret for the next page
    let mut response = HttpResponse::ok();
    csrf.commit(&mut response);
    assert!(response.set_cookie().is_some());
}

#[test]
fn test_safe_methods_never_blocked() {
    let config = Arc::new(CsrfConfig::default());
    let (_, response) = render_form(&config);

    for method in ["GET", "HEAD", "OPTIONS", "TRACE"] {
        let request = HttpRequest::new(method, "/profile")
            .with_header("Cookie", cookie_pair(&response))
            .with_header("X-CSRF-Token", "not-a-token");
        let mut csrf = CsrfHandler::with_cookies(config.clone(), &request).unwrap();
        assert!(csrf.validate_request(&request, true).unwrap());
    }
}

#[test]
fn test_regenerate_on_login() {
    let config = Arc::new(CsrfConfig::default());
    let (token, response) = render_form(&config);

    let login = HttpRequest::new("POST", "/login")
        .with_header("Cookie", cookie_pair(&response))
        .with_form(&[("csrf_token", token.as_str())]);
    let mut csrf = CsrfHandler::with_cookies(config.clone(), &login).unwrap();
    assert!(csrf.validate_request(&login, true).unwrap());

    csrf.regenerate_token().unwrap();
    let fresh = csrf.get_token().unwrap();
    let mut response = HttpResponse::ok();
    csrf.commit(&mut response);

    // Old token no longer matches the rotated cookie
    let replay = HttpRequest::new("POST", "/profile")
        .with_header("Cookie", cookie_pair(&response))
        .with_form(&[("csrf_token", token.as_str())]);
    let mut csrf = CsrfHandler::with_cookies(config.clone(), &replay).unwrap();
    assert!(matches!(
        csrf.validate_request(&replay, true),
        Err(CsrfError::InvalidToken)
    ));

    let next = HttpRequest::new("POST", "/profile")
        .with_header("Cookie", cookie_pair(&response))
        .with_form(&[("csrf_token", fresh.as_str())]);
    let mut csrf = CsrfHandler::with_cookies(config, &next).unwrap();
    assert!(csrf.validate_request(&next, true).unwrap());
}

#[test]
fn test_secret_cannot_change_after_commit() {
    let request = HttpRequest::new("GET", "/");
    let mut csrf = CsrfHandler::with_cookies(CsrfConfig::default(), &request).unwrap();
    csrf.get_token().unwrap();

    let mut response = HttpResponse::ok();
    csrf.commit(&mut response);

    let err = csrf.regenerate_token().unwrap_err();
    assert!(matches!(err, CsrfError::Storage(StorageError::HeadersSent)));
    assert_eq!(err.into_response().status, 500);
}

// =============================================================================
// API Clients
// =============================================================================

#[test]
fn test_ajax_header_token() {
    let session = SessionHandle::start(Session::new("api"));
    let config = Arc::new(CsrfConfig::default());

    let mut csrf = CsrfHandler::with_session(config.clone(), session.clone()).unwrap();
    let token = csrf.get_token().unwrap();

    let request = HttpRequest::new("DELETE", "/api/items/7").with_header("x-csrf-token", token);
    let mut csrf = CsrfHandler::with_session(config, session).unwrap();
    assert!(csrf.validate_request(&request, true).unwrap());
}

#[test]
fn test_xor_tokens_with_fixed_randomness() {
    let mut preload = Session::new("fixed");
    // 32 zero bytes
    preload
        .set("csrf_token", format!("{}=", "A".repeat(43)))
        .unwrap();
    let session = SessionHandle::start(preload);

    let config = CsrfConfig::default().with_mask_policy(MaskPolicy::Xor);
    let mut csrf = CsrfHandler::with_session(config, session)
        .unwrap()
        .with_random(Arc::new(FixedRandom::repeating(0x01)));

    let token = csrf.get_token().unwrap();
    assert_eq!(token, format!("{}AQ==", "AQEB".repeat(21)));

    let request = HttpRequest::new("POST", "/").with_header("X-CSRF-Token", token);
    assert!(csrf.validate_request(&request, true).unwrap());
}

// =============================================================================
// One-time Tokens
// =============================================================================

#[test]
fn test_nonce_form_cannot_be_resubmitted() {
    let session = SessionHandle::start(Session::new("checkout"));
    let config = Arc::new(CsrfConfig::default());

    let mut nonce = NonceHandler::new(config.clone(), session.clone()).unwrap();
    let token = SingleToken::new(&mut nonce).into_token();
    assert!(token.is_none());

    let single = SingleToken::new(&mut nonce);
    let token = single.token().unwrap().to_string();
    // Rendering the token twice registers it once
    let _ = single.to_string();
    drop(single);
    assert_eq!(nonce.nonce_count().unwrap(), 1);

    let submit = HttpRequest::new("POST", "/checkout").with_form(&[("csrf_token", token.as_str())]);
    let mut nonce = NonceHandler::new(config.clone(), session.clone()).unwrap();
    assert!(nonce.validate_request(&submit, false).unwrap());

    let mut nonce = NonceHandler::new(config, session).unwrap();
    assert!(matches!(
        nonce.validate_request(&submit, false),
        Err(CsrfError::Rejected(_))
    ));
}

#[test]
fn test_nonce_ledger_bounded_by_pruning() {
    let session = SessionHandle::start(Session::new("tabs"));
    let mut nonce = NonceHandler::new(CsrfConfig::default(), session).unwrap();

    let tokens: Vec<String> = (0..10).map(|_| nonce.get_token().unwrap()).collect();
    assert_eq!(nonce.prune_storage(3).unwrap(), 7);

    let accepted: Vec<bool> = tokens
        .iter()
        .map(|t| nonce.validate_token(t).unwrap())
        .collect();
    assert_eq!(accepted.iter().filter(|ok| **ok).count(), 3);
    assert!(accepted[7..].iter().all(|ok| *ok));
}

// =============================================================================
// Logging
// =============================================================================

#[test]
fn test_logs_never_contain_secrets() {
    let config = Arc::new(CsrfConfig::default());

    let ((token, response), records) = capture(|| render_form(&config));
    let secret = cookie_pair(&response)
        .split_once('=')
        .map(|(_, v)| v.to_string())
        .unwrap();

    let forged = HttpRequest::new("POST", "/profile")
        .with_header("Cookie", cookie_pair(&response))
        .with_header("X-CSRF-Token", token.clone() + "x");
    let (result, rejected) = capture(|| {
        let mut csrf = CsrfHandler::with_cookies(config.clone(), &forged).unwrap();
        csrf.validate_request(&forged, false)
    });
    assert!(matches!(result, Err(CsrfError::Rejected(_))));

    let warning = rejected
        .iter()
        .find(|r| r.level == Level::Warn)
        .expect("rejection is logged");
    assert_eq!(warning.target, "bulwark::csrf");
    assert!(warning.message.contains("POST /profile"));

    for record in records.iter().chain(rejected.iter()) {
        assert!(!record.message.contains(&secret));
        assert!(!record.message.contains(&token));
    }
}
