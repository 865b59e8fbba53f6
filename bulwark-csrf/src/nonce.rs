//! One-time tokens.
//!
//! Every token handed out by [`NonceHandler::get_token`] is registered in a
//! ledger kept in the session. A token validates only while its key is
//! registered, and a successful validation removes the key, so replaying
//! the same token never succeeds twice. Tokens that were never issued
//! through the ledger, or whose entry was pruned, do not validate.

use crate::config::CsrfConfig;
use crate::context::{HttpRequest, HttpResponse};
use crate::error::{Result, StorageError};
use crate::handler::{CsrfHandler, TokenIssuer};
use crate::random::RandomSource;
use crate::source::TokenSource;
use crate::storage::SessionHandle;
use base64::{Engine, engine::general_purpose::STANDARD};
use bulwark_log::debug;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const LOG_TARGET: &str = "bulwark::csrf::nonce";

/// A registered, not yet consumed token key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceEntry {
    pub key: String,
    pub issued_at: DateTime<Utc>,
}

/// Outstanding token keys in registration order, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceLedger {
    entries: Vec<NonceEntry>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn entries(&self) -> &[NonceEntry] {
        &self.entries
    }

    /// Register `key` as issued now.
    pub fn register(&mut self, key: impl Into<String>) {
        self.register_at(key, Utc::now());
    }

    /// Register `key` as issued at `issued_at`. A key that is already
    /// registered moves to the newest position.
    pub fn register_at(&mut self, key: impl Into<String>, issued_at: DateTime<Utc>) {
        let key = key.into();
        self.entries.retain(|e| e.key != key);
        self.entries.push(NonceEntry { key, issued_at });
    }

    /// Remove `key`; false if it was not registered.
    pub fn consume(&mut self, key: &str) -> bool {
        match self.entries.iter().position(|e| e.key == key) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Evict the oldest entries until at most `limit` remain. Returns the
    /// number evicted.
    pub fn prune(&mut self, limit: usize) -> usize {
        let excess = self.entries.len().saturating_sub(limit);
        self.entries.drain(..excess);
        excess
    }

    /// Evict entries issued before `cutoff`. Returns the number evicted.
    pub fn prune_issued_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.issued_at >= cutoff);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Where the ledger lives inside the session.
#[derive(Debug, Clone)]
struct LedgerStore {
    session: SessionHandle,
    name: String,
}

impl LedgerStore {
    fn load(&self) -> Result<NonceLedger> {
        let value = self.session.with(|s| s.data.get(&self.name).cloned())?;
        match value {
            None => Ok(NonceLedger::default()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                StorageError::Corrupted(format!("nonce ledger '{}': {}", self.name, e)).into()
            }),
        }
    }

    fn save(&self, ledger: &NonceLedger) -> Result<()> {
        let value = serde_json::to_value(ledger)?;
        self.session.with(|s| {
            s.data.insert(self.name.clone(), value);
        })?;
        Ok(())
    }

    fn update<R>(&self, f: impl FnOnce(&mut NonceLedger) -> R) -> Result<R> {
        let mut ledger = self.load()?;
        let result = f(&mut ledger);
        self.save(&ledger)?;
        Ok(result)
    }
}

fn ledger_key(key: &[u8]) -> String {
    STANDARD.encode(key)
}

fn consume_token(handler: &mut CsrfHandler, ledger: &LedgerStore, token: &str) -> Result<bool> {
    let Some(decoded) = handler.codec().decode(token) else {
        return Ok(false);
    };

    let key = ledger_key(&decoded.key);
    let mut entries = ledger.load()?;
    if !entries.contains(&key) {
        debug!(target: LOG_TARGET, "Token key is not registered or was already used");
        return Ok(false);
    }

    if !handler.validate_token(token)? {
        return Ok(false);
    }

    entries.consume(&key);
    ledger.save(&entries)?;
    Ok(true)
}

/// Handler whose tokens are accepted at most once.
///
/// Secret and ledger both live in the session. Concurrent requests on the
/// same session must be serialized by the session layer.
#[derive(Debug)]
pub struct NonceHandler {
    handler: CsrfHandler,
    ledger: LedgerStore,
}

impl NonceHandler {
    pub fn new(config: impl Into<Arc<CsrfConfig>>, session: SessionHandle) -> Result<Self> {
        let config = config.into();
        let ledger = LedgerStore {
            session: session.clone(),
            name: config.nonce_storage_name.clone(),
        };
        let handler = CsrfHandler::with_session(config, session)?;
        Ok(Self { handler, ledger })
    }

    /// Replace the random byte source.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.handler = self.handler.with_random(random);
        self
    }

    /// Replace the ordered list of token sources.
    pub fn with_sources(mut self, sources: Vec<Box<dyn TokenSource>>) -> Self {
        self.handler = self.handler.with_sources(sources);
        self
    }

    /// The underlying multi-use handler.
    pub fn handler(&self) -> &CsrfHandler {
        &self.handler
    }

    /// Issue a token and register its key as unused.
    ///
    /// Keys of tokens that are never submitted stay in the ledger, and
    /// every lookup scans the whole ledger. Bound it by calling
    /// [`prune_storage`](Self::prune_storage) or
    /// [`prune_expired`](Self::prune_expired) after issuing.
    pub fn get_token(&mut self) -> Result<String> {
        let token = self.handler.issue()?;
        self.ledger.update(|ledger| ledger.register(ledger_key(&token.key)))?;
        Ok(self.handler.codec().encode(&token))
    }

    /// Validate and consume a token. A token validates at most once.
    pub fn validate_token(&mut self, token: &str) -> Result<bool> {
        consume_token(&mut self.handler, &self.ledger, token)
    }

    /// Forget every outstanding token and replace the secret.
    pub fn regenerate_token(&mut self) -> Result<&mut Self> {
        self.ledger.save(&NonceLedger::default())?;
        self.handler.regenerate_token()?;
        Ok(self)
    }

    /// Validate `request` like [`CsrfHandler::validate_request`],
    /// consuming the submitted token.
    pub fn validate_request(&mut self, request: &HttpRequest, throw_on_failure: bool) -> Result<bool> {
        let ledger = &self.ledger;
        self.handler
            .guard_request(request, throw_on_failure, |handler, token| {
                consume_token(handler, ledger, token)
            })
    }

    /// Evict the oldest outstanding tokens until at most `limit` remain.
    pub fn prune_storage(&mut self, limit: usize) -> Result<usize> {
        let evicted = self.ledger.update(|ledger| ledger.prune(limit))?;
        if evicted > 0 {
            debug!(target: LOG_TARGET, "Pruned {} outstanding nonces", evicted);
        }
        Ok(evicted)
    }

    /// Evict outstanding tokens issued more than `max_age` ago.
    pub fn prune_expired(&mut self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let evicted = self.ledger.update(|ledger| ledger.prune_issued_before(cutoff))?;
        if evicted > 0 {
            debug!(target: LOG_TARGET, "Expired {} outstanding nonces", evicted);
        }
        Ok(evicted)
    }

    /// Number of outstanding tokens.
    pub fn nonce_count(&self) -> Result<usize> {
        Ok(self.ledger.load()?.len())
    }

    /// Write pending storage state into `response`.
    pub fn commit(&mut self, response: &mut HttpResponse) {
        self.handler.commit(response);
    }
}

impl TokenIssuer for NonceHandler {
    fn get_token(&mut self) -> Result<String> {
        NonceHandler::get_token(self)
    }
}
