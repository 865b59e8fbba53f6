use super::{TokenStorage, decode_secret, encode_secret};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-client values the host's session layer loads before the request is
/// handled and persists afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Bumped whenever protection code reads or writes the session
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            data: HashMap::new(),
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// A stored value, `None` if missing or of another shape.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), serde_json::Error> {
        self.data.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

/// Shared handle to the request's session, which may not be started.
///
/// Cloning the handle shares the same session, so the secret storage and
/// the nonce ledger see each other's writes.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<Option<Session>>>,
}

impl SessionHandle {
    /// A handle with an active session.
    pub fn start(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }

    /// A handle with no session started yet.
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Start (or replace) the session behind this handle.
    pub fn activate(&self, session: Session) {
        *self.inner.lock() = Some(session);
    }

    /// End the session, handing its data back for persistence.
    pub fn end(&self) -> Option<Session> {
        self.inner.lock().take()
    }

    /// A copy of the current session data.
    pub fn snapshot(&self) -> Option<Session> {
        self.inner.lock().clone()
    }

    /// Run `f` against the active session.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R, StorageError> {
        let mut guard = self.inner.lock();
        let session = guard.as_mut().ok_or(StorageError::SessionInactive)?;
        session.touch();
        Ok(f(session))
    }
}

/// Stores the secret base64-encoded in a session variable.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    session: SessionHandle,
    name: String,
}

impl SessionStorage {
    pub fn new(session: SessionHandle, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}

impl TokenStorage for SessionStorage {
    fn store_token(&mut self, secret: &[u8]) -> Result<(), StorageError> {
        let encoded = serde_json::Value::String(encode_secret(secret));
        self.session.with(|s| {
            s.data.insert(self.name.clone(), encoded);
        })
    }

    fn get_stored_token(&mut self) -> Result<Option<Vec<u8>>, StorageError> {
        self.session
            .with(|s| s.get::<String>(&self.name).and_then(|v| decode_secret(&v)))
    }
}
