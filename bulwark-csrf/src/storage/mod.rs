//! Persistence of the secret between requests.

mod cookie;
mod session;

pub use cookie::CookieStorage;
pub use session::{Session, SessionHandle, SessionStorage};

use crate::context::HttpResponse;
use crate::error::StorageError;
use base64::{Engine, engine::general_purpose::STANDARD};

/// Persists the secret across requests.
pub trait TokenStorage: Send {
    /// Persist `secret`. Fails if the storage medium cannot take it.
    fn store_token(&mut self, secret: &[u8]) -> Result<(), StorageError>;

    /// Load the persisted secret, `None` if nothing usable is stored.
    fn get_stored_token(&mut self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write pending state into the outgoing response. Storage that
    /// lives in response headers refuses further writes afterwards.
    fn commit(&mut self, _response: &mut HttpResponse) {}
}

impl<T: TokenStorage + ?Sized> TokenStorage for Box<T> {
    fn store_token(&mut self, secret: &[u8]) -> Result<(), StorageError> {
        (**self).store_token(secret)
    }

    fn get_stored_token(&mut self) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get_stored_token()
    }

    fn commit(&mut self, response: &mut HttpResponse) {
        (**self).commit(response)
    }
}

pub(crate) fn encode_secret(secret: &[u8]) -> String {
    STANDARD.encode(secret)
}

/// A stored value that is not valid base64 counts as absent.
pub(crate) fn decode_secret(stored: &str) -> Option<Vec<u8>> {
    STANDARD.decode(stored.trim()).ok().filter(|s| !s.is_empty())
}
