//! Sources of cryptographically strong random bytes.
//!
//! Every secret and every masking key is drawn through [`RandomSource`].
//! A source that cannot guarantee strong randomness must fail rather than
//! hand out weaker bytes.

use crate::error::{CsrfError, Result};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::VecDeque;

/// Produces cryptographically strong random bytes or fails.
pub trait RandomSource: Send + Sync {
    /// Fill `dest` entirely with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;
}

/// Draw `len` random bytes from `source`.
pub fn random_bytes(source: &dyn RandomSource, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    source.fill_bytes(&mut bytes)?;
    Ok(bytes)
}

/// The operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| CsrfError::Entropy(e.to_string()))
    }
}

/// Scripted byte source for tests.
///
/// Hands out queued chunks in order, then keeps repeating the fill byte if
/// one was set. Fails once exhausted or when a chunk does not match the
/// requested length.
#[derive(Debug, Default)]
pub struct FixedRandom {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    fill: Option<u8>,
}

impl FixedRandom {
    /// Always produce `byte` repeated.
    pub fn repeating(byte: u8) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::new()),
            fill: Some(byte),
        }
    }

    /// Produce each chunk exactly once, in order.
    pub fn sequence<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            chunks: Mutex::new(chunks.into_iter().collect()),
            fill: None,
        }
    }

    /// Number of queued chunks not yet handed out.
    pub fn remaining(&self) -> usize {
        self.chunks.lock().len()
    }
}

impl RandomSource for FixedRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        match self.chunks.lock().pop_front() {
            Some(chunk) if chunk.len() == dest.len() => {
                dest.copy_from_slice(&chunk);
                Ok(())
            }
            Some(chunk) => Err(CsrfError::Entropy(format!(
                "scripted chunk has {} bytes, {} requested",
                chunk.len(),
                dest.len()
            ))),
            None => match self.fill {
                Some(byte) => {
                    dest.fill(byte);
                    Ok(())
                }
                None => Err(CsrfError::Entropy("scripted random source exhausted".to_string())),
            },
        }
    }
}

/// A source that can never produce strong bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingRandom;

impl RandomSource for FailingRandom {
    fn fill_bytes(&self, _dest: &mut [u8]) -> Result<()> {
        Err(CsrfError::Entropy("random source unavailable".to_string()))
    }
}
