//! Wire format and masking of issued tokens.
//!
//! A token is `base64(key ‖ mask(secret, key))`, where `key` is fresh
//! random bytes for every issued token. Because the key changes on every
//! call, the same secret never appears twice on the wire, which keeps
//! compression-oracle attacks (BREACH) from recovering it.

use crate::compare::timed_equals;
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// How the secret is combined with a masking key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolicy {
    /// Byte-wise XOR of key and secret. Reversible.
    Xor,
    /// HMAC-SHA256 keyed by the masking key over the secret, expanded in
    /// counter mode to the token length. One-way.
    #[default]
    HmacSha256,
}

/// A decoded or freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedToken {
    pub key: Vec<u8>,
    pub masked: Vec<u8>,
}

/// Encodes, decodes and masks tokens of one fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCodec {
    token_length: usize,
    policy: MaskPolicy,
}

impl TokenCodec {
    pub fn new(token_length: usize, policy: MaskPolicy) -> Self {
        Self {
            token_length,
            policy,
        }
    }

    pub fn token_length(&self) -> usize {
        self.token_length
    }

    pub fn policy(&self) -> MaskPolicy {
        self.policy
    }

    /// Length of a decoded token in bytes.
    pub fn encoded_length(&self) -> usize {
        self.token_length * 2
    }

    /// Mask `secret` with `key`. The output is always `token_length` bytes.
    pub fn mask(&self, secret: &[u8], key: &[u8]) -> Vec<u8> {
        debug_assert_eq!(secret.len(), self.token_length);
        debug_assert_eq!(key.len(), self.token_length);

        match self.policy {
            MaskPolicy::Xor => key.iter().zip(secret).map(|(k, s)| k ^ s).collect(),
            MaskPolicy::HmacSha256 => self.keyed_hash(secret, key),
        }
    }

    fn keyed_hash(&self, secret: &[u8], key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.token_length);
        let mut counter: u32 = 0;

        while out.len() < self.token_length {
            let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
            mac.update(&counter.to_be_bytes());
            mac.update(secret);
            out.extend_from_slice(&mac.finalize().into_bytes());
            counter += 1;
        }

        out.truncate(self.token_length);
        out
    }

    /// Build the token for `secret` under `key`.
    pub fn issue(&self, secret: &[u8], key: Vec<u8>) -> MaskedToken {
        let masked = self.mask(secret, &key);
        MaskedToken { key, masked }
    }

    /// Whether `token` was issued for `secret`.
    pub fn verify(&self, secret: &[u8], token: &MaskedToken) -> bool {
        timed_equals(&self.mask(secret, &token.key), &token.masked)
    }

    pub fn encode(&self, token: &MaskedToken) -> String {
        let mut raw = Vec::with_capacity(token.key.len() + token.masked.len());
        raw.extend_from_slice(&token.key);
        raw.extend_from_slice(&token.masked);
        STANDARD.encode(raw)
    }

    /// Split an encoded token into key and masked secret.
    ///
    /// Returns `None` for anything that is not base64 of exactly
    /// `2 × token_length` bytes.
    pub fn decode(&self, encoded: &str) -> Option<MaskedToken> {
        let raw = STANDARD.decode(encoded.trim()).ok()?;
        if raw.len() != self.encoded_length() {
            return None;
        }

        let (key, masked) = raw.split_at(self.token_length);
        Some(MaskedToken {
            key: key.to_vec(),
            masked: masked.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_codec() -> TokenCodec {
        TokenCodec::new(32, MaskPolicy::Xor)
    }

    #[test]
    fn test_xor_zero_secret_scenario() {
        let codec = xor_codec();
        let secret = vec![0u8; 32];
        let token = codec.issue(&secret, vec![0x01; 32]);
        assert_eq!(token.masked, vec![0x01; 32]);

        let encoded = codec.encode(&token);
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.key, vec![0x01; 32]);
        assert_eq!(decoded.masked, vec![0x01; 32]);
        assert!(codec.verify(&secret, &decoded));
    }

    #[test]
    fn test_xor_is_its_own_inverse() {
        let codec = xor_codec();
        let secret: Vec<u8> = (0..32).collect();
        let key = vec![0x5A; 32];
        let masked = codec.mask(&secret, &key);
        assert_eq!(codec.mask(&masked, &key), secret);
    }

    #[test]
    fn test_hmac_output_length_matches_token_length() {
        for len in [16, 32, 33, 64, 100] {
            let codec = TokenCodec::new(len, MaskPolicy::HmacSha256);
            let masked = codec.mask(&vec![7; len], &vec![9; len]);
            assert_eq!(masked.len(), len);
        }
    }

    #[test]
    fn test_hmac_depends_on_key_and_secret() {
        let codec = TokenCodec::new(32, MaskPolicy::HmacSha256);
        let base = codec.mask(&[1; 32], &[2; 32]);
        assert_ne!(base, codec.mask(&[1; 32], &[3; 32]));
        assert_ne!(base, codec.mask(&[4; 32], &[2; 32]));
        assert_eq!(base, codec.mask(&[1; 32], &[2; 32]));
    }

    #[test]
    fn test_hmac_expansion_blocks_differ() {
        let codec = TokenCodec::new(64, MaskPolicy::HmacSha256);
        let masked = codec.mask(&[1; 64], &[2; 64]);
        assert_ne!(masked[..32], masked[32..]);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let codec = xor_codec();
        assert!(codec.decode("not base64 !!").is_none());
        assert!(codec.decode("").is_none());
        assert!(codec.decode(&STANDARD.encode([0u8; 63])).is_none());
        assert!(codec.decode(&STANDARD.encode([0u8; 65])).is_none());
        assert!(codec.decode(&STANDARD.encode([0u8; 64])).is_some());
    }

    #[test]
    fn test_verify_fails_for_other_secret() {
        let codec = TokenCodec::new(32, MaskPolicy::HmacSha256);
        let token = codec.issue(&[1; 32], vec![2; 32]);
        assert!(codec.verify(&[1; 32], &token));
        assert!(!codec.verify(&[0; 32], &token));
    }

    #[test]
    fn test_policy_serde_names() {
        assert_eq!(serde_json::to_string(&MaskPolicy::Xor).unwrap(), "\"xor\"");
        assert_eq!(
            serde_json::to_string(&MaskPolicy::HmacSha256).unwrap(),
            "\"hmac_sha256\""
        );
    }
}
