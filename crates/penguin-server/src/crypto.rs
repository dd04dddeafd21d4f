//! Hybrid decryption of recognition batches.
//!
//! A request body is `"<key hint>:<base64 envelope>"`. The envelope is laid
//! out as
//!
//! | Bytes | Content |
//! |-------|---------|
//! | 2 | big-endian length `n` of the wrapped key |
//! | n | AES-256 session key, RSA-OAEP (SHA-256) encrypted |
//! | 12 | AES-GCM nonce |
//! | rest | AES-256-GCM ciphertext with tag |

use std::{collections::HashMap, path::PathBuf};

use aes_gcm::{
  Aes256Gcm, Nonce,
  aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand::{CryptoRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey, pkcs8::DecodePrivateKey};
use sha2::Sha256;

use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;
const SESSION_KEY_LEN: usize = 32;

/// Private keys by public-key hint.
#[derive(Default)]
pub struct RecognitionKeys {
  keys: HashMap<String, RsaPrivateKey>,
}

impl RecognitionKeys {
  pub fn new() -> Self { Self::default() }

  /// Read every PKCS#8 PEM file of `paths`.
  pub fn load(paths: &HashMap<String, PathBuf>) -> anyhow::Result<Self> {
    use anyhow::Context as _;
    let mut keys = Self::new();
    for (hint, path) in paths {
      let pem = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read recognition key {path:?}"))?;
      let key = RsaPrivateKey::from_pkcs8_pem(&pem)
        .with_context(|| format!("failed to parse recognition key {path:?}"))?;
      keys.insert(hint.clone(), key);
    }
    Ok(keys)
  }

  pub fn insert(&mut self, hint: impl Into<String>, key: RsaPrivateKey) {
    self.keys.insert(hint.into(), key);
  }

  pub fn is_empty(&self) -> bool { self.keys.is_empty() }

  /// Decrypt a `"<hint>:<base64>"` request body.
  pub fn open(&self, body: &str) -> Result<Vec<u8>> {
    let (hint, encoded) = body
      .trim()
      .split_once(':')
      .ok_or_else(|| Error::Decrypt("missing key hint".into()))?;
    let key = self.keys.get(hint).ok_or_else(|| Error::UnknownKey(hint.to_owned()))?;
    let envelope = B64
      .decode(encoded)
      .map_err(|e| Error::Decrypt(format!("invalid base64: {e}")))?;
    open_envelope(key, &envelope)
  }
}

fn open_envelope(key: &RsaPrivateKey, envelope: &[u8]) -> Result<Vec<u8>> {
  let truncated = || Error::Decrypt("truncated envelope".into());
  let (len, rest) = envelope.split_first_chunk::<2>().ok_or_else(truncated)?;
  let wrapped_len = usize::from(u16::from_be_bytes(*len));
  if rest.len() < wrapped_len + NONCE_LEN {
    return Err(truncated());
  }
  let (wrapped, rest) = rest.split_at(wrapped_len);
  let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

  let session = key
    .decrypt(Oaep::new::<Sha256>(), wrapped)
    .map_err(|e| Error::Decrypt(format!("session key: {e}")))?;
  if session.len() != SESSION_KEY_LEN {
    return Err(Error::Decrypt("session key has the wrong length".into()));
  }
  let cipher =
    Aes256Gcm::new_from_slice(&session).map_err(|e| Error::Decrypt(format!("session key: {e}")))?;
  cipher
    .decrypt(Nonce::from_slice(nonce), ciphertext)
    .map_err(|_| Error::Decrypt("payload authentication failed".into()))
}

/// Build an envelope for `public`, as a recognition client does.
pub fn seal<R: RngCore + CryptoRng>(
  public: &RsaPublicKey,
  plaintext: &[u8],
  rng: &mut R,
) -> Result<Vec<u8>> {
  let mut session = [0u8; SESSION_KEY_LEN];
  rng.fill_bytes(&mut session);
  let mut nonce = [0u8; NONCE_LEN];
  rng.fill_bytes(&mut nonce);

  let wrapped = public
    .encrypt(rng, Oaep::new::<Sha256>(), &session)
    .map_err(|e| Error::Decrypt(format!("session key: {e}")))?;
  let wrapped_len =
    u16::try_from(wrapped.len()).map_err(|_| Error::Decrypt("wrapped key too long".into()))?;
  let cipher =
    Aes256Gcm::new_from_slice(&session).map_err(|e| Error::Decrypt(format!("session key: {e}")))?;
  let ciphertext = cipher
    .encrypt(Nonce::from_slice(&nonce), plaintext)
    .map_err(|_| Error::Decrypt("encryption failed".into()))?;

  let mut envelope = Vec::with_capacity(2 + wrapped.len() + NONCE_LEN + ciphertext.len());
  envelope.extend_from_slice(&wrapped_len.to_be_bytes());
  envelope.extend_from_slice(&wrapped);
  envelope.extend_from_slice(&nonce);
  envelope.extend_from_slice(&ciphertext);
  Ok(envelope)
}

/// `"<hint>:<base64 envelope>"`, ready to post.
pub fn seal_body<R: RngCore + CryptoRng>(
  hint: &str,
  public: &RsaPublicKey,
  plaintext: &[u8],
  rng: &mut R,
) -> Result<String> {
  Ok(format!("{hint}:{}", B64.encode(seal(public, plaintext, rng)?)))
}

#[cfg(test)]
pub(crate) mod tests {
  use rand::rngs::OsRng;

  use super::*;

  /// A small key keeps test setup fast; OAEP-SHA256 still fits a 32-byte
  /// session key.
  pub(crate) fn test_key() -> RsaPrivateKey { RsaPrivateKey::new(&mut OsRng, 1024).unwrap() }

  #[test]
  fn sealed_bodies_open() {
    let key = test_key();
    let mut keys = RecognitionKeys::new();
    keys.insert("k1", key.clone());

    let body = seal_body("k1", &key.to_public_key(), b"{\"server\":\"CN\"}", &mut OsRng).unwrap();
    assert_eq!(keys.open(&body).unwrap(), b"{\"server\":\"CN\"}");
  }

  #[test]
  fn unknown_hints_and_garbage_fail() {
    let key = test_key();
    let mut keys = RecognitionKeys::new();
    keys.insert("k1", key.clone());

    let body = seal_body("k2", &key.to_public_key(), b"x", &mut OsRng).unwrap();
    assert!(matches!(keys.open(&body), Err(Error::UnknownKey(h)) if h == "k2"));
    assert!(matches!(keys.open("no-colon"), Err(Error::Decrypt(_))));
    assert!(matches!(keys.open("k1:!!!"), Err(Error::Decrypt(_))));
    assert!(matches!(keys.open("k1:AAAA"), Err(Error::Decrypt(_))));
  }

  #[test]
  fn tampering_is_detected() {
    let key = test_key();
    let mut envelope = seal(&key.to_public_key(), b"payload", &mut OsRng).unwrap();
    let last = envelope.len() - 1;
    envelope[last] ^= 1;
    assert!(matches!(open_envelope(&key, &envelope), Err(Error::Decrypt(_))));
  }
}
