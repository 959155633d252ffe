//! Identity binding: sealing a user code into an opaque cookie token.
//!
//! Wire format: `base64(IV || ciphertext)` with a 16-byte single-use random
//! IV, AES-256-CFB, and PKCS#7 padding. The key is the first 32 UTF-8 bytes
//! of the configured master secret; tokens already issued depend on that
//! exact derivation.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use thiserror::Error;
use tracing::debug;

use crate::domain::types::UserCode;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum IdentityKeyError {
    #[error("master secret must be at least {KEY_LEN} bytes, got {actual}")]
    SecretTooShort { actual: usize },
}

/// Seals and opens identity tokens carried in a client-held cookie.
pub struct IdentityCipher {
    key: [u8; KEY_LEN],
}

impl IdentityCipher {
    /// Derive the cipher key by truncating the master secret to its first
    /// 32 UTF-8 bytes.
    pub fn new(master_secret: &str) -> Result<Self, IdentityKeyError> {
        let bytes = master_secret.as_bytes();
        if bytes.len() < KEY_LEN {
            return Err(IdentityKeyError::SecretTooShort {
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes[..KEY_LEN]);
        Ok(Self { key })
    }

    /// Encrypt the user code under a fresh random IV. Two calls for the
    /// same code produce different tokens.
    pub fn seal(&self, code: &UserCode) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let mut buf = pkcs7_pad(code.as_str().as_bytes());
        // Key and IV lengths are fixed above, so construction cannot fail.
        let encryptor = Aes256CfbEnc::new(&self.key.into(), &iv.into());
        encryptor.encrypt(&mut buf);

        let mut payload = Vec::with_capacity(IV_LEN + buf.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&buf);
        BASE64.encode(payload)
    }

    /// Recover the user code from a token. Fails soft: any malformed,
    /// garbled, or foreign token degrades to `None` so an invalid cookie
    /// reads as an unrecognized visitor, never a failed request.
    pub fn open(&self, token: &str) -> Option<UserCode> {
        match self.try_open(token) {
            Ok(code) => Some(code),
            Err(reason) => {
                debug!(
                    target: "stampino::identity",
                    reason,
                    "identity token rejected"
                );
                None
            }
        }
    }

    fn try_open(&self, token: &str) -> Result<UserCode, &'static str> {
        let payload = BASE64.decode(token).map_err(|_| "not valid base64")?;
        if payload.len() <= IV_LEN {
            return Err("shorter than the IV prefix");
        }
        let (iv, ciphertext) = payload.split_at(IV_LEN);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err("ciphertext is not block aligned");
        }

        let mut buf = ciphertext.to_vec();
        let decryptor =
            Aes256CfbDec::new_from_slices(&self.key, iv).map_err(|_| "bad key or IV length")?;
        decryptor.decrypt(&mut buf);

        let unpadded = pkcs7_unpad(&buf).ok_or("invalid padding")?;
        let text = std::str::from_utf8(unpadded).map_err(|_| "not UTF-8")?;
        UserCode::new(text).map_err(|_| "not a user code")
    }
}

/// Append PKCS#7 padding up to the cipher block size. Always adds at least
/// one byte.
fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_LEN - (data.len() % BLOCK_LEN);
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat_n(pad as u8, pad));
    out
}

/// Strip and verify PKCS#7 padding. Returns `None` for any malformed tail.
fn pkcs7_unpad(data: &[u8]) -> Option<&[u8]> {
    let &pad = data.last()?;
    let pad = pad as usize;
    if pad == 0 || pad > BLOCK_LEN || pad > data.len() {
        return None;
    }
    let (body, tail) = data.split_at(data.len() - pad);
    tail.iter().all(|&b| b as usize == pad).then_some(body)
}
