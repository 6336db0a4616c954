//! Refresh token encryption.
//!
//! Tokens are sealed with AES in counter mode keyed directly by the provider
//! client secret. The output is `<hex_iv>:<hex_ciphertext>` with a fresh
//! 16-byte IV per call, which keeps tokens issued by earlier deployments
//! decryptable.
//!
//! Counter mode is malleable: flipping a ciphertext hex digit flips the same
//! plaintext bit. Structural damage (bad hex, wrong IV length, missing
//! separator) is always rejected. A wrong key is rejected for realistic
//! token lengths only, because the recovered bytes are then almost never
//! valid UTF-8; a token of a few bytes can decrypt to garbage text.

use std::fmt;
use std::str::FromStr;

use aes::{Aes128, Aes192, Aes256};
use ctr::Ctr128BE;
use ctr::cipher::generic_array::GenericArray;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;

use crate::error::CipherError;

/// Length of the random initialization value, in bytes.
pub const IV_LENGTH: usize = 16;

/// Separator between the IV and the ciphertext.
const SEPARATOR: char = ':';

/// Supported stream cipher algorithms, named as OpenSSL names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherAlgorithm {
    Aes128Ctr,
    Aes192Ctr,
    #[default]
    Aes256Ctr,
}

impl CipherAlgorithm {
    /// Canonical algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes128Ctr => "aes-128-ctr",
            CipherAlgorithm::Aes192Ctr => "aes-192-ctr",
            CipherAlgorithm::Aes256Ctr => "aes-256-ctr",
        }
    }

    /// Required key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Ctr => 16,
            CipherAlgorithm::Aes192Ctr => 24,
            CipherAlgorithm::Aes256Ctr => 32,
        }
    }
}

impl FromStr for CipherAlgorithm {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes-128-ctr" => Ok(CipherAlgorithm::Aes128Ctr),
            "aes-192-ctr" => Ok(CipherAlgorithm::Aes192Ctr),
            "aes-256-ctr" => Ok(CipherAlgorithm::Aes256Ctr),
            _ => Err(CipherError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reversible transform between plaintext refresh tokens and their
/// encrypted wire form.
#[derive(Clone)]
pub struct TokenCipher {
    algorithm: CipherAlgorithm,
    key: Vec<u8>,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl TokenCipher {
    /// Create a cipher keyed by the raw bytes of `key`.
    ///
    /// The key is not stretched or hashed; its length must match the
    /// algorithm exactly.
    pub fn new(algorithm: CipherAlgorithm, key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != algorithm.key_len() {
            return Err(CipherError::InvalidKeyLength {
                algorithm: algorithm.name(),
                expected: algorithm.key_len(),
                actual: key.len(),
            });
        }

        Ok(Self {
            algorithm,
            key: key.to_vec(),
        })
    }

    /// Create a cipher from an algorithm name and a textual secret.
    pub fn from_secret(algorithm: &str, secret: &str) -> Result<Self, CipherError> {
        Self::new(algorithm.parse()?, secret.as_bytes())
    }

    /// The configured algorithm.
    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LENGTH];
        rand::rng().fill_bytes(&mut iv);

        let mut buf = plaintext.as_bytes().to_vec();
        self.apply_keystream(&iv, &mut buf);

        format!("{}{}{}", hex::encode(iv), SEPARATOR, hex::encode(buf))
    }

    /// Recover the plaintext of a token produced by [`TokenCipher::encrypt`].
    pub fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        let (iv_hex, ciphertext_hex) = token
            .split_once(SEPARATOR)
            .ok_or(CipherError::Malformed("missing ':' separator"))?;

        let iv: [u8; IV_LENGTH] = hex::decode(iv_hex)
            .map_err(|_| CipherError::Malformed("IV is not valid hex"))?
            .try_into()
            .map_err(|_| CipherError::Malformed("IV must be 16 bytes"))?;

        let mut buf = hex::decode(ciphertext_hex)
            .map_err(|_| CipherError::Malformed("ciphertext is not valid hex"))?;

        self.apply_keystream(&iv, &mut buf);

        String::from_utf8(buf).map_err(|_| CipherError::InvalidPlaintext)
    }

    fn apply_keystream(&self, iv: &[u8; IV_LENGTH], buf: &mut [u8]) {
        match self.algorithm {
            CipherAlgorithm::Aes128Ctr => keystream::<Ctr128BE<Aes128>>(&self.key, iv, buf),
            CipherAlgorithm::Aes192Ctr => keystream::<Ctr128BE<Aes192>>(&self.key, iv, buf),
            CipherAlgorithm::Aes256Ctr => keystream::<Ctr128BE<Aes256>>(&self.key, iv, buf),
        }
    }
}

/// XOR `buf` with the keystream of `C`. The key length is checked in
/// [`TokenCipher::new`].
fn keystream<C: KeyIvInit + StreamCipher>(key: &[u8], iv: &[u8; IV_LENGTH], buf: &mut [u8]) {
    let mut cipher = C::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    cipher.apply_keystream(buf);
}
