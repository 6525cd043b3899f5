//! Field-level encryption codec.
//!
//! Values are encrypted with AES-256-CBC under a fresh random IV per call and
//! stored as `<32-hex-iv>:<hex-ciphertext>` tokens. Because the IV changes on
//! every encryption, two ciphertexts of the same plaintext never compare
//! equal; equality lookups over encrypted attributes therefore go through the
//! scan in [`crate::store::EncryptedColl::find_equal`], never through an
//! index. That non-determinism is the point: switching to a deterministic
//! scheme would regain indexability at the cost of the confidentiality
//! property this codec exists to provide.

use std::borrow::Cow;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use log::warn;
use rand::Rng;

use crate::{
    config::Config,
    error::{Error, Result},
};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Per-value initialisation vector length in bytes.
const IV_LEN: usize = 16;
/// Derived AES key length in bytes.
const KEY_LEN: usize = 32;

/// Stateless encryptor/decryptor for single scalar values.
///
/// Cheap to copy; the key is derived once from the process configuration and
/// never changes afterwards, so a `Codec` can be shared freely across tasks.
#[derive(Clone, Copy)]
pub struct Codec {
    key: [u8; KEY_LEN],
}

impl Codec {
    /// Derive the AES key from the configured key string, space-padded or
    /// truncated to exactly 32 bytes.
    pub fn new(config: &Config) -> Self {
        let mut key = [b' '; KEY_LEN];
        let bytes = config.encryption_key().as_bytes();
        let len = bytes.len().min(KEY_LEN);
        key[..len].copy_from_slice(&bytes[..len]);
        Self { key }
    }

    /// Encrypt a single value under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0_u8; IV_LEN];
        rand::thread_rng().fill(&mut iv);
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        format!("{}:{}", HEXLOWER.encode(&iv), HEXLOWER.encode(&ciphertext))
    }

    /// Decrypt a stored value.
    ///
    /// A value that does not parse as an `<iv>:<ciphertext>` token is legacy
    /// plaintext from before encryption was introduced and is returned
    /// unchanged. A well-formed token that fails to decrypt is a real error:
    /// either the key is wrong or the stored bytes are corrupted.
    pub fn decrypt<'a>(&self, stored: &'a str) -> Result<Cow<'a, str>> {
        let (iv, ciphertext) = match parse_token(stored) {
            Some(parts) => parts,
            None => return Ok(Cow::Borrowed(stored)),
        };
        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| {
                warn!("Failed to decrypt stored value: wrong key or corrupted token");
                Error::Decryption
            })?;
        String::from_utf8(plaintext).map(Cow::Owned).map_err(|_| {
            warn!("Decrypted value is not valid UTF-8");
            Error::Decryption
        })
    }
}

/// Split a stored value into IV and ciphertext iff it has the token shape:
/// 32 hex characters, a `:` separator, and a non-empty hex tail. Anything
/// else is treated as legacy plaintext by [`Codec::decrypt`].
fn parse_token(stored: &str) -> Option<([u8; IV_LEN], Vec<u8>)> {
    let (iv_hex, ciphertext_hex) = stored.split_once(':')?;
    if iv_hex.len() != IV_LEN * 2 || ciphertext_hex.is_empty() {
        return None;
    }
    let iv_bytes = HEXLOWER_PERMISSIVE.decode(iv_hex.as_bytes()).ok()?;
    let ciphertext = HEXLOWER_PERMISSIVE.decode(ciphertext_hex.as_bytes()).ok()?;
    let mut iv = [0_u8; IV_LEN];
    iv.copy_from_slice(&iv_bytes);
    Some((iv, ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Codec {
        pub fn example() -> Self {
            Codec::new(&Config::new("correct horse battery staple").unwrap())
        }
    }

    #[test]
    fn round_trip() {
        let codec = Codec::example();
        for plaintext in ["35202-1234567-1", "ayesha@example.com", "", "über äöü"] {
            let token = codec.encrypt(plaintext);
            assert_eq!(codec.decrypt(&token).unwrap(), plaintext);
        }
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let codec = Codec::example();
        let first = codec.encrypt("35202-1234567-1");
        let second = codec.encrypt("35202-1234567-1");
        assert_ne!(first, second);
        assert_eq!(codec.decrypt(&first).unwrap(), "35202-1234567-1");
        assert_eq!(codec.decrypt(&second).unwrap(), "35202-1234567-1");
    }

    #[test]
    fn token_has_the_stored_shape() {
        let codec = Codec::example();
        let token = codec.encrypt("anything");
        let (iv_hex, ciphertext_hex) = token.split_once(':').unwrap();
        assert_eq!(iv_hex.len(), 32);
        assert!(iv_hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!ciphertext_hex.is_empty());
        assert!(ciphertext_hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn legacy_plaintext_passes_through() {
        let codec = Codec::example();
        // No separator at all.
        assert_eq!(codec.decrypt("ayesha@example.com").unwrap(), "ayesha@example.com");
        // A separator, but not the token shape.
        assert_eq!(codec.decrypt("not:a-token").unwrap(), "not:a-token");
        assert_eq!(codec.decrypt("12:34").unwrap(), "12:34");
        // Correct IV width but non-hex content.
        let lookalike = format!("{}:beef", "g".repeat(32));
        assert_eq!(codec.decrypt(&lookalike).unwrap(), lookalike);
    }

    #[test]
    fn corrupted_token_fails_to_decrypt() {
        let codec = Codec::example();
        // Well-formed hex, but the ciphertext is not a whole number of
        // blocks, which can never come out of `encrypt`.
        let corrupted = format!("{}:abcd", "0".repeat(32));
        assert!(matches!(codec.decrypt(&corrupted), Err(Error::Decryption)));
    }

    #[test]
    fn wrong_key_does_not_reveal_the_plaintext() {
        let codec = Codec::example();
        let other = Codec::new(&Config::new("a different key entirely").unwrap());
        let token = codec.encrypt("secret ballot metadata");
        match other.decrypt(&token) {
            Ok(plaintext) => assert_ne!(plaintext, "secret ballot metadata"),
            Err(err) => assert!(matches!(err, Error::Decryption)),
        }
    }

    #[test]
    fn key_derivation_pads_and_truncates() {
        // Short and overlong keys both derive a usable 32-byte key, and a
        // key sharing the first 32 bytes is the same key.
        let long = Config::new("x".repeat(40)).unwrap();
        let truncated = Config::new("x".repeat(32)).unwrap();
        let token = Codec::new(&long).encrypt("value");
        assert_eq!(Codec::new(&truncated).decrypt(&token).unwrap(), "value");
    }
}
