//! Connection-string encryption.
//!
//! AES-256-CBC (Rijndael with a 128-bit block) and PKCS#7 padding. The key is
//! derived from a pass phrase with PBKDF2-HMAC-SHA1 over a fixed salt; the IV
//! is fixed as well, so equal inputs give equal ciphertexts. Ciphertext is
//! Base64 text, suitable for a settings file.

use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_SALT: &[u8] = b"bb.conn-string.salt.v1";
const KEY_ITERATIONS: u32 = 10_000;
const IV: [u8; 16] = [
    0x3a, 0x71, 0x0c, 0xe4, 0x95, 0x2b, 0x6f, 0xd8, 0x14, 0xa7, 0x5e, 0xc3, 0x08, 0x99, 0x41, 0xbd,
];

#[derive(Clone)]
pub struct ConnectionStringCipher {
    key: [u8; 32],
}

impl ConnectionStringCipher {
    /// Derive the key from `pass_phrase`.
    pub fn new(pass_phrase: &str) -> Result<Self> {
        if pass_phrase.is_empty() {
            return Err(Error::invalid_argument(
                "pass_phrase",
                "pass phrase must not be empty",
            ));
        }
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha1>(pass_phrase.as_bytes(), KEY_SALT, KEY_ITERATIONS, &mut key);
        Ok(Self { key })
    }

    pub fn encrypt(&self, plain: &str) -> Result<String> {
        if plain.is_empty() {
            return Err(Error::validation(vec![
                "value to encrypt must not be empty".to_string(),
            ]));
        }
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &IV)
            .map_err(|e| Error::crypto(format!("Invalid key or IV: {}", e)))?;
        let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());
        Ok(STANDARD.encode(encrypted))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        if encoded.trim().is_empty() {
            return Err(Error::validation(vec![
                "value to decrypt must not be blank".to_string(),
            ]));
        }
        let encrypted = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::crypto(format!("Ciphertext is not valid Base64: {}", e)))?;
        let cipher = Aes256CbcDec::new_from_slices(&self.key, &IV)
            .map_err(|e| Error::crypto(format!("Invalid key or IV: {}", e)))?;
        let plain = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&encrypted)
            .map_err(|_| Error::crypto("Decryption failed; wrong pass phrase or corrupt data"))?;
        String::from_utf8(plain)
            .map_err(|_| Error::crypto("Decrypted value is not valid UTF-8"))
    }
}

impl std::fmt::Debug for ConnectionStringCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConnectionStringCipher { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = ConnectionStringCipher::new("s3cret").unwrap();
        let plain = "Data Source=CARDS;User Id=app;Password=p@ss;";
        let encrypted = cipher.encrypt(plain).unwrap();
        assert_ne!(encrypted, plain);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plain);
    }

    #[test]
    fn test_deterministic() {
        let cipher = ConnectionStringCipher::new("s3cret").unwrap();
        assert_eq!(
            cipher.encrypt("abc").unwrap(),
            cipher.encrypt("abc").unwrap()
        );
        // One block of padding for a short value.
        assert_eq!(STANDARD.decode(cipher.encrypt("abc").unwrap()).unwrap().len(), 16);
    }

    #[test]
    fn test_wrong_pass_phrase_fails_or_differs() {
        let a = ConnectionStringCipher::new("one").unwrap();
        let b = ConnectionStringCipher::new("two").unwrap();
        let encrypted = a.encrypt("postgres://app:secret@db/cards").unwrap();
        match b.decrypt(&encrypted) {
            Ok(plain) => assert_ne!(plain, "postgres://app:secret@db/cards"),
            Err(e) => assert!(matches!(e, Error::Crypto { .. })),
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let cipher = ConnectionStringCipher::new("s3cret").unwrap();
        assert!(matches!(cipher.encrypt(""), Err(Error::Validation { .. })));
        assert!(matches!(cipher.decrypt(""), Err(Error::Validation { .. })));
        assert!(ConnectionStringCipher::new("").is_err());
    }

    #[test]
    fn test_whitespace_round_trip() {
        let cipher = ConnectionStringCipher::new("s3cret").unwrap();
        for plain in [" ", "\t\n", "  padded  "] {
            let encrypted = cipher.encrypt(plain).unwrap();
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), plain);
        }
    }

    #[test]
    fn test_garbage_ciphertext() {
        let cipher = ConnectionStringCipher::new("s3cret").unwrap();
        assert!(matches!(
            cipher.decrypt("not base64!!"),
            Err(Error::Crypto { .. })
        ));
    }
}
