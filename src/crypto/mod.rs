use aes::Aes256;
use aes_gcm::{
    AesGcm, Nonce,
    aead::{Aead, KeyInit, consts::U16},
};
use cmac::{Cmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// AES-256-GCM with a 16-byte IV, so tokens carry a full block-sized IV.
type CardCipher = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TOKEN_DELIMITER: char = ':';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("malformed ciphertext token: {0}")]
    MalformedToken(&'static str),
    #[error("decryption failed")]
    Decryption,
    #[error("encryption failed")]
    Encryption,
}

/// Encrypts sensitive card fields into `iv_hex:ciphertext_hex` tokens.
///
/// The key is derived once from the configured secret; every call draws a
/// fresh IV so equal plaintexts never produce equal tokens.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: CardCipher,
}

impl FieldCipher {
    pub fn from_secret(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: CardCipher::new(&key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let iv: [u8; IV_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CipherError::Encryption)?;

        Ok(format!(
            "{}{}{}",
            hex::encode(iv),
            TOKEN_DELIMITER,
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        let (iv_hex, ciphertext_hex) = token
            .split_once(TOKEN_DELIMITER)
            .ok_or(CipherError::MalformedToken("missing delimiter"))?;

        let iv = hex::decode(iv_hex).map_err(|_| CipherError::MalformedToken("invalid iv hex"))?;
        if iv.len() != IV_LEN {
            return Err(CipherError::MalformedToken("iv must be 16 bytes"));
        }
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|_| CipherError::MalformedToken("invalid ciphertext hex"))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::<U16>::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Decryption)
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCipher(..)")
    }
}

/// AES-CMAC key used to sign admin session tokens.
#[derive(Clone)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn from_secret(secret: &str) -> Self {
        Self(Sha256::digest(secret.as_bytes()).into())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 16] {
        let mut mac = self.mac();
        mac.update(message);
        mac.finalize().into_bytes().into()
    }

    pub fn verify(&self, message: &[u8], tag: &[u8]) -> bool {
        let mut mac = self.mac();
        mac.update(message);
        mac.verify_slice(tag).is_ok()
    }

    fn mac(&self) -> Cmac<Aes256> {
        <Cmac<Aes256> as KeyInit>::new(&self.0.into())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// Hex SHA-256 digest of a verification code bound to the card it was issued for.
pub fn code_digest(card_id: i64, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(card_id.to_be_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Digest of an admin login code, in a separate domain from card codes.
pub fn login_code_digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"admin-login:");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::from_secret("unit-test-secret")
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        for plaintext in ["4111111111111111", "123", "", "ünïcödé card holder"] {
            let token = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&token).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_same_plaintext_gives_distinct_tokens() {
        let cipher = cipher();
        let first = cipher.encrypt("4111111111111111").unwrap();
        let second = cipher.encrypt("4111111111111111").unwrap();
        assert_ne!(first, second);
        assert!(!first.contains("4111111111111111"));
    }

    #[test]
    fn test_token_shape() {
        let token = cipher().encrypt("123").unwrap();
        let (iv, body) = token.split_once(':').unwrap();
        assert_eq!(iv.len(), IV_LEN * 2);
        // 3 plaintext bytes plus a 16 byte tag
        assert_eq!(body.len(), (3 + 16) * 2);
    }

    #[test]
    fn test_malformed_tokens() {
        let cipher = cipher();
        assert_eq!(
            cipher.decrypt("deadbeef"),
            Err(CipherError::MalformedToken("missing delimiter"))
        );
        assert_eq!(
            cipher.decrypt("zz:00"),
            Err(CipherError::MalformedToken("invalid iv hex"))
        );
        assert_eq!(
            cipher.decrypt("00ff:00"),
            Err(CipherError::MalformedToken("iv must be 16 bytes"))
        );
        let iv = "00".repeat(IV_LEN);
        assert_eq!(
            cipher.decrypt(&format!("{iv}:not-hex")),
            Err(CipherError::MalformedToken("invalid ciphertext hex"))
        );
    }

    #[test]
    fn test_tampered_or_foreign_token_fails_authentication() {
        let token = cipher().encrypt("4111111111111111").unwrap();

        let other = FieldCipher::from_secret("another-secret");
        assert_eq!(other.decrypt(&token), Err(CipherError::Decryption));

        let mut tampered = token.clone().into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert_eq!(cipher().decrypt(&tampered), Err(CipherError::Decryption));
    }

    #[test]
    fn test_signing_key() {
        let key = SigningKey::from_secret("session");
        let tag = key.sign(b"1700000000.abcd");
        assert!(key.verify(b"1700000000.abcd", &tag));
        assert!(!key.verify(b"1700000001.abcd", &tag));
        assert!(!SigningKey::from_secret("other").verify(b"1700000000.abcd", &tag));
    }

    #[test]
    fn test_code_digest_is_bound_to_card() {
        assert_eq!(code_digest(1, "123456"), code_digest(1, "123456"));
        assert_ne!(code_digest(1, "123456"), code_digest(2, "123456"));
        assert_ne!(code_digest(1, "123456"), code_digest(1, "123457"));
        assert_ne!(login_code_digest("123456"), code_digest(0, "123456"));
    }
}
