//! Symmetric encryption of the identity claim carried inside tokens.
//!
//! The key is the SHA-256 digest of a configured secret. Every call to
//! [`PayloadCipher::encrypt`] draws a fresh 12-byte nonce, which travels next
//! to the ciphertext in the [`Envelope`].

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Identity carried (encrypted) inside every access and refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "tokenVersion")]
    pub token_version: i64,
}

/// Nonce and ciphertext, both hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub iv: String,
    pub content: String,
}

#[derive(Clone)]
pub struct PayloadCipher {
    key: [u8; 32],
}

impl PayloadCipher {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: openssl::sha::sha256(secret),
        }
    }

    fn aead(&self) -> Result<Aes256Gcm, CipherError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::InvalidKey)
    }

    /// Encrypt `plaintext` under a freshly generated nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let content = self
            .aead()?
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Encryption)?;

        Ok(Envelope {
            iv: hex::encode(nonce),
            content: hex::encode(content),
        })
    }

    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, CipherError> {
        let nonce = hex::decode(&envelope.iv).map_err(|_| CipherError::InvalidHex)?;
        if nonce.len() != NONCE_LEN {
            return Err(CipherError::InvalidNonce);
        }
        let content = hex::decode(&envelope.content).map_err(|_| CipherError::InvalidHex)?;

        self.aead()?
            .decrypt(Nonce::from_slice(&nonce), content.as_slice())
            .map_err(|_| CipherError::Decryption)
    }

    /// Serialize and encrypt an identity claim.
    pub fn seal_claim(&self, claim: &IdentityClaim) -> Result<Envelope, CipherError> {
        let json = serde_json::to_vec(claim).map_err(|_| CipherError::InvalidPayload)?;
        self.encrypt(&json)
    }

    /// Decrypt and deserialize an identity claim.
    pub fn open_claim(&self, envelope: &Envelope) -> Result<IdentityClaim, CipherError> {
        let plaintext = self.decrypt(envelope)?;
        let text = String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)?;
        serde_json::from_str(&text).map_err(|_| CipherError::InvalidPayload)
    }
}

/// Errors from the payload cipher.
#[derive(Debug, PartialEq, Eq)]
pub enum CipherError {
    InvalidKey,
    /// `iv` or `content` is not valid hex
    InvalidHex,
    /// Nonce has the wrong length
    InvalidNonce,
    Encryption,
    /// Wrong secret, or ciphertext truncated or tampered with
    Decryption,
    InvalidUtf8,
    /// Plaintext is not a JSON identity claim
    InvalidPayload,
}

impl std::fmt::Display for CipherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherError::InvalidKey => write!(f, "Invalid cipher key"),
            CipherError::InvalidHex => write!(f, "Envelope is not valid hex"),
            CipherError::InvalidNonce => write!(f, "Envelope nonce has the wrong length"),
            CipherError::Encryption => write!(f, "Encryption failed"),
            CipherError::Decryption => write!(f, "Decryption failed"),
            CipherError::InvalidUtf8 => write!(f, "Decrypted payload is not UTF-8"),
            CipherError::InvalidPayload => write!(f, "Payload is not an identity claim"),
        }
    }
}

impl std::error::Error for CipherError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> IdentityClaim {
        IdentityClaim {
            user_id: "2b0f7c1e-0000-4000-8000-000000000001".to_string(),
            user_email: "alice@example.com".to_string(),
            token_version: 3,
        }
    }

    #[test]
    fn test_claim_roundtrip() {
        let cipher = PayloadCipher::new(b"payload-secret");
        let envelope = cipher.seal_claim(&claim()).unwrap();
        assert_eq!(cipher.open_claim(&envelope).unwrap(), claim());
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let cipher = PayloadCipher::new(b"payload-secret");
        let a = cipher.seal_claim(&claim()).unwrap();
        let b = cipher.seal_claim(&claim()).unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.content, b.content);
        assert_eq!(a.iv.len(), NONCE_LEN * 2);
    }

    #[test]
    fn test_claim_field_names() {
        let json = serde_json::to_value(claim()).unwrap();
        assert_eq!(json["userID"], "2b0f7c1e-0000-4000-8000-000000000001");
        assert_eq!(json["userEmail"], "alice@example.com");
        assert_eq!(json["tokenVersion"], 3);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let envelope = PayloadCipher::new(b"secret-1").seal_claim(&claim()).unwrap();
        let result = PayloadCipher::new(b"secret-2").open_claim(&envelope);
        assert_eq!(result, Err(CipherError::Decryption));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let cipher = PayloadCipher::new(b"payload-secret");
        let mut envelope = cipher.seal_claim(&claim()).unwrap();
        envelope.content.truncate(envelope.content.len() - 4);

        assert_eq!(cipher.open_claim(&envelope), Err(CipherError::Decryption));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = PayloadCipher::new(b"payload-secret");
        let mut envelope = cipher.seal_claim(&claim()).unwrap();
        let first = if envelope.content.starts_with('0') { "1" } else { "0" };
        envelope.content.replace_range(0..1, first);

        assert_eq!(cipher.open_claim(&envelope), Err(CipherError::Decryption));
    }

    #[test]
    fn test_malformed_nonce_fails() {
        let cipher = PayloadCipher::new(b"payload-secret");
        let mut envelope = cipher.seal_claim(&claim()).unwrap();

        envelope.iv = "not-hex".to_string();
        assert_eq!(cipher.open_claim(&envelope), Err(CipherError::InvalidHex));

        envelope.iv = "abcd".to_string();
        assert_eq!(cipher.open_claim(&envelope), Err(CipherError::InvalidNonce));
    }
}
