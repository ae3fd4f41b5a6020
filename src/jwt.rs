//! JWT token generation and validation.
//!
//! Both token types carry the same body: the [`Envelope`] of an encrypted
//! [`IdentityClaim`] plus `iat`/`exp`. Access and refresh tokens are signed
//! with independent secrets, so a token of one kind never validates as the other.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::cipher::{CipherError, Envelope, IdentityClaim, PayloadCipher};

/// Default access token lifetime: 15 minutes
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;

/// Default refresh token lifetime: 7 days
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted token lifetime: 10 years
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Which of the two signing secrets a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Wire claims of both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Hex nonce of the encrypted identity claim
    pub iv: String,
    /// Hex ciphertext of the encrypted identity claim
    pub content: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Secrets and lifetimes for token handling.
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    /// Secret the identity claim is encrypted under
    pub payload_secret: Vec<u8>,
    pub access_ttl: u64,
    pub refresh_ttl: u64,
}

impl TokenSettings {
    /// Settings with the default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], payload_secret: &[u8]) -> Self {
        Self {
            access_secret: access_secret.to_vec(),
            refresh_secret: refresh_secret.to_vec(),
            payload_secret: payload_secret.to_vec(),
            access_ttl: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_ttl: DEFAULT_REFRESH_TOKEN_TTL_SECS,
        }
    }
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct TokenConfig {
    access: SigningKeys,
    refresh: SigningKeys,
    cipher: PayloadCipher,
    access_ttl: u64,
    refresh_ttl: u64,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Access and refresh token minted from the same identity claim.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Outcome of verifying a token. Never an error for bad or expired input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub decoded: Option<IdentityClaim>,
    /// Signature is authentic but `exp` has passed
    pub expired: bool,
    pub valid: bool,
}

impl Verification {
    fn invalid() -> Self {
        Self {
            decoded: None,
            expired: false,
            valid: false,
        }
    }
}

impl TokenConfig {
    pub fn new(settings: TokenSettings) -> Result<Self, JwtError> {
        if settings.access_secret.is_empty()
            || settings.refresh_secret.is_empty()
            || settings.payload_secret.is_empty()
        {
            return Err(JwtError::MissingSecret);
        }
        if settings.access_ttl == 0
            || settings.access_ttl >= settings.refresh_ttl
            || settings.refresh_ttl > MAX_TOKEN_TTL_SECS
        {
            return Err(JwtError::InvalidLifetimes);
        }

        Ok(Self {
            access: SigningKeys::new(&settings.access_secret),
            refresh: SigningKeys::new(&settings.refresh_secret),
            cipher: PayloadCipher::new(&settings.payload_secret),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
        })
    }

    pub fn cipher(&self) -> &PayloadCipher {
        &self.cipher
    }

    /// Refresh token lifetime, used as the cookie Max-Age.
    pub fn refresh_ttl(&self) -> u64 {
        self.refresh_ttl
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn issue(&self, kind: TokenKind, envelope: &Envelope) -> Result<IssuedToken, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let duration = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let claims = TokenClaims {
            iv: envelope.iv.clone(),
            content: envelope.content.clone(),
            iat: now,
            exp: now.checked_add(duration).ok_or(JwtError::TimeError)?,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.keys(kind).encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
            duration,
        })
    }

    /// Sign a short-lived access token around `envelope`.
    pub fn issue_access_token(&self, envelope: &Envelope) -> Result<IssuedToken, JwtError> {
        self.issue(TokenKind::Access, envelope)
    }

    /// Sign a long-lived refresh token around `envelope`.
    pub fn issue_refresh_token(&self, envelope: &Envelope) -> Result<IssuedToken, JwtError> {
        self.issue(TokenKind::Refresh, envelope)
    }

    /// Encrypt `claim` (once per token, each with its own nonce) and mint both tokens.
    pub fn issue_pair(&self, claim: &IdentityClaim) -> Result<TokenPair, JwtError> {
        let access = self.issue_access_token(&self.cipher.seal_claim(claim)?)?;
        let refresh = self.issue_refresh_token(&self.cipher.seal_claim(claim)?)?;
        Ok(TokenPair { access, refresh })
    }

    /// Mint only an access token, for the refresh endpoint.
    pub fn issue_access_for(&self, claim: &IdentityClaim) -> Result<IssuedToken, JwtError> {
        self.issue_access_token(&self.cipher.seal_claim(claim)?)
    }

    /// Verify signature and expiry, then decrypt the identity claim.
    pub fn verify(&self, kind: TokenKind, token: &str) -> Verification {
        let keys = self.keys(kind);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match jsonwebtoken::decode::<TokenClaims>(token, &keys.decoding, &validation) {
            Ok(data) => self.open(data.claims, false),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                // Signature checks run before claim validation, so the token is authentic.
                validation.validate_exp = false;
                match jsonwebtoken::decode::<TokenClaims>(token, &keys.decoding, &validation) {
                    Ok(data) => self.open(data.claims, true),
                    Err(_) => Verification::invalid(),
                }
            }
            Err(e) => {
                debug!(kind = ?kind, error = %e, "Token rejected");
                Verification::invalid()
            }
        }
    }

    fn open(&self, claims: TokenClaims, expired: bool) -> Verification {
        let envelope = Envelope {
            iv: claims.iv,
            content: claims.content,
        };
        match self.cipher.open_claim(&envelope) {
            Ok(claim) => Verification {
                decoded: Some(claim),
                expired,
                valid: true,
            },
            Err(e) => {
                debug!(error = %e, "Token payload could not be decrypted");
                Verification::invalid()
            }
        }
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// One of the secrets is empty
    MissingSecret,
    /// Access tokens must expire strictly before refresh tokens
    InvalidLifetimes,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error encrypting the payload
    Cipher(CipherError),
    /// System time error
    TimeError,
}

impl From<CipherError> for JwtError {
    fn from(e: CipherError) -> Self {
        JwtError::Cipher(e)
    }
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::MissingSecret => write!(f, "Token secret is missing"),
            JwtError::InvalidLifetimes => {
                write!(
                    f,
                    "Access token lifetime must be non-zero and shorter than refresh token lifetime, \
                     which must not exceed {} seconds",
                    MAX_TOKEN_TTL_SECS
                )
            }
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Cipher(e) => write!(f, "Failed to encrypt token payload: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
