use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::{Display, Formatter};

use super::store::SessionError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 32;
const SIG_LEN: usize = 32;
const SIGNED_LEN: usize = NONCE_LEN + SIG_LEN;

/// Opaque bearer credential: a random nonce concatenated with an HMAC-SHA256
/// signature over that nonce, base64url-encoded without padding. The token is
/// self-certifying: the signing key alone proves validity, no store lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a new token from a fresh 32-byte random nonce signed with `signing_key`.
    pub fn new(signing_key: &str) -> Result<Self, SessionError> {
        if signing_key.is_empty() {
            return Err(SessionError::EmptyKey);
        }
        let mut buf = [0u8; SIGNED_LEN];
        getrandom::getrandom(&mut buf[..NONCE_LEN])
            .map_err(|e| SessionError::Generation(e.to_string()))?;
        let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
            .map_err(|e| SessionError::Generation(e.to_string()))?;
        mac.update(&buf[..NONCE_LEN]);
        let sig = mac.finalize().into_bytes();
        buf[NONCE_LEN..].copy_from_slice(&sig);
        Ok(SessionId(URL_SAFE_NO_PAD.encode(buf)))
    }

    /// Check that `token` decodes to nonce‖signature and that the signature
    /// matches an HMAC recomputed with `signing_key`. The comparison is
    /// constant-time. Returns the token unchanged on success.
    pub fn validate(token: &str, signing_key: &str) -> Result<Self, SessionError> {
        if signing_key.is_empty() {
            return Err(SessionError::EmptyKey);
        }
        let raw = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| SessionError::MalformedToken)?;
        if raw.len() != SIGNED_LEN {
            return Err(SessionError::MalformedToken);
        }
        let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
            .map_err(|e| SessionError::Generation(e.to_string()))?;
        mac.update(&raw[..NONCE_LEN]);
        mac.verify_slice(&raw[NONCE_LEN..])
            .map_err(|_| SessionError::InvalidSignature)?;
        Ok(SessionId(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
