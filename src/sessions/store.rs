use async_trait::async_trait;
use thiserror::Error;

use super::sid::SessionId;

/// Failure modes across token parsing/validation and state storage.
/// Token errors always surface as unauthenticated and are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session token in Authorization header or auth query parameter")]
    NoToken,
    #[error("authorization scheme not supported")]
    InvalidScheme,
    #[error("malformed session token")]
    MalformedToken,
    #[error("invalid session token signature")]
    InvalidSignature,
    #[error("signing key must not be empty")]
    EmptyKey,
    #[error("failed to generate session token: {0}")]
    Generation(String),
    #[error("no session state for token")]
    StateNotFound,
    #[error("session store unavailable: {0}")]
    Store(String),
    #[error("session state could not be encoded or decoded: {0}")]
    Codec(String),
}

/// Key/value persistence of session state. State crosses this seam as
/// serialized bytes so implementations stay agnostic of the session schema.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist `state` under `id`, refreshing any existing entry and its TTL.
    async fn save(&self, id: &SessionId, state: &[u8]) -> Result<(), SessionError>;

    /// Fetch the state stored under `id`. Absent or expired entries return
    /// `SessionError::StateNotFound`.
    async fn get(&self, id: &SessionId) -> Result<Vec<u8>, SessionError>;

    /// Remove the entry under `id`. Deleting an absent entry is not an error.
    async fn delete(&self, id: &SessionId) -> Result<(), SessionError>;
}
