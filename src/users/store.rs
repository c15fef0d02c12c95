use thiserror::Error;
use uuid::Uuid;

use super::{NewUser, Updates, User};
use crate::indexes::Trie;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserStoreError {
    /// Distinguishable sentinel: callers branch on this for duplicate checks
    /// and 404 mapping.
    #[error("user not found")]
    NotFound,
    #[error("invalid user data: {0}")]
    Invalid(String),
    #[error("user store unavailable: {0}")]
    Backend(String),
}

/// Persistent identity-store collaborator. The gateway calls `get_all` once
/// at startup to bulk-populate the prefix index and `get_by_id_slice` to
/// resolve search hits back to records.
pub trait UserStore: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> Result<User, UserStoreError>;

    fn get_by_email(&self, email: &str) -> Result<User, UserStoreError>;

    fn get_by_user_name(&self, user_name: &str) -> Result<User, UserStoreError>;

    /// Convert the NewUser to a User, persist it, and return it.
    fn insert(&self, new_user: &NewUser) -> Result<User, UserStoreError>;

    fn update(&self, id: Uuid, updates: &Updates) -> Result<(), UserStoreError>;

    fn delete(&self, id: Uuid) -> Result<(), UserStoreError>;

    /// Resolve ids to records, preserving input order and skipping unknowns.
    fn get_by_id_slice(&self, ids: &[Uuid]) -> Vec<User>;

    /// Index every stored account into the trie; returns how many were indexed.
    fn get_all(&self, trie: &Trie) -> Result<usize, UserStoreError>;
}
