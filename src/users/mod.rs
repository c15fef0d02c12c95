//! Identity records: account types, credential validation, password hashing,
//! and the persistent-store seam the gateway resolves search hits through.

mod store;
mod memstore;

pub use memstore::MemUserStore;
pub use store::{UserStore, UserStoreError};

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::indexes::Trie;

const GRAVATAR_BASE_PHOTO_URL: &str = "https://www.gravatar.com/avatar/";

/// A user account. The password hash is stored but never serialized, so the
/// identity snapshot forwarded to backends cannot leak it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub pass_hash: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
}

/// Sign-in credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// A new account signing up.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    #[serde(rename = "passwordConf")]
    pub password_conf: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
}

/// Allowed updates to a user profile.
#[derive(Debug, Clone, Deserialize)]
pub struct Updates {
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// Loose structural e-mail check: non-empty local part and domain with a dot.
fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else { return false; };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn gravatar_url(email: &str) -> String {
    let em = email.trim().to_lowercase();
    let digest = Sha256::digest(em.as_bytes());
    let mut hex = String::with_capacity(64);
    use std::fmt::Write as _;
    for b in digest {
        let _ = write!(&mut hex, "{:02x}", b);
    }
    format!("{}{}", GRAVATAR_BASE_PHOTO_URL, hex)
}

impl NewUser {
    /// Validate the sign-up payload and return an error describing the first
    /// rule that fails.
    pub fn validate(&self) -> Result<()> {
        if !valid_email(&self.email) {
            return Err(anyhow!("invalid email address: {}", self.email));
        }
        if self.password.len() < 6 {
            return Err(anyhow!("password must be at least 6 characters"));
        }
        if self.password != self.password_conf {
            return Err(anyhow!("password and password confirmation do not match"));
        }
        if self.user_name.is_empty() {
            return Err(anyhow!("user name must be non-zero length"));
        }
        Ok(())
    }

    /// Convert to a stored User: assign a fresh id, hash the password, and
    /// derive the avatar URL from the trimmed lower-cased e-mail.
    pub fn to_user(&self) -> Result<User> {
        Ok(User {
            id: Uuid::new_v4(),
            email: self.email.clone(),
            pass_hash: hash_password(&self.password)?,
            user_name: self.user_name.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            photo_url: gravatar_url(&self.email),
        })
    }
}

impl User {
    /// Compare a plaintext password against the stored hash.
    pub fn authenticate(&self, password: &str) -> bool {
        verify_password(&self.pass_hash, password)
    }

    /// "<first> <last>", with no space when either part is empty.
    pub fn full_name(&self) -> String {
        if self.first_name.is_empty() {
            self.last_name.clone()
        } else if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    /// Apply profile updates; both names must be non-empty.
    pub fn apply_updates(&mut self, updates: &Updates) -> Result<()> {
        if updates.first_name.is_empty() {
            return Err(anyhow!("the first name must be non-zero length"));
        }
        if updates.last_name.is_empty() {
            return Err(anyhow!("the last name must be non-zero length"));
        }
        self.first_name = updates.first_name.clone();
        self.last_name = updates.last_name.clone();
        Ok(())
    }

    /// Index this user's searchable fields (lower-cased) into the trie.
    pub fn index_into(&self, trie: &Trie) {
        trie.add(&self.email.to_lowercase(), self.id);
        trie.add(&self.user_name.to_lowercase(), self.id);
        trie.add(&self.first_name.to_lowercase(), self.id);
        trie.add(&self.last_name.to_lowercase(), self.id);
    }
}
