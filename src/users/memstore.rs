use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::store::{UserStore, UserStoreError};
use super::{NewUser, Updates, User};
use crate::indexes::Trie;

/// In-process user store for testing and prototyping. Production deployments
/// plug a database-backed implementation into the same trait.
pub struct MemUserStore {
    entries: RwLock<HashMap<Uuid, User>>,
}

impl MemUserStore {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }
}

impl Default for MemUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStore for MemUserStore {
    fn get_by_id(&self, id: Uuid) -> Result<User, UserStoreError> {
        self.entries.read().get(&id).cloned().ok_or(UserStoreError::NotFound)
    }

    fn get_by_email(&self, email: &str) -> Result<User, UserStoreError> {
        let m = self.entries.read();
        m.values().find(|u| u.email == email).cloned().ok_or(UserStoreError::NotFound)
    }

    fn get_by_user_name(&self, user_name: &str) -> Result<User, UserStoreError> {
        let m = self.entries.read();
        m.values().find(|u| u.user_name == user_name).cloned().ok_or(UserStoreError::NotFound)
    }

    fn insert(&self, new_user: &NewUser) -> Result<User, UserStoreError> {
        let user = new_user.to_user().map_err(|e| UserStoreError::Invalid(e.to_string()))?;
        self.entries.write().insert(user.id, user.clone());
        Ok(user)
    }

    fn update(&self, id: Uuid, updates: &Updates) -> Result<(), UserStoreError> {
        let mut m = self.entries.write();
        let user = m.get_mut(&id).ok_or(UserStoreError::NotFound)?;
        user.apply_updates(updates).map_err(|e| UserStoreError::Invalid(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<(), UserStoreError> {
        self.entries.write().remove(&id);
        Ok(())
    }

    fn get_by_id_slice(&self, ids: &[Uuid]) -> Vec<User> {
        let m = self.entries.read();
        ids.iter().filter_map(|id| m.get(id).cloned()).collect()
    }

    fn get_all(&self, trie: &Trie) -> Result<usize, UserStoreError> {
        let m = self.entries.read();
        for user in m.values() {
            user.index_into(trie);
        }
        Ok(m.len())
    }
}
