use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::sid::SessionId;
use super::store::{SessionError, SessionStore};

struct Entry {
    state: Vec<u8>,
    expires_at: Instant,
}

/// In-process TTL session store. Intended for testing, prototyping, and
/// single-node deployments; shared deployments should use `RedisStore`.
pub struct MemStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Remove expired entries. Returns number removed. The server drives this
    /// from a background ticker.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        let mut w = self.entries.write();
        let keys: Vec<String> = w
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            if w.remove(&k).is_some() {
                removed += 1;
            }
        }
        removed
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[async_trait]
impl SessionStore for MemStore {
    async fn save(&self, id: &SessionId, state: &[u8]) -> Result<(), SessionError> {
        let entry = Entry { state: state.to_vec(), expires_at: Instant::now() + self.ttl };
        self.entries.write().insert(id.as_str().to_string(), entry);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Vec<u8>, SessionError> {
        // Expired entries are treated as a miss and dropped on access.
        let mut w = self.entries.write();
        match w.get(id.as_str()) {
            Some(e) if Instant::now() >= e.expires_at => {
                w.remove(id.as_str());
                Err(SessionError::StateNotFound)
            }
            Some(e) => Ok(e.state.clone()),
            None => Err(SessionError::StateNotFound),
        }
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        self.entries.write().remove(id.as_str());
        Ok(())
    }
}
