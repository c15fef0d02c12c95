//! Shared session store backed by redis, for deployments where several
//! gateway instances must see the same sessions.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use super::sid::SessionId;
use super::store::{SessionError, SessionStore};

const KEY_PREFIX: &str = "sid:";

pub struct RedisStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisStore {
    /// Connect to the redis server at `url` (redis:// or rediss://).
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, SessionError> {
        let client = redis::Client::open(url).map_err(|e| SessionError::Store(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;
        Ok(Self { conn, ttl })
    }

    fn key(id: &SessionId) -> String {
        format!("{}{}", KEY_PREFIX, id.as_str())
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn save(&self, id: &SessionId, state: &[u8]) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::key(id), state, self.ttl.as_secs())
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Vec<u8>, SessionError> {
        let mut conn = self.conn.clone();
        let state: Option<Vec<u8>> = conn
            .get(Self::key(id))
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;
        state.ok_or(SessionError::StateNotFound)
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        // DEL on an absent key is a no-op, which keeps logout idempotent.
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(Self::key(id))
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;
        Ok(())
    }
}
