//! Session token lifecycle and state storage for the gateway.
//! Keep the public surface thin and split implementation across sub-modules.

mod sid;
mod store;
mod memstore;
mod redisstore;
mod session;

pub use sid::SessionId;
pub use store::{SessionError, SessionStore};
pub use memstore::MemStore;
pub use redisstore::RedisStore;
pub use session::{begin_session, end_session, get_session_id, get_state};
