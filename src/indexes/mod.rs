//! In-memory search indexes over identity records.

mod trie;

pub use trie::{Trie, TrieError};
