use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrieError {
    #[error("key not found in index: {0}")]
    KeyNotFound(String),
}

#[derive(Default)]
struct Node {
    // insertion-ordered, duplicate-free set; bounded by records per key
    values: Vec<Uuid>,
    // BTreeMap keeps child edges in ascending char order for traversal
    children: BTreeMap<char, Node>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.children.is_empty()
    }

    /// Depth-first collection: descendants before this node's own values,
    /// children visited in ascending edge order, hard stop at `limit`. This
    /// ordering is an observable contract; two tries with identical content
    /// yield identical output.
    fn collect(&self, limit: usize, out: &mut Vec<Uuid>) {
        for child in self.children.values() {
            if out.len() == limit {
                return;
            }
            child.collect(limit, out);
        }
        for id in &self.values {
            if out.len() == limit {
                return;
            }
            out.push(*id);
        }
    }

    fn remove(&mut self, mut chars: std::str::Chars, id: Uuid) -> Result<(), TrieError> {
        let Some(c) = chars.next() else {
            self.values.retain(|v| *v != id);
            return Ok(());
        };
        let next = self
            .children
            .get_mut(&c)
            .ok_or_else(|| TrieError::KeyNotFound(c.to_string()))?;
        next.remove(chars, id)?;
        // prune bottom-up on unwind; the root is never reached here
        if next.is_empty() {
            self.children.remove(&c);
        }
        Ok(())
    }
}

/// Concurrent prefix index mapping normalized text to sets of identity
/// references. One coarse reader/writer lock guards the whole tree: mutation
/// is pointer/map manipulation only and the tree is bounded by record count
/// times indexed fields, so writers hold the lock briefly.
pub struct Trie {
    root: RwLock<Node>,
}

impl Trie {
    pub fn new() -> Self {
        Self { root: RwLock::new(Node::default()) }
    }

    /// Insert `id` under `key`. Callers pass normalized (lower-cased) keys.
    /// Adding an already-present pair is a no-op (set semantics).
    pub fn add(&self, key: &str, id: Uuid) {
        let mut root = self.root.write();
        let mut current = &mut *root;
        for c in key.chars() {
            current = current.children.entry(c).or_default();
        }
        if !current.values.contains(&id) {
            current.values.push(id);
        }
    }

    /// Remove the `key`/`id` pair, pruning interior nodes left empty. Errors
    /// if any prefix character has no matching child.
    pub fn remove(&self, key: &str, id: Uuid) -> Result<(), TrieError> {
        self.root.write().remove(key.chars(), id)
    }

    /// Return up to `limit` references whose keys start with `prefix`. An
    /// empty prefix or an unmatched branch yields an empty result, not an
    /// error. Results are deterministic for an unchanged tree.
    pub fn get(&self, limit: usize, prefix: &str) -> Vec<Uuid> {
        let mut out = Vec::new();
        if prefix.is_empty() {
            return out;
        }
        let root = self.root.read();
        let mut current = &*root;
        for c in prefix.chars() {
            match current.children.get(&c) {
                Some(next) => current = next,
                None => return out,
            }
        }
        current.collect(limit, &mut out);
        out
    }
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabetical_dfs_with_duplicate_add() {
        let tr = Trie::new();
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();

        tr.add("ac", x);
        tr.add("aba", y);
        tr.add("ac", x); // duplicate pair is a no-op

        // "aba" sorts before "ac", and set semantics keep one copy of x
        assert_eq!(tr.get(3, "a"), vec![y, x]);
    }

    #[test]
    fn limit_bounds_results() {
        let tr = Trie::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let id3 = Uuid::new_v4();
        let id4 = Uuid::new_v4();

        tr.add("ac", id2);
        tr.add("aba", id1);
        tr.add("acb", id4);
        tr.add("aca", id3);

        // depth-first in edge order: aba, then under ac: aca, acb, then ac itself
        assert_eq!(tr.get(3, "a"), vec![id1, id3, id4]);
        assert_eq!(tr.get(10, "a"), vec![id1, id3, id4, id2]);
        assert_eq!(tr.get(0, "a"), Vec::<Uuid>::new());
    }

    #[test]
    fn descendants_come_before_own_values() {
        let tr = Trie::new();
        let exact = Uuid::new_v4();
        let longer = Uuid::new_v4();

        tr.add("ann", exact);
        tr.add("anna", longer);

        assert_eq!(tr.get(5, "ann"), vec![longer, exact]);
    }

    #[test]
    fn empty_or_unmatched_prefix_yields_empty() {
        let tr = Trie::new();
        tr.add("abc", Uuid::new_v4());
        assert!(tr.get(5, "").is_empty());
        assert!(tr.get(5, "zzz").is_empty());
        assert!(tr.get(5, "abcd").is_empty());
    }

    #[test]
    fn remove_prunes_empty_interior_nodes() {
        let tr = Trie::new();
        let id = Uuid::new_v4();
        tr.add("aba", id);

        tr.remove("aba", id).unwrap();
        assert!(tr.get(3, "aba").is_empty());
        // interior nodes along the path are gone too
        assert!(tr.get(3, "ab").is_empty());
        assert!(tr.get(3, "a").is_empty());

        // path no longer exists, so a second remove errors
        assert!(matches!(tr.remove("aba", id), Err(TrieError::KeyNotFound(_))));
    }

    #[test]
    fn remove_keeps_shared_prefixes() {
        let tr = Trie::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        tr.add("ab", id1);
        tr.add("abc", id2);

        tr.remove("abc", id2).unwrap();
        assert_eq!(tr.get(3, "ab"), vec![id1]);
        assert_eq!(tr.get(3, "a"), vec![id1]);
    }

    #[test]
    fn remove_absent_path_errors() {
        let tr = Trie::new();
        tr.add("abc", Uuid::new_v4());
        let err = tr.remove("abx", Uuid::new_v4()).unwrap_err();
        assert_eq!(err, TrieError::KeyNotFound("x".to_string()));
        // empty key names the root, nothing to do
        tr.remove("", Uuid::new_v4()).unwrap();
    }

    #[test]
    fn results_are_repeatable() {
        let tr = Trie::new();
        let ids: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            tr.add(&format!("user{}", i), *id);
        }
        let first = tr.get(8, "user");
        for _ in 0..5 {
            assert_eq!(tr.get(8, "user"), first);
        }
    }

    #[test]
    fn insertion_order_does_not_affect_results() {
        use rand::seq::SliceRandom;

        let mut pairs: Vec<(String, Uuid)> = ["amy", "amya", "ana", "anab", "anna", "ann"]
            .iter()
            .map(|k| (k.to_string(), Uuid::new_v4()))
            .collect();

        let ordered = Trie::new();
        for (k, id) in &pairs {
            ordered.add(k, *id);
        }
        let expected = ordered.get(10, "a");

        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            pairs.shuffle(&mut rng);
            let shuffled = Trie::new();
            for (k, id) in &pairs {
                shuffled.add(k, *id);
            }
            assert_eq!(shuffled.get(10, "a"), expected);
        }
    }

    #[test]
    fn concurrent_readers_and_writers() {
        use std::sync::Arc;
        let tr = Arc::new(Trie::new());
        let id = Uuid::new_v4();
        tr.add("base", id);

        let mut handles = Vec::new();
        for i in 0..8 {
            let tr = tr.clone();
            handles.push(std::thread::spawn(move || {
                let mine = Uuid::new_v4();
                let key = format!("writer{}", i);
                tr.add(&key, mine);
                assert_eq!(tr.get(1, &key), vec![mine]);
                tr.remove(&key, mine).unwrap();
                assert_eq!(tr.get(3, "base"), vec![id]);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tr.get(3, "base"), vec![id]);
    }
}
