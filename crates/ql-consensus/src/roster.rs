//! # Replica roster
//!
//! The ordered list of replica public keys. Replica indices are positions in
//! this list; removal shifts later replicas down one slot, so indices stay
//! dense and `leader_index = view % len` always lands on a live replica.

/// Ordered, 0-indexed replica set. Keys are hex-encoded Ed25519 public keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerRoster {
    keys: Vec<String>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: Vec<String>) -> Self {
        Self { keys }
    }

    /// Append a replica. Returns `false` if the key is already present.
    pub fn push(&mut self, key: String) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Remove a replica, keeping the order of the rest. Returns its former
    /// index.
    pub fn remove(&mut self, key: &str) -> Option<usize> {
        let index = self.index_of(key)?;
        self.keys.remove(index);
        Some(index)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The leader of a view: round-robin over the roster.
    pub fn leader_index(&self, view: u64) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        (view % self.keys.len() as u64) as usize
    }
}
