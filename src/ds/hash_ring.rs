//! Consistent hash ring for key-to-peer ownership.
//!
//! Maps arbitrary string keys to one of a set of peer names so that every
//! node in a cluster agrees on which peer owns a key, and so that adding or
//! removing a peer only moves roughly `1/N` of the keys.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ring Lookup Flow                               │
//! │                                                                         │
//! │   add("A"), replicas = 3                                                │
//! │     hash("0A") hash("1A") hash("2A")  ──►  virtual nodes for A          │
//! │                                                                         │
//! │   sorted ring:  [ 11 │ 24 │ 37 │ 58 │ 71 │ 90 ]                         │
//! │                   A    B    A    C    B    A                            │
//! │                                                                         │
//! │   get("user:1")                                                         │
//! │     1. h = hash("user:1")                = 62                           │
//! │     2. first ring value >= h (binary search) = 71                       │
//! │     3. owner of 71                       = B                            │
//! │                                                                         │
//! │   h greater than every ring value  ──►  wrap to index 0                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Virtual nodes**: each peer occupies `replicas` ring positions, hashed
//!   from the replica index prefixed to the peer name, which smooths load
//! - **Deterministic mapping**: a fixed ring state and hash function always
//!   route a key to the same peer
//! - **Pluggable hash**: CRC-32 (IEEE) by default; tests inject their own
//!
//! ## Example Usage
//!
//! ```
//! use peercache::ds::HashRing;
//!
//! let mut ring = HashRing::new(50);
//! ring.add(["http://10.0.0.1:8001", "http://10.0.0.2:8001"]);
//!
//! let owner = ring.get("Tom").unwrap();
//! assert_eq!(ring.get("Tom"), Some(owner));
//! ```
//!
//! ## Performance
//!
//! - `add`: O(R log R) for R total virtual nodes (re-sort)
//! - `get`: O(log R)

use std::collections::HashMap;

/// Hash function applied to virtual-node names and lookup keys.
pub type HashFn = fn(&[u8]) -> u32;

/// Default ring hash: CRC-32 with the IEEE polynomial.
pub fn default_hash(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Consistent hash ring with virtual nodes.
///
/// # Example
///
/// ```
/// use peercache::ds::HashRing;
///
/// let mut ring = HashRing::new(3);
/// assert_eq!(ring.get("anything"), None);
///
/// ring.add(["A", "B", "C"]);
/// assert_eq!(ring.len(), 3);
/// assert!(["A", "B", "C"].contains(&ring.get("anything").unwrap()));
/// ```
#[derive(Debug, Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    keys: Vec<u32>,
    owners: HashMap<u32, String>,
    peers: Vec<String>,
}

impl HashRing {
    /// Creates an empty ring with `replicas` virtual nodes per peer and the
    /// default CRC-32 hash.
    ///
    /// The replica count is clamped to at least 1.
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, default_hash)
    }

    /// Creates an empty ring using `hash` for both virtual nodes and keys.
    ///
    /// # Example
    ///
    /// ```
    /// use peercache::ds::HashRing;
    ///
    /// fn first_byte(data: &[u8]) -> u32 {
    ///     data.first().copied().unwrap_or(0) as u32
    /// }
    ///
    /// let ring = HashRing::with_hasher(0, first_byte);
    /// assert_eq!(ring.replicas(), 1);
    /// ```
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas: replicas.max(1),
            keys: Vec::new(),
            owners: HashMap::new(),
            peers: Vec::new(),
        }
    }

    /// Returns the number of virtual nodes each peer occupies.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Returns the number of real peers on the ring.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if no peer has been added.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the real peers in insertion order.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Adds peers to the ring, `replicas` virtual nodes each.
    ///
    /// Peers already on the ring are skipped.
    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for peer in peers {
            let peer = peer.into();
            if self.peers.contains(&peer) {
                continue;
            }
            for i in 0..self.replicas {
                let hash = self.virtual_node_hash(i, &peer);
                self.keys.push(hash);
                self.owners.insert(hash, peer.clone());
            }
            self.peers.push(peer);
        }
        self.keys.sort_unstable();
    }

    /// Removes a peer and all of its virtual nodes.
    ///
    /// Returns `false` if the peer was not on the ring.
    pub fn remove(&mut self, peer: &str) -> bool {
        let Some(pos) = self.peers.iter().position(|p| p == peer) else {
            return false;
        };
        self.peers.remove(pos);

        for i in 0..self.replicas {
            let hash = self.virtual_node_hash(i, peer);
            if self.owners.get(&hash).map(String::as_str) == Some(peer) {
                self.owners.remove(&hash);
            }
        }
        let owners = &self.owners;
        self.keys.retain(|hash| owners.contains_key(hash));
        true
    }

    /// Returns the peer owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.keys.partition_point(|&ring_hash| ring_hash < hash);
        let ring_hash = self.keys[idx % self.keys.len()];
        self.owners.get(&ring_hash).map(String::as_str)
    }

    fn virtual_node_hash(&self, replica: usize, peer: &str) -> u32 {
        (self.hash)(format!("{replica}{peer}").as_bytes())
    }
}

impl Default for HashRing {
    /// Creates an empty ring with 50 replicas per peer.
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parses the input as a decimal number so ring positions are predictable.
    fn decimal_hash(data: &[u8]) -> u32 {
        std::str::from_utf8(data)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    #[test]
    fn empty_ring_returns_none() {
        let ring = HashRing::new(3);
        assert!(ring.is_empty());
        assert_eq!(ring.get("key"), None);
    }

    #[test]
    fn lookups_follow_ring_order_and_wrap() {
        let mut ring = HashRing::with_hasher(3, decimal_hash);

        // Virtual nodes: 2, 4, 6, 12, 14, 16, 22, 24, 26
        ring.add(["6", "4", "2"]);

        let cases = [("2", "2"), ("11", "2"), ("23", "4"), ("27", "2")];
        for (key, owner) in cases {
            assert_eq!(ring.get(key), Some(owner), "asking for {key}");
        }

        // Adds 8, 18, 28
        ring.add(["8"]);

        // 27 now maps to 8 instead of wrapping around to 2
        let cases = [("2", "2"), ("11", "2"), ("23", "4"), ("27", "8")];
        for (key, owner) in cases {
            assert_eq!(ring.get(key), Some(owner), "asking for {key}");
        }
    }

    #[test]
    fn remove_restores_previous_ownership() {
        let mut ring = HashRing::with_hasher(3, decimal_hash);
        ring.add(["6", "4", "2"]);
        ring.add(["8"]);
        assert_eq!(ring.get("27"), Some("8"));

        assert!(ring.remove("8"));
        assert!(!ring.remove("8"));
        assert_eq!(ring.get("27"), Some("2"));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn keys_stay_sorted() {
        let mut ring = HashRing::new(10);
        ring.add(["a", "b"]);
        ring.add(["c"]);
        assert!(ring.keys.windows(2).all(|w| w[0] <= w[1]));
        ring.remove("b");
        assert!(ring.keys.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ring.keys.len(), 20);
    }

    #[test]
    fn adding_same_peer_twice_is_ignored() {
        let mut ring = HashRing::new(5);
        ring.add(["a"]);
        ring.add(["a"]);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.keys.len(), 5);
    }

    #[test]
    fn default_hash_is_crc32_ieee() {
        // Well-known CRC-32 check value.
        assert_eq!(default_hash(b"123456789"), 0xCBF4_3926);
    }
}
