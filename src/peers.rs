//! Ring-backed peer selection.
//!
//! [`RingPeerPicker`] is the standard [`PeerPicker`]: it places every member
//! of the cluster on a [`HashRing`] and routes a key to the fetcher of its
//! owner, or to nobody when this node owns the key itself.
//!
//! The ring and the fetcher table form one immutable snapshot. `set_peers`
//! builds a complete new snapshot off to the side and swaps it in, so routing
//! never observes a half-updated membership.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use peercache::error::PeerError;
//! use peercache::peers::{PeerFetcher, PeerPicker, RingPeerPicker};
//!
//! struct Echo(String);
//!
//! impl PeerFetcher for Echo {
//!     fn fetch(&self, _group: &str, key: &str) -> Result<Vec<u8>, PeerError> {
//!         Ok(format!("{}:{key}", self.0).into_bytes())
//!     }
//! }
//!
//! let picker = RingPeerPicker::new("node-a", 50);
//! picker
//!     .set_peers(["node-a", "node-b"], |peer| {
//!         Ok(Arc::new(Echo(peer.to_string())) as Arc<dyn PeerFetcher>)
//!     })
//!     .unwrap();
//!
//! for key in ["Tom", "Jack", "Sam"] {
//!     match picker.owner(key).as_deref() {
//!         Some("node-a") => assert!(picker.pick_peer(key).is_none()),
//!         _ => assert!(picker.pick_peer(key).is_some()),
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::ds::hash_ring::{default_hash, HashFn, HashRing};
use crate::error::ConfigError;

pub use crate::traits::{PeerFetcher, PeerPicker};

struct Snapshot {
    ring: HashRing,
    fetchers: HashMap<String, Arc<dyn PeerFetcher>>,
}

/// [`PeerPicker`] that routes keys over a consistent hash ring.
pub struct RingPeerPicker {
    self_name: String,
    replicas: usize,
    hash: HashFn,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RingPeerPicker {
    /// Creates a picker for the node named `self_name`, with `replicas`
    /// virtual nodes per member. Until `set_peers` is called every key is
    /// served locally.
    pub fn new(self_name: impl Into<String>, replicas: usize) -> Self {
        Self::with_hasher(self_name, replicas, default_hash)
    }

    /// Same as [`new`](Self::new) with a custom ring hash.
    pub fn with_hasher(self_name: impl Into<String>, replicas: usize, hash: HashFn) -> Self {
        let snapshot = Snapshot {
            ring: HashRing::with_hasher(replicas, hash),
            fetchers: HashMap::new(),
        };
        Self {
            self_name: self_name.into(),
            replicas,
            hash,
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Returns the name this node is known by on the ring.
    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    /// Replaces the cluster membership.
    ///
    /// `peers` lists every member, normally including this node. `connect` is
    /// called once per member other than this node to build its fetcher. If
    /// any call fails, the current membership is left untouched.
    pub fn set_peers<I, S, F>(&self, peers: I, mut connect: F) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&str) -> Result<Arc<dyn PeerFetcher>, ConfigError>,
    {
        let members: Vec<String> = peers.into_iter().map(Into::into).collect();
        let mut fetchers: HashMap<String, Arc<dyn PeerFetcher>> = HashMap::new();
        for peer in &members {
            if *peer != self.self_name && !fetchers.contains_key(peer) {
                let fetcher = connect(peer)?;
                fetchers.insert(peer.clone(), fetcher);
            }
        }
        let mut ring = HashRing::with_hasher(self.replicas, self.hash);
        ring.add(members);

        info!(node = %self.self_name, peers = ?ring.peers(), "peer set updated");
        *self.snapshot.write() = Arc::new(Snapshot { ring, fetchers });
        Ok(())
    }

    /// Returns the member that owns `key`, which may be this node.
    pub fn owner(&self, key: &str) -> Option<String> {
        let snapshot = self.current();
        snapshot.ring.get(key).map(str::to_owned)
    }

    /// Returns the current members in the order they were given.
    pub fn peers(&self) -> Vec<String> {
        self.current().ring.peers().to_vec()
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }
}

impl PeerPicker for RingPeerPicker {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>> {
        let snapshot = self.current();
        let owner = snapshot.ring.get(key)?;
        if owner == self.self_name {
            return None;
        }
        snapshot.fetchers.get(owner).map(Arc::clone)
    }
}

impl fmt::Debug for RingPeerPicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingPeerPicker")
            .field("self_name", &self.self_name)
            .field("replicas", &self.replicas)
            .field("peers", &self.current().ring.peers())
            .finish()
    }
}
