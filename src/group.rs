//! # Cache groups
//!
//! A [`Group`] is a named cache namespace: a byte-bounded local LRU store, a
//! [`Loader`] for misses, an optional [`PeerPicker`] that spreads ownership
//! of keys across a cluster, and a [`SingleFlight`] that collapses
//! concurrent misses for the same key into one load.
//!
//! ## Lookup Flow
//!
//! ```text
//!   get(key)
//!     │
//!     ├── key empty ───────────────────────────────► Err(EmptyKey)
//!     │
//!     ├── local store hit ─────────────────────────► Ok(value)
//!     │
//!     └── miss ──► flight.work(key, load)
//!                     │
//!                     ├── peer picker says remote owner
//!                     │      └── fetch from peer ── ok ──► Ok(value)   (not stored locally)
//!                     │                          └─ err ─► fall through
//!                     │
//!                     └── loader.load(key)
//!                            ├── ok ──► store locally ──► Ok(value)
//!                            └── err ─────────────────► Err(Load)
//! ```
//!
//! ## Registry
//!
//! [`GroupRegistry`] owns the name → group map that transport handlers use
//! to resolve the group named in a request. It is an ordinary value, shared
//! through `Arc`, so tests and embedders control its lifetime.
//!
//! ## Example Usage
//!
//! ```
//! use peercache::error::LoadError;
//! use peercache::group::{loader_fn, GroupRegistry};
//!
//! let registry = GroupRegistry::new();
//! let scores = registry
//!     .new_group("scores", 2 << 10, loader_fn(|key| match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(LoadError::new(format!("{key} not exist"))),
//!     }))
//!     .unwrap();
//!
//! assert_eq!(scores.get("Tom").unwrap().to_string(), "630");
//! assert_eq!(scores.stats().local_loads, 1);
//!
//! // Second lookup is a local hit.
//! scores.get("Tom").unwrap();
//! assert_eq!(scores.stats().cache_hits, 1);
//!
//! let same = registry.get_group("scores").unwrap();
//! assert_eq!(same.name(), "scores");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::byteview::ByteView;
use crate::error::{ConfigError, GroupError};
use crate::policy::lru::{CacheStats, ConcurrentLruStore};
use crate::singleflight::SingleFlight;

pub use crate::traits::{loader_fn, Loader, LoaderFn, PeerFetcher, PeerPicker};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time counters for a [`Group`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Calls to `get`, including rejected ones.
    pub gets: u64,
    /// Lookups answered by the local store.
    pub cache_hits: u64,
    /// Misses that went through the coalescer.
    pub loads: u64,
    /// Loads that actually ran (the rest waited on another caller).
    pub loads_executed: u64,
    /// Values served by a remote peer.
    pub peer_loads: u64,
    /// Remote fetches that failed and fell back to the loader.
    pub peer_errors: u64,
    /// Values produced by the local loader.
    pub local_loads: u64,
    /// Loader failures.
    pub local_load_errors: u64,
    /// Requests received from peers over a transport.
    pub server_requests: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    loads: AtomicU64,
    loads_executed: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    local_loads: AtomicU64,
    local_load_errors: AtomicU64,
    server_requests: AtomicU64,
}

impl StatsCounters {
    #[inline]
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> GroupStats {
        GroupStats {
            gets: self.gets.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            loads_executed: self.loads_executed.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.peer_errors.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            local_load_errors: self.local_load_errors.load(Ordering::Relaxed),
            server_requests: self.server_requests.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A named, read-through cache namespace.
pub struct Group {
    name: String,
    loader: Box<dyn Loader>,
    main_cache: ConcurrentLruStore<ByteView>,
    peers: OnceCell<Arc<dyn PeerPicker>>,
    flight: SingleFlight<ByteView, GroupError>,
    stats: StatsCounters,
}

impl Group {
    /// Creates a group that is not registered anywhere.
    ///
    /// Most callers want [`GroupRegistry::new_group`], which makes the group
    /// reachable by name from transport handlers.
    pub fn new<L>(name: impl Into<String>, cache_bytes: usize, loader: L) -> Self
    where
        L: Loader + 'static,
    {
        Self {
            name: name.into(),
            loader: Box::new(loader),
            main_cache: ConcurrentLruStore::new(cache_bytes),
            peers: OnceCell::new(),
            flight: SingleFlight::new(),
            stats: StatsCounters::default(),
        }
    }

    /// Returns the group's namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs the strategy that decides which peer owns each key.
    ///
    /// A group routes with one picker for its whole life: a second call is
    /// rejected and leaves the first picker in place.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<(), ConfigError> {
        self.peers.set(peers).map_err(|_| {
            ConfigError::new(format!(
                "register_peers called more than once for group {}",
                self.name
            ))
        })
    }

    /// Returns the value for `key`, loading it on a miss.
    pub fn get(&self, key: &str) -> Result<ByteView, GroupError> {
        StatsCounters::inc(&self.stats.gets);
        if key.is_empty() {
            return Err(GroupError::EmptyKey);
        }

        if let Some(value) = self.main_cache.get(key) {
            StatsCounters::inc(&self.stats.cache_hits);
            debug!(group = %self.name, key, "cache hit");
            return Ok(value);
        }

        self.load(key)
    }

    /// Returns a snapshot of the group's counters.
    pub fn stats(&self) -> GroupStats {
        self.stats.snapshot()
    }

    /// Returns a snapshot of the local store.
    pub fn cache_stats(&self) -> CacheStats {
        self.main_cache.stats()
    }

    /// Returns `true` if `key` is resident in this node's local store.
    pub fn is_cached(&self, key: &str) -> bool {
        self.main_cache.contains(key)
    }

    /// Counts a request that arrived from a peer.
    pub fn record_server_request(&self) {
        StatsCounters::inc(&self.stats.server_requests);
    }

    fn load(&self, key: &str) -> Result<ByteView, GroupError> {
        StatsCounters::inc(&self.stats.loads);
        self.flight.work(key, || {
            StatsCounters::inc(&self.stats.loads_executed);

            if let Some(peer) = self.peers.get().and_then(|picker| picker.pick_peer(key)) {
                match self.get_from_peer(peer.as_ref(), key) {
                    Ok(value) => {
                        StatsCounters::inc(&self.stats.peer_loads);
                        return Ok(value);
                    },
                    Err(err) => {
                        StatsCounters::inc(&self.stats.peer_errors);
                        warn!(group = %self.name, key, error = %err, "failed to get from peer");
                    },
                }
            }

            self.get_locally(key)
        })
    }

    fn get_from_peer(
        &self,
        peer: &dyn PeerFetcher,
        key: &str,
    ) -> Result<ByteView, crate::error::PeerError> {
        let bytes = peer.fetch(&self.name, key)?;
        Ok(ByteView::from(bytes))
    }

    fn get_locally(&self, key: &str) -> Result<ByteView, GroupError> {
        match self.loader.load(key) {
            Ok(bytes) => {
                StatsCounters::inc(&self.stats.local_loads);
                let value = ByteView::copy_from_slice(&bytes);
                self.populate_cache(key, value.clone());
                Ok(value)
            },
            Err(err) => {
                StatsCounters::inc(&self.stats.local_load_errors);
                Err(GroupError::Load(err))
            },
        }
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache", &self.main_cache)
            .field("has_peers", &self.peers.get().is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// GroupRegistry
// ---------------------------------------------------------------------------

/// Name → [`Group`] map shared by the code that creates groups and the
/// transport that serves them.
///
/// Lookups take a shared lock and run concurrently; registration takes the
/// exclusive lock.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group and registers it under `name`.
    ///
    /// Fails if `name` is empty or already taken.
    pub fn new_group<L>(
        &self,
        name: impl Into<String>,
        cache_bytes: usize,
        loader: L,
    ) -> Result<Arc<Group>, ConfigError>
    where
        L: Loader + 'static,
    {
        self.register(Group::new(name, cache_bytes, loader))
    }

    /// Registers an already constructed group.
    pub fn register(&self, group: Group) -> Result<Arc<Group>, ConfigError> {
        if group.name.is_empty() {
            return Err(ConfigError::new("group name must not be empty"));
        }

        let mut groups = self.groups.write();
        if groups.contains_key(&group.name) {
            return Err(ConfigError::new(format!(
                "duplicate group name: {}",
                group.name
            )));
        }
        let group = Arc::new(group);
        groups.insert(group.name.clone(), Arc::clone(&group));
        Ok(group)
    }

    /// Looks up a group by name.
    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).map(Arc::clone)
    }

    /// Returns the registered group names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}

impl fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.names())
            .finish()
    }
}
