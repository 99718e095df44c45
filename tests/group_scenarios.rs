// ==============================================
// GROUP END-TO-END SCENARIOS (integration)
// ==============================================
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use peercache::error::{GroupError, LoadError, PeerError};
use peercache::group::{loader_fn, GroupRegistry};
use peercache::peers::RingPeerPicker;
use peercache::traits::{PeerFetcher, PeerPicker};

fn scores_db() -> HashMap<&'static str, &'static str> {
    HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")])
}

/// Peer that answers every fetch with a fixed value and counts calls.
struct StaticPeer {
    value: &'static str,
    calls: AtomicUsize,
}

impl StaticPeer {
    fn new(value: &'static str) -> Arc<Self> {
        Arc::new(Self {
            value,
            calls: AtomicUsize::new(0),
        })
    }
}

impl PeerFetcher for StaticPeer {
    fn fetch(&self, _group: &str, _key: &str) -> Result<Vec<u8>, PeerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.as_bytes().to_vec())
    }
}

/// Routes one key to a fixed peer and everything else locally.
struct RouteOne {
    key: &'static str,
    peer: Arc<dyn PeerFetcher>,
}

impl PeerPicker for RouteOne {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>> {
        (key == self.key).then(|| Arc::clone(&self.peer))
    }
}

mod read_through {
    use super::*;

    #[test]
    fn second_get_is_a_cache_hit() {
        let registry = GroupRegistry::new();
        let db = scores_db();
        let loads: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let counts = Arc::clone(&loads);
        let group = registry
            .new_group(
                "scores",
                2 << 10,
                loader_fn(move |key| {
                    *counts.lock().entry(key.to_string()).or_default() += 1;
                    db.get(key)
                        .map(|v| v.as_bytes().to_vec())
                        .ok_or_else(|| LoadError::new(format!("{key} not exist")))
                }),
            )
            .unwrap();

        for (name, score) in scores_db() {
            assert_eq!(group.get(name).unwrap().to_string(), score);
            assert_eq!(group.get(name).unwrap().to_string(), score);
            assert_eq!(loads.lock()[name], 1, "cache miss for {name}");
        }

        let stats = group.stats();
        assert_eq!(stats.local_loads, 3);
        assert_eq!(stats.cache_hits, 3);
    }

    #[test]
    fn empty_key_never_reaches_loader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = GroupRegistry::new();
        let group = registry
            .new_group(
                "scores",
                0,
                loader_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Vec::new())
                }),
            )
            .unwrap();

        assert_eq!(group.get(""), Err(GroupError::EmptyKey));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remote_value_is_not_cached_locally() {
        let registry = GroupRegistry::new();
        let group = registry
            .new_group("scores", 0, loader_fn(|key| Ok(format!("local-{key}").into_bytes())))
            .unwrap();
        let remote = StaticPeer::new("42");
        group
            .register_peers(Arc::new(RouteOne {
                key: "X",
                peer: remote.clone(),
            }))
            .unwrap();

        assert_eq!(group.get("X").unwrap().to_string(), "42");
        assert!(!group.is_cached("X"));

        // Not cached, so the peer is asked again.
        assert_eq!(group.get("X").unwrap().to_string(), "42");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);

        // Keys this node owns still go to the loader and are cached.
        assert_eq!(group.get("Y").unwrap().to_string(), "local-Y");
        assert!(group.is_cached("Y"));

        let stats = group.stats();
        assert_eq!(stats.peer_loads, 2);
        assert_eq!(stats.local_loads, 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = GroupRegistry::new();
        let group = registry
            .new_group(
                "scores",
                0,
                loader_fn(move |key| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LoadError::new(format!("{key} not exist")))
                }),
            )
            .unwrap();

        for _ in 0..2 {
            let err = group.get("missing").unwrap_err();
            assert_eq!(err, GroupError::Load(LoadError::new("missing not exist")));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(group.stats().local_load_errors, 2);
    }
}

mod wiring {
    use super::*;

    #[test]
    fn duplicate_group_name_is_a_config_error() {
        let registry = GroupRegistry::new();
        registry
            .new_group("scores", 0, loader_fn(|_| Ok(Vec::new())))
            .unwrap();
        let err = registry
            .new_group("scores", 0, loader_fn(|_| Ok(Vec::new())))
            .unwrap_err();
        assert!(err.to_string().contains("scores"));
    }

    #[test]
    fn second_peer_registration_is_a_config_error() {
        let registry = GroupRegistry::new();
        let group = registry
            .new_group("scores", 0, loader_fn(|_| Ok(Vec::new())))
            .unwrap();
        group
            .register_peers(Arc::new(RingPeerPicker::new("self", 10)))
            .unwrap();
        assert!(group
            .register_peers(Arc::new(RingPeerPicker::new("self", 10)))
            .is_err());
    }

    #[test]
    fn empty_peer_set_falls_back_to_loader() {
        let registry = GroupRegistry::new();
        let group = registry
            .new_group("scores", 0, loader_fn(|key| Ok(key.as_bytes().to_vec())))
            .unwrap();
        group
            .register_peers(Arc::new(RingPeerPicker::new("self", 10)))
            .unwrap();

        assert_eq!(group.get("Tom").unwrap().to_string(), "Tom");
        assert_eq!(group.stats().local_loads, 1);
        assert_eq!(group.stats().peer_loads, 0);
    }

    #[test]
    fn registry_lookup_returns_same_group() {
        let registry = GroupRegistry::new();
        let created = registry
            .new_group("scores", 0, loader_fn(|_| Ok(b"v".to_vec())))
            .unwrap();
        let found = registry.get_group("scores").unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert!(registry.get_group("other").is_none());
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn concurrent_misses_load_once() {
        let threads = 16;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = GroupRegistry::new();
        let group = registry
            .new_group(
                "scores",
                0,
                loader_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(200));
                    Ok(b"630".to_vec())
                }),
            )
            .unwrap();

        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let group = Arc::clone(&group);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    group.get("Tom")
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().to_string(), "630");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.stats().loads_executed, 1);
    }

    #[test]
    fn groups_coalesce_independently() {
        let registry = GroupRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut groups = Vec::new();
        for name in ["a", "b"] {
            let counter = Arc::clone(&calls);
            let group = registry
                .new_group(
                    name,
                    0,
                    loader_fn(move |key| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(key.as_bytes().to_vec())
                    }),
                )
                .unwrap();
            groups.push(group);
        }

        let handles: Vec<_> = groups
            .iter()
            .map(|group| {
                let group = Arc::clone(group);
                thread::spawn(move || group.get("same-key"))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().to_string(), "same-key");
        }

        // Same key in two groups is two loads.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
