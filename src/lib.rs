//! peercache: a distributed, read-through, in-process byte cache.
//!
//! Each node holds a byte-bounded LRU store per [`Group`]. A miss is routed to
//! the peer that owns the key on a consistent hash ring; if this node owns it
//! (or the peer is unreachable) the group's [`Loader`] produces the value.
//! Concurrent misses for the same key are collapsed into one load.
//!
//! ## Quick Start
//!
//! ```
//! use peercache::prelude::*;
//!
//! let registry = GroupRegistry::new();
//! let group = registry
//!     .new_group("scores", 2 << 10, loader_fn(|key| match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(LoadError::new(format!("{key} not exist"))),
//!     }))
//!     .unwrap();
//!
//! let view: ByteView = group.get("Tom").unwrap();
//! assert_eq!(view.as_slice(), b"630");
//! assert!(group.get("Kate").is_err());
//! ```
//!
//! With the `http` feature, [`transport::http`] provides the peer picker,
//! fetcher and axum router that connect nodes over HTTP.

pub mod byteview;
pub mod ds;
pub mod error;
pub mod group;
pub mod peers;
pub mod policy;
pub mod prelude;
pub mod singleflight;
pub mod traits;

#[cfg(feature = "http")]
pub mod transport;

pub use byteview::ByteView;
pub use error::{ConfigError, GroupError, LoadError, PeerError};
pub use group::{Group, GroupRegistry, GroupStats};
pub use traits::{loader_fn, Loader, PeerFetcher, PeerPicker};
