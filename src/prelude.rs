pub use crate::byteview::ByteView;
pub use crate::ds::{HashRing, RecencyList};
pub use crate::error::{ConfigError, GroupError, LoadError, PeerError};
pub use crate::group::{Group, GroupRegistry, GroupStats};
pub use crate::peers::RingPeerPicker;
pub use crate::policy::lru::{CacheStats, CacheValue, ConcurrentLruStore, LruStore};
pub use crate::singleflight::SingleFlight;
pub use crate::traits::{loader_fn, Loader, LoaderFn, PeerFetcher, PeerPicker};

#[cfg(feature = "http")]
pub use crate::transport::http::{HttpFetcher, HttpPool, HttpPoolOptions};
