pub mod hash_ring;
pub mod recency_list;

pub use hash_ring::{default_hash, HashFn, HashRing};
pub use recency_list::{NodeId, RecencyList};
