//! # Group Collaborator Traits
//!
//! A [`Group`](crate::group::Group) talks to the outside world through three
//! single-method traits. Each one can be swapped for a stub in tests.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!                      │           Group              │
//!                      │  get(key) → ByteView         │
//!                      └──────┬───────────────┬───────┘
//!                             │ miss          │ miss
//!              ┌──────────────▼─────┐   ┌─────▼───────────────────┐
//!              │   PeerPicker       │   │   Loader                │
//!              │                    │   │                         │
//!              │ pick_peer(key)     │   │ load(key) → Vec<u8>     │
//!              │  → PeerFetcher?    │   │                         │
//!              └──────────────┬─────┘   └─────────────────────────┘
//!                             │ Some(owner)
//!              ┌──────────────▼──────────────┐
//!              │   PeerFetcher               │
//!              │                             │
//!              │ fetch(group, key) → Vec<u8> │
//!              └─────────────────────────────┘
//! ```
//!
//! ## Trait Summary
//!
//! | Trait         | Standard implementation                          |
//! |---------------|--------------------------------------------------|
//! | `Loader`      | [`LoaderFn`] wrapping a closure                  |
//! | `PeerPicker`  | [`RingPeerPicker`](crate::peers::RingPeerPicker), `HttpPool` |
//! | `PeerFetcher` | `HttpFetcher`                                    |
//!
//! ## Thread Safety
//!
//! All three traits require `Send + Sync`: a group calls them from whatever
//! thread triggered the miss.

use std::fmt;
use std::sync::Arc;

use crate::error::{LoadError, PeerError};

/// Produces the value for a key when no cache has it.
///
/// # Example
///
/// ```
/// use peercache::error::LoadError;
/// use peercache::traits::Loader;
///
/// struct Scores;
///
/// impl Loader for Scores {
///     fn load(&self, key: &str) -> Result<Vec<u8>, LoadError> {
///         match key {
///             "Tom" => Ok(b"630".to_vec()),
///             _ => Err(LoadError::new(format!("{key} not exist"))),
///         }
///     }
/// }
///
/// assert_eq!(Scores.load("Tom").unwrap(), b"630");
/// assert!(Scores.load("Kate").is_err());
/// ```
pub trait Loader: Send + Sync {
    fn load(&self, key: &str) -> Result<Vec<u8>, LoadError>;
}

/// [`Loader`] backed by a closure. Build one with [`loader_fn`].
pub struct LoaderFn<F>(F);

/// Wraps a closure as a [`Loader`].
///
/// # Example
///
/// ```
/// use peercache::traits::{loader_fn, Loader};
///
/// let loader = loader_fn(|key| Ok(key.as_bytes().to_vec()));
/// assert_eq!(loader.load("key").unwrap(), b"key");
/// ```
pub fn loader_fn<F>(f: F) -> LoaderFn<F>
where
    F: Fn(&str) -> Result<Vec<u8>, LoadError> + Send + Sync,
{
    LoaderFn(f)
}

impl<F> Loader for LoaderFn<F>
where
    F: Fn(&str) -> Result<Vec<u8>, LoadError> + Send + Sync,
{
    fn load(&self, key: &str) -> Result<Vec<u8>, LoadError> {
        (self.0)(key)
    }
}

impl<F> fmt::Debug for LoaderFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderFn").finish_non_exhaustive()
    }
}

impl<L: Loader + ?Sized> Loader for Arc<L> {
    fn load(&self, key: &str) -> Result<Vec<u8>, LoadError> {
        (**self).load(key)
    }
}

/// Fetches a key of a named group from one remote peer.
pub trait PeerFetcher: Send + Sync {
    fn fetch(&self, group: &str, key: &str) -> Result<Vec<u8>, PeerError>;
}

/// Chooses the peer that owns a key.
///
/// Returns `None` when the key should be served locally, either because this
/// node owns it or because no peers are known.
pub trait PeerPicker: Send + Sync {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>>;
}
