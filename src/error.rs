//! Error types for the peercache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when a group, registry or transport is wired up
//!   incorrectly (duplicate group name, second peer registration, bad options).
//! - [`LoadError`]: Returned by a [`Loader`](crate::group::Loader) when the
//!   backing data source cannot produce a value.
//! - [`PeerError`]: Returned by a [`PeerFetcher`](crate::peers::PeerFetcher)
//!   when a remote peer cannot serve a key.
//! - [`GroupError`]: Returned by [`Group::get`](crate::group::Group::get).
//!
//! ## Example Usage
//!
//! ```
//! use peercache::error::{GroupError, LoadError};
//! use peercache::group::{loader_fn, GroupRegistry};
//!
//! let registry = GroupRegistry::new();
//! let group = registry
//!     .new_group("users", 1024, loader_fn(|key| {
//!         Err(LoadError::new(format!("{key} not exist")))
//!     }))
//!     .unwrap();
//!
//! let err = group.get("alice").unwrap_err();
//! assert!(matches!(err, GroupError::Load(_)));
//! assert_eq!(err.to_string(), "alice not exist");
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache wiring is invalid.
///
/// Produced by [`GroupRegistry::new_group`](crate::group::GroupRegistry::new_group),
/// [`Group::register_peers`](crate::group::Group::register_peers) and the
/// transport constructors. Carries a human-readable description of what was
/// rejected.
///
/// # Example
///
/// ```
/// use peercache::error::ConfigError;
/// use peercache::group::{loader_fn, GroupRegistry};
///
/// let registry = GroupRegistry::new();
/// registry.new_group("scores", 0, loader_fn(|_| Ok(Vec::new()))).unwrap();
///
/// let err: ConfigError = registry
///     .new_group("scores", 0, loader_fn(|_| Ok(Vec::new())))
///     .unwrap_err();
/// assert!(err.to_string().contains("scores"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// LoadError
// ---------------------------------------------------------------------------

/// Error returned by a loader when the source has no value for a key.
///
/// The message is propagated verbatim to every caller coalesced onto the
/// failed load and, over HTTP, becomes the body of the 500 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError(String);

impl LoadError {
    /// Creates a new `LoadError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for LoadError {}

// ---------------------------------------------------------------------------
// PeerError
// ---------------------------------------------------------------------------

/// Error returned when a remote peer cannot serve a key.
///
/// `status` is set when the peer answered with a non-success HTTP status and
/// left empty for connection-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerError {
    status: Option<u16>,
    message: String,
}

impl PeerError {
    /// Creates a transport-level `PeerError` with no status code.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            status: None,
            message: msg.into(),
        }
    }

    /// Creates a `PeerError` for a peer that answered with `status`.
    #[inline]
    pub fn with_status(status: u16, msg: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: msg.into(),
        }
    }

    /// Returns the status code the peer answered with, if any.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "peer returned {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for PeerError {}

// ---------------------------------------------------------------------------
// GroupError
// ---------------------------------------------------------------------------

/// Error returned by [`Group::get`](crate::group::Group::get).
///
/// `Clone` so that a single coalesced outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// The caller passed an empty key.
    EmptyKey,
    /// The loader failed to produce a value.
    Load(LoadError),
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupError::EmptyKey => f.write_str("key is required"),
            GroupError::Load(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for GroupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GroupError::EmptyKey => None,
            GroupError::Load(err) => Some(err),
        }
    }
}

impl From<LoadError> for GroupError {
    fn from(err: LoadError) -> Self {
        GroupError::Load(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
