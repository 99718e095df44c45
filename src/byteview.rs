//! Immutable cache value.
//!
//! [`ByteView`] is the value type stored in every group's local cache and
//! returned from [`Group::get`](crate::group::Group::get). It wraps a
//! [`Bytes`] buffer that is never mutated after construction, so clones are
//! cheap reference-count bumps and callers cannot corrupt cached state.
//!
//! ## Example Usage
//!
//! ```
//! use peercache::ByteView;
//!
//! let mut source = b"630".to_vec();
//! let view = ByteView::copy_from_slice(&source);
//!
//! // Mutating the original buffer does not reach the view.
//! source[0] = b'9';
//! assert_eq!(view.to_string(), "630");
//!
//! // Owned accessors hand out copies.
//! let mut copy = view.byte_slice();
//! copy.clear();
//! assert_eq!(view.len(), 3);
//! ```

use std::fmt;

use bytes::Bytes;

use crate::policy::lru::CacheValue;

/// Read-only view over a cached byte sequence.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    bytes: Bytes,
}

impl ByteView {
    /// Copies `data` into a new view.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
        }
    }

    /// Returns the number of bytes in the view.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the view holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns an owned copy of the bytes.
    pub fn byte_slice(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Same as [`byte_slice`](Self::byte_slice).
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.byte_slice()
    }

    /// Returns a shared handle to the underlying buffer.
    ///
    /// `Bytes` is immutable, so the handle cannot alter the cached value.
    pub fn as_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Borrows the bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for ByteView {
    /// Takes ownership of `bytes`; the caller can no longer mutate them.
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        Self::copy_from_slice(data)
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        Self::copy_from_slice(data.as_bytes())
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl CacheValue for ByteView {
    #[inline]
    fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByteView").field(&self.bytes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_slice_returns_independent_copy() {
        let view = ByteView::from("630");
        let mut copy = view.byte_slice();
        copy[0] = b'0';
        assert_eq!(view.as_slice(), b"630");
        assert_eq!(copy, b"030");
    }

    #[test]
    fn copy_from_slice_detaches_from_source() {
        let mut source = vec![1u8, 2, 3];
        let view = ByteView::copy_from_slice(&source);
        source[1] = 9;
        assert_eq!(view.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn size_matches_len() {
        let view = ByteView::from(vec![0u8; 17]);
        assert_eq!(view.len(), 17);
        assert_eq!(view.size(), 17);
        assert!(!view.is_empty());
        assert!(ByteView::default().is_empty());
    }

    #[test]
    fn display_is_lossy_utf8() {
        assert_eq!(ByteView::from("hello").to_string(), "hello");
        assert_eq!(ByteView::from(vec![0xff]).to_string(), "\u{fffd}");
    }

    #[test]
    fn clones_share_contents() {
        let a = ByteView::from("42");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }
}
