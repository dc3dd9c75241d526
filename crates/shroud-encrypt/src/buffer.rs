//! Owned, length-tracked byte buffer.

use std::fmt;
use std::ops::{Deref, DerefMut};

use bytes::{BufMut, Bytes, BytesMut};

/// Growable byte buffer used to stage plaintext spans.
///
/// Writes past the current end zero-fill the gap, so a buffer always
/// describes one contiguous run of bytes starting at its own offset 0.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: BytesMut,
}

impl ByteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
        }
    }

    /// Creates a buffer of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: BytesMut::zeroed(len),
        }
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Copies `src` to `offset`, growing the buffer as needed.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) {
        let end = offset + src.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(src);
    }

    /// Appends bytes at the end.
    pub fn extend_from_slice(&mut self, src: &[u8]) {
        self.data.put_slice(src);
    }

    /// Shortens the buffer to `len` bytes. No effect if already shorter.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Drops every byte.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Converts into an immutable, cheaply clonable handle.
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    /// Converts into a vector.
    pub fn into_vec(self) -> Vec<u8> {
        self.data.to_vec()
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for ByteBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(src: &[u8]) -> Self {
        Self {
            data: BytesMut::from(src),
        }
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(src: Vec<u8>) -> Self {
        Self {
            data: BytesMut::from(&src[..]),
        }
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteBuffer(len={})", self.data.len())
    }
}
