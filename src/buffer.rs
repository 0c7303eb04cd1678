//! Owned/borrowed byte region shared by every archive and the RPC envelope.
//!
//! A `MemoryBuffer` tracks four monotonic positions over a byte region:
//! `buffer <= cursor <= end <= border`. `cursor` is the next-read position,
//! `end` is one past the last written byte, and `border` is the capacity of
//! the backing storage. Storage is always a plain owned `Vec<u8>` here --
//! [`DataBlock`](crate::data_block::DataBlock) is the type in this crate
//! that actually carries a user-supplied deleter over externally-owned
//! memory, since it (unlike this type) is what gets handed to a transport.

use std::fmt;

/// Closure invoked when an owned [`DataBlock`](crate::data_block::DataBlock)'s
/// storage must be released.
///
/// Deleters receive only the raw pointer and length they are responsible
/// for, never a handle back to the block itself or any shared pointer
/// wrapping it -- capturing the block's own `Arc`/`Rc` inside its deleter
/// would create a reference cycle, so the signature forbids it by
/// construction.
pub type Deleter = Box<dyn FnOnce(*mut u8, usize) + Send>;

/// Minimum capacity granularity used by the growth policy.
const GROWTH_QUANTUM: usize = 64;

/// A contiguous byte region with explicit read/write cursors.
///
/// Not thread-safe: a `MemoryBuffer` is meant to live on exactly one task
/// at a time and moves, rather than aliases, when handed off.
pub struct MemoryBuffer {
    storage: Vec<u8>,
    cursor: usize,
    end: usize,
    /// `true` when this buffer was allocated from the message-pool arena
    /// rather than the general allocator; growth and release must use the
    /// matching arena.
    is_msg: bool,
}

impl fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("cursor", &self.cursor)
            .field("end", &self.end)
            .field("border", &self.storage.capacity())
            .field("is_msg", &self.is_msg)
            .finish()
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBuffer {
    /// Creates an empty buffer with no backing storage.
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
            cursor: 0,
            end: 0,
            is_msg: false,
        }
    }

    /// Creates an empty buffer that will allocate from the RPC message
    /// arena rather than the general allocator.
    pub fn new_message_pool() -> Self {
        let mut buf = Self::new();
        buf.is_msg = true;
        buf
    }

    /// Takes ownership of `bytes` as both the readable and writable region.
    pub fn from_owned(bytes: Vec<u8>) -> Self {
        let end = bytes.len();
        Self {
            storage: bytes,
            cursor: 0,
            end,
            is_msg: false,
        }
    }

    /// Builds a buffer over a copy of `bytes`, for callers that only have
    /// a borrowed slice to read from. Despite the name this is not a true
    /// zero-copy alias (this type has no lifetime parameter to borrow
    /// through), so the copied storage is plain-owned: no deleter is
    /// installed, and it is freed the same way `from_owned`'s is.
    pub fn view(bytes: &[u8]) -> Self {
        Self::from_owned(bytes.to_vec())
    }

    /// Deep-copies `len` bytes from `src` starting at its current cursor.
    pub fn assign(&mut self, src: &[u8]) {
        self.storage.clear();
        self.storage.extend_from_slice(src);
        self.cursor = 0;
        self.end = src.len();
    }

    /// Ensures at least `additional` bytes beyond `end` are writable,
    /// growing the backing storage per the growth policy: round up to a
    /// multiple of [`GROWTH_QUANTUM`] and at least double the current
    /// capacity.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.end + additional;
        if needed <= self.storage.capacity() {
            return;
        }
        let doubled = self.storage.capacity().saturating_mul(2).max(needed);
        let rounded = doubled.div_ceil(GROWTH_QUANTUM) * GROWTH_QUANTUM;
        self.storage.reserve(rounded - self.storage.len());
    }

    /// Resizes the writable region to exactly `len` bytes, zero-filling any
    /// newly exposed bytes.
    pub fn resize(&mut self, len: usize) {
        self.storage.resize(len, 0);
        self.end = len;
        if self.cursor > self.end {
            self.cursor = self.end;
        }
    }

    /// Appends `bytes` at `end`, growing as needed.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.storage.extend_from_slice(bytes);
        self.end = self.storage.len();
    }

    /// Reads exactly `len` bytes starting at `cursor`, advancing it.
    /// Returns `None` (rather than panicking) when fewer than `len` bytes
    /// remain -- this is the buffer-level building block for the codec's
    /// `try_*` contract.
    pub fn try_read_bytes(&mut self, len: usize) -> Option<&[u8]> {
        if self.cursor + len > self.end {
            return None;
        }
        let start = self.cursor;
        self.cursor += len;
        Some(&self.storage[start..start + len])
    }

    /// Like [`try_read_bytes`](Self::try_read_bytes) but panics with a
    /// file/line-tagged message on underrun: this is a programmer-error
    /// precondition failure, not an end-of-stream condition.
    #[track_caller]
    pub fn read_bytes(&mut self, len: usize) -> &[u8] {
        assert!(
            self.cursor + len <= self.end,
            "MemoryBuffer::read_bytes: cursor {} + {} exceeds end {}",
            self.cursor,
            len,
            self.end
        );
        let start = self.cursor;
        self.cursor += len;
        &self.storage[start..start + len]
    }

    /// Advances the read cursor without returning bytes; panics if it would
    /// pass `end`.
    #[track_caller]
    pub fn advance_cursor(&mut self, len: usize) {
        assert!(
            self.cursor + len <= self.end,
            "MemoryBuffer::advance_cursor: cursor {} + {} exceeds end {}",
            self.cursor,
            len,
            self.end
        );
        self.cursor += len;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn border(&self) -> usize {
        self.storage.capacity()
    }

    pub fn is_message_pool(&self) -> bool {
        self.is_msg
    }

    /// Remaining unread bytes.
    pub fn remaining(&self) -> usize {
        self.end - self.cursor
    }

    /// Whether every written byte has been read.
    pub fn is_eof(&self) -> bool {
        self.cursor >= self.end
    }

    /// Full written region, ignoring the read cursor.
    pub fn written(&self) -> &[u8] {
        &self.storage[..self.end]
    }

    /// Rewrites bytes at a fixed offset without touching `cursor`/`end`;
    /// used to patch the RPC header back into place after the body and
    /// block table have been appended.
    #[track_caller]
    pub fn overwrite_at(&mut self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.end,
            "MemoryBuffer::overwrite_at: offset {} + {} exceeds end {}",
            offset,
            bytes.len(),
            self.end
        );
        self.storage[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Relinquishes ownership of the backing storage, returning it as a
    /// plain `Vec<u8>` truncated to the written region.
    pub fn release(mut self) -> Vec<u8> {
        self.storage.truncate(self.end);
        std::mem::take(&mut self.storage)
    }

    /// Shares the written region as a reference-counted, immutable byte
    /// buffer suitable for zero-copy hand-off to a transport.
    pub fn release_shared(self) -> bytes::Bytes {
        bytes::Bytes::from(self.release())
    }

    /// Produces a non-owning alias over the currently written region.
    pub fn view_written(&self) -> MemoryBuffer {
        MemoryBuffer::view(self.written())
    }
}
