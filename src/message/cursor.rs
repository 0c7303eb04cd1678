//! Byte-cursor views over an assembled [`RpcMessage`](super::envelope::RpcMessage).
//!
//! Two flavors share one `Chunk` representation: a `CopyableCursor`
//! walks the header+body, the descriptor table, and every inline
//! (small) block; a `ZeroCopyCursor` walks only the big blocks. Neither
//! cursor owns the bytes it yields -- both borrow from the envelope,
//! matching the "not thread-safe, lives on one task" lifetime the rest
//! of the message pipeline uses.

/// One contiguous span a cursor can hand to a `writev`-style send call.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    bytes: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn head(&self) -> (&'a [u8], usize) {
        (self.bytes, self.bytes.len())
    }
}

/// Shared cursor machinery: a list of chunks plus a read index and a
/// within-chunk byte offset, so `advance` can consume partial chunks
/// (important for sockets that only accept part of a `writev` batch).
pub(super) struct ChunkCursor<'a> {
    chunks: Vec<Chunk<'a>>,
    index: usize,
    offset: usize,
}

impl<'a> ChunkCursor<'a> {
    pub(super) fn new(chunks: Vec<Chunk<'a>>) -> Self {
        Self {
            chunks,
            index: 0,
            offset: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.index < self.chunks.len()
    }

    /// Total remaining bytes across every chunk not yet fully consumed.
    pub fn size(&self) -> usize {
        if !self.has_next() {
            return 0;
        }
        let mut total = self.chunks[self.index].size() - self.offset;
        for chunk in &self.chunks[self.index + 1..] {
            total += chunk.size();
        }
        total
    }

    /// The current chunk's unconsumed tail, and how many bytes remain in
    /// it.
    pub fn head(&self) -> Option<(&'a [u8], usize)> {
        if !self.has_next() {
            return None;
        }
        let (bytes, len) = self.chunks[self.index].head();
        Some((&bytes[self.offset..], len - self.offset))
    }

    /// Advances by `n` bytes, never past the boundary of the current
    /// chunk; popping the chunk once it is fully consumed.
    pub fn advance(&mut self, n: usize) {
        if !self.has_next() {
            assert_eq!(n, 0, "ChunkCursor::advance: no chunks remain");
            return;
        }
        let remaining = self.chunks[self.index].size() - self.offset;
        assert!(
            n <= remaining,
            "ChunkCursor::advance: {n} exceeds {remaining} bytes left in the current chunk"
        );
        self.offset += n;
        if self.offset == self.chunks[self.index].size() {
            self.index += 1;
            self.offset = 0;
        }
    }

    /// Pops the current chunk without advancing within it (used when a
    /// caller consumes a whole chunk in one call and does not want to
    /// track the offset itself).
    pub fn next(&mut self) -> Option<Chunk<'a>> {
        if !self.has_next() {
            return None;
        }
        let chunk = self.chunks[self.index];
        self.index += 1;
        self.offset = 0;
        Some(chunk)
    }
}

/// Walks header+body, the descriptor table, and inline small blocks --
/// the region a plain `writev`-based transport sends.
pub struct CopyableCursor<'a>(pub(super) ChunkCursor<'a>);

impl<'a> CopyableCursor<'a> {
    pub fn has_next(&self) -> bool {
        self.0.has_next()
    }

    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn head(&self) -> Option<(&'a [u8], usize)> {
        self.0.head()
    }

    pub fn advance(&mut self, n: usize) {
        self.0.advance(n)
    }

    pub fn next(&mut self) -> Option<Chunk<'a>> {
        self.0.next()
    }
}

/// Walks only blocks at or above [`ZERO_COPY_THRESHOLD`](super::ZERO_COPY_THRESHOLD) --
/// the region an RDMA or scatter-send transport handles separately.
pub struct ZeroCopyCursor<'a>(pub(super) ChunkCursor<'a>);

impl<'a> ZeroCopyCursor<'a> {
    pub fn has_next(&self) -> bool {
        self.0.has_next()
    }

    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn head(&self) -> Option<(&'a [u8], usize)> {
        self.0.head()
    }

    pub fn advance(&mut self, n: usize) {
        self.0.advance(n)
    }

    pub fn next(&mut self) -> Option<Chunk<'a>> {
        self.0.next()
    }
}
