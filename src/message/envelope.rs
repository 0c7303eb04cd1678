//! The assembled RPC envelope: header, body, block-descriptor table, and
//! inline small blocks laid out contiguously, plus the big blocks that
//! live outside that contiguous region for zero-copy transmission.

use std::io;

use tracing::{trace, warn};

use crate::archive::{to_bytes, ArchiveDeserialize, ArchiveSerialize, BinaryMemoryArchive};
use crate::data_block::DataBlock;
use crate::lazy::LazyArchiveWriter;

use super::cursor::{Chunk, ChunkCursor, CopyableCursor, ZeroCopyCursor};
use super::error::ErrorCode;
use super::header::{RpcHeader, RPC_HEADER_LEN};
use super::request::RpcRequest;

/// Blocks at or above this length travel outside the contiguous envelope
/// and are iterated by the zero-copy cursor; blocks below it are copied
/// into the envelope's inline tail. Part of the wire contract: both
/// peers must agree on it.
pub const ZERO_COPY_THRESHOLD: usize = 4096;

/// `{length}` -- the on-wire descriptor for one block. A real transport
/// would widen this with RDMA registration metadata; this crate has no
/// such transport, so the descriptor carries only what every transport
/// needs.
const BLOCK_DESCRIPTOR_LEN: usize = std::mem::size_of::<u32>();

/// A fully assembled RPC message: the contiguous `framing` region
/// (header, body, descriptor table) plus the blocks it describes, split
/// into `inline` (already materialized, copied out of the wire tail or
/// produced locally) and `big` (zero-copy, possibly still pending on the
/// receive side).
pub struct RpcMessage {
    header: RpcHeader,
    framing: Vec<u8>,
    inline: Vec<DataBlock>,
    big: Vec<DataBlock>,
    pending: usize,
    send_failure: Option<Box<dyn FnOnce(&RpcHeader) + Send>>,
    /// Kept alive only so `big` blocks built as non-owning views over a
    /// writer's cells (the `SharedVec`/`DataBlock` lazy fast paths) stay
    /// valid; never read directly.
    _lazy_writer: Option<LazyArchiveWriter>,
}

impl RpcMessage {
    /// Builds an envelope from a sender's request: finalizes the lazy
    /// archive into data blocks, computes the header's size fields, and
    /// assembles the contiguous framing region.
    pub fn from_request(mut request: RpcRequest) -> io::Result<Self> {
        let lazy_blocks = request.lazy_mut().apply()?;
        let body_bytes = request.take_body_bytes();
        let mut header = request.header();
        header.body_size = body_bytes.len() as u32;

        let mut inline = Vec::new();
        let mut big = Vec::new();
        let mut descriptor_lengths = Vec::with_capacity(lazy_blocks.len());
        for block in lazy_blocks {
            descriptor_lengths.push(block.len() as u32);
            if block.len() < ZERO_COPY_THRESHOLD {
                inline.push(block);
            } else {
                big.push(block);
            }
        }

        header.extra_block_count = descriptor_lengths.len() as u32;
        header.extra_block_length = (descriptor_lengths.len() * BLOCK_DESCRIPTOR_LEN) as u32
            + inline.iter().map(DataBlock::len).sum::<usize>() as u32;

        let mut framing = Vec::with_capacity(
            RPC_HEADER_LEN + body_bytes.len() + descriptor_lengths.len() * BLOCK_DESCRIPTOR_LEN,
        );
        framing.extend(std::iter::repeat(0u8).take(RPC_HEADER_LEN));
        framing.extend_from_slice(&body_bytes);
        for length in &descriptor_lengths {
            framing.extend_from_slice(&length.to_le_bytes());
        }
        framing[..RPC_HEADER_LEN].copy_from_slice(&to_bytes(&header)?);

        trace!(
            rpc_id = header.rpc_id,
            body_size = header.body_size,
            blocks = header.extra_block_count,
            "assembled rpc envelope from request"
        );

        Ok(Self {
            header,
            framing,
            inline,
            big,
            pending: 0,
            send_failure: None,
            _lazy_writer: request.into_lazy_writer(),
        })
    }

    /// Reconstructs an envelope from wire bytes: header, body, and the
    /// descriptor table are already present; inline blocks are copied out
    /// of the tail, and big blocks are left pending for
    /// [`fill_next_block`](Self::fill_next_block).
    pub fn from_wire(bytes: Vec<u8>) -> io::Result<Self> {
        if bytes.len() < RPC_HEADER_LEN {
            return Err(illegal_msg("buffer shorter than the header"));
        }
        let mut header = RpcHeader::default();
        let mut header_archive =
            crate::archive::BinaryMemoryArchive::from_buffer(crate::buffer::MemoryBuffer::view(
                &bytes[..RPC_HEADER_LEN],
            ));
        header.deserialize(&mut header_archive)?;

        let body_start = RPC_HEADER_LEN;
        let body_end = body_start + header.body_size as usize;
        let table_start = body_end;
        let table_len = header.extra_block_count as usize * BLOCK_DESCRIPTOR_LEN;
        let table_end = table_start + table_len;
        let tail_start = table_end;

        if bytes.len() < table_end {
            return Err(illegal_msg("buffer too short for the descriptor table"));
        }

        let mut descriptor_lengths = Vec::with_capacity(header.extra_block_count as usize);
        for i in 0..header.extra_block_count as usize {
            let offset = table_start + i * BLOCK_DESCRIPTOR_LEN;
            let length = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
            descriptor_lengths.push(length);
        }

        let inline_total: usize = descriptor_lengths
            .iter()
            .filter(|&&len| (len as usize) < ZERO_COPY_THRESHOLD)
            .map(|&len| len as usize)
            .sum();
        let expected_extra_length = table_len as u32 + inline_total as u32;
        if header.extra_block_length != expected_extra_length {
            warn!(
                declared = header.extra_block_length,
                computed = expected_extra_length,
                "rpc envelope: extra_block_length mismatch"
            );
            return Err(illegal_msg("extra_block_length does not match the descriptor table"));
        }

        let mut cursor = tail_start;
        let mut inline = Vec::new();
        let mut big = Vec::new();
        let mut pending = 0usize;
        for length in descriptor_lengths {
            let length = length as usize;
            if length < ZERO_COPY_THRESHOLD {
                if bytes.len() < cursor + length {
                    return Err(illegal_msg("inline tail shorter than its descriptor table"));
                }
                inline.push(DataBlock::owned(bytes[cursor..cursor + length].to_vec()));
                cursor += length;
            } else {
                big.push(DataBlock::zeroed(length));
                pending += 1;
            }
        }

        let framing = bytes[..table_end].to_vec();

        Ok(Self {
            header,
            framing,
            inline,
            big,
            pending,
            send_failure: None,
            _lazy_writer: None,
        })
    }

    pub fn header(&self) -> RpcHeader {
        self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.framing[RPC_HEADER_LEN..RPC_HEADER_LEN + self.header.body_size as usize]
    }

    pub fn inline_blocks(&self) -> &[DataBlock] {
        &self.inline
    }

    pub fn big_blocks(&self) -> &[DataBlock] {
        &self.big
    }

    /// Registers the hook invoked when transport cannot deliver this
    /// message; typically a no-op for a response, and dispatched to an
    /// error handler for a request.
    pub fn on_send_failure<F: FnOnce(&RpcHeader) + Send + 'static>(&mut self, hook: F) {
        self.send_failure = Some(Box::new(hook));
    }

    pub fn notify_send_failure(mut self) {
        if let Some(hook) = self.send_failure.take() {
            hook(&self.header);
        }
    }

    /// Fills the next pending big block, in descriptor order. Fails if
    /// every big block is already filled, or if `bytes` is the wrong
    /// length for that block.
    pub fn fill_next_block(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.pending == 0 {
            return Err(illegal_msg("no pending big block to fill"));
        }
        let filled_so_far = self.big.len() - self.pending;
        self.big[filled_so_far].fill(bytes);
        self.pending -= 1;
        Ok(())
    }

    pub fn is_fully_received(&self) -> bool {
        self.pending == 0
    }

    /// Walks header+body, the descriptor table, and every inline block.
    pub fn copyable_cursor(&self) -> CopyableCursor<'_> {
        let mut chunks = vec![Chunk::new(&self.framing)];
        chunks.extend(self.inline.iter().map(|b| Chunk::new(b.as_slice())));
        CopyableCursor(ChunkCursor::new(chunks))
    }

    /// Walks only blocks at or above [`ZERO_COPY_THRESHOLD`].
    pub fn zero_copy_cursor(&self) -> ZeroCopyCursor<'_> {
        let chunks = self.big.iter().map(|b| Chunk::new(b.as_slice())).collect();
        ZeroCopyCursor(ChunkCursor::new(chunks))
    }

    /// Concatenates the copyable region (header, body, descriptor table,
    /// inline blocks) into one buffer -- the whole-buffer equivalent of
    /// draining [`copyable_cursor`](Self::copyable_cursor), for transports
    /// that would rather send one contiguous write than a `writev` batch.
    /// Big blocks still travel separately, via [`zero_copy_cursor`](Self::zero_copy_cursor).
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = self.framing.clone();
        for block in &self.inline {
            out.extend_from_slice(block.as_slice());
        }
        out
    }
}

fn illegal_msg(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("rpc envelope: {what} ({:?})", ErrorCode::IllegalMsg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_block::DataBlock;
    use crate::message::RpcRequest;

    #[test]
    fn inline_vs_zero_copy_split() {
        let mut request = RpcRequest::new(0, 1, 0, 0, 7, 1);
        request.write(&42i32).unwrap();
        request.lazy_mut().push(DataBlock::owned(vec![1u8; 1024]));
        request.lazy_mut().push(DataBlock::owned(vec![2u8; 8192]));

        let message = RpcMessage::from_request(request).unwrap();
        // Three blocks come out of `apply`: the 1024-byte block, the
        // 8192-byte block, and an empty trailing meta block (no value
        // pushed here ever routes through the meta archive) -- the empty
        // meta block inlines alongside the 1024-byte one.
        assert_eq!(message.inline_blocks().len(), 2);
        assert_eq!(message.big_blocks().len(), 1);
        assert_eq!(message.big_blocks()[0].len(), 8192);
        assert!(message.inline_blocks().iter().any(|b| b.len() == 1024));

        let mut zc = message.zero_copy_cursor();
        assert_eq!(zc.size(), 8192);
        let chunk = zc.next().unwrap();
        assert_eq!(chunk.size(), 8192);
        assert!(!zc.has_next());

        let mut cc = message.copyable_cursor();
        let head = cc.next().unwrap();
        assert_eq!(
            head.size(),
            RPC_HEADER_LEN + message.header.body_size as usize + 3 * 4
        );
        let total_inline: usize = std::iter::from_fn(|| cc.next()).map(|c| c.size()).sum();
        assert_eq!(total_inline, 1024);
    }

    #[test]
    fn header_offsets_satisfy_invariants() {
        let mut request = RpcRequest::new(0, 1, 0, 0, 7, 1);
        request.write(&"hello".to_string()).unwrap();
        let message = RpcMessage::from_request(request).unwrap();
        let header = message.header();
        assert_eq!(
            header.body_size as usize + RPC_HEADER_LEN,
            RPC_HEADER_LEN + message.body().len()
        );
        assert_eq!(header.extra_block_length, 0);
        assert_eq!(header.extra_block_count, 0);
    }

    #[test]
    fn wire_round_trip_with_a_pending_big_block() {
        let mut request = RpcRequest::new(0, 1, 0, 0, 7, 1);
        request.write(&9i32).unwrap();
        request.lazy_mut().push(DataBlock::owned(vec![5u8; 5000]));
        let sent = RpcMessage::from_request(request).unwrap();
        let on_wire = sent.to_wire_bytes();

        let mut received = RpcMessage::from_wire(on_wire).unwrap();
        assert!(!received.is_fully_received());
        received.fill_next_block(&[5u8; 5000]).unwrap();
        assert!(received.is_fully_received());
        assert_eq!(received.big_blocks()[0].as_slice(), &[5u8; 5000][..]);
    }
}
