//! The sender-side wrapper: a header plus a binary archive for small
//! fields and a lazy archive for bulk payloads.

use std::io;

use crate::archive::{ArchiveSerialize, BinaryMemoryArchive};
use crate::lazy::LazyArchiveWriter;

use super::header::{RpcHeader, RPC_HEADER_LEN};

/// Built by a caller about to issue an RPC. The binary archive is
/// pre-filled with `RPC_HEADER_LEN` placeholder bytes so the header can
/// be overwritten in place once the body's final size is known, instead
/// of being prepended afterwards.
pub struct RpcRequest {
    header: RpcHeader,
    body: BinaryMemoryArchive,
    lazy: LazyArchiveWriter,
}

impl RpcRequest {
    pub fn new(src_rank: i16, dst_rank: i16, src_dealer: i32, dst_dealer: i32, rpc_id: i32, session_id: i32) -> Self {
        let mut body = BinaryMemoryArchive::new();
        body.0.write_bytes(&vec![0u8; RPC_HEADER_LEN]);
        Self {
            header: RpcHeader {
                body_size: 0,
                src_rank,
                dst_rank,
                src_dealer,
                dst_dealer,
                rpc_id,
                session_id,
                extra_block_count: 0,
                extra_block_length: 0,
                error_code: 0,
            },
            body,
            lazy: LazyArchiveWriter::new(),
        }
    }

    /// Writes one value into the request's binary archive, in field
    /// order.
    pub fn write<T: ArchiveSerialize<BinaryMemoryArchive>>(&mut self, value: &T) -> io::Result<()> {
        value.serialize(&mut self.body)
    }

    pub fn lazy_mut(&mut self) -> &mut LazyArchiveWriter {
        &mut self.lazy
    }

    pub fn header(&self) -> RpcHeader {
        self.header
    }

    /// Strips the header-sized placeholder prefix and returns the body
    /// bytes written so far, leaving the archive empty.
    pub fn take_body_bytes(&mut self) -> Vec<u8> {
        let mut replacement = BinaryMemoryArchive::new();
        std::mem::swap(&mut self.body, &mut replacement);
        let all = replacement.into_buffer().release();
        all[RPC_HEADER_LEN..].to_vec()
    }

    pub fn into_lazy_writer(self) -> Option<LazyArchiveWriter> {
        if self.lazy.is_empty() {
            None
        } else {
            Some(self.lazy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_accumulates_body_bytes_after_the_header_placeholder() {
        let mut request = RpcRequest::new(1, 2, 0, 0, 5, 9);
        request.write(&42i32).unwrap();
        let body = request.take_body_bytes();
        assert_eq!(body.len(), 4);
        assert_eq!(body, 42i32.to_le_bytes());
    }
}
