//! The receiver-side wrapper: built either by a server answering a
//! request or by a client parsing an incoming envelope.

use std::io;

use crate::archive::{ArchiveDeserialize, ArchiveSerialize, BinaryMemoryArchive};
use crate::buffer::MemoryBuffer;

use super::envelope::RpcMessage;
use super::error::ErrorCode;
use super::header::{RpcHeader, RPC_HEADER_LEN};

pub struct RpcResponse {
    header: RpcHeader,
    body: BinaryMemoryArchive,
}

impl RpcResponse {
    /// Builds a response addressed back at the sender of `request_header`:
    /// source and destination swap, `rpc_id` carries over, and
    /// `session_id` is cleared (a response is not itself part of a
    /// session handshake).
    pub fn from_request_header(request_header: RpcHeader) -> Self {
        let mut body = BinaryMemoryArchive::new();
        body.0.write_bytes(&vec![0u8; RPC_HEADER_LEN]);
        Self {
            header: RpcHeader {
                body_size: 0,
                src_rank: request_header.dst_rank,
                dst_rank: request_header.src_rank,
                src_dealer: request_header.dst_dealer,
                dst_dealer: request_header.src_dealer,
                rpc_id: request_header.rpc_id,
                session_id: 0,
                extra_block_count: 0,
                extra_block_length: 0,
                error_code: 0,
            },
            body,
        }
    }

    /// Parses a response out of an envelope already received off the
    /// wire.
    pub fn from_message(message: &RpcMessage) -> io::Result<Self> {
        let header = message.header();
        let body = BinaryMemoryArchive::from_buffer(MemoryBuffer::view(message.body()));
        Ok(Self { header, body })
    }

    pub fn header(&self) -> RpcHeader {
        self.header
    }

    pub fn set_error_code(&mut self, code: ErrorCode) {
        self.header.set_error_code(code);
    }

    pub fn error_code(&self) -> ErrorCode {
        self.header.error_code()
    }

    pub fn write<T: ArchiveSerialize<BinaryMemoryArchive>>(&mut self, value: &T) -> io::Result<()> {
        value.serialize(&mut self.body)
    }

    pub fn read<T: ArchiveDeserialize<BinaryMemoryArchive> + Default>(&mut self) -> io::Result<T> {
        let mut value = T::default();
        value.deserialize(&mut self.body)?;
        Ok(value)
    }

    pub fn take_body_bytes(&mut self) -> Vec<u8> {
        let mut replacement = BinaryMemoryArchive::new();
        std::mem::swap(&mut self.body, &mut replacement);
        let all = replacement.into_buffer().release();
        all[RPC_HEADER_LEN..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_swaps_src_and_dst_and_clears_session() {
        let request_header = RpcHeader {
            body_size: 0,
            src_rank: 1,
            dst_rank: 2,
            src_dealer: 10,
            dst_dealer: 20,
            rpc_id: 55,
            session_id: 9,
            extra_block_count: 0,
            extra_block_length: 0,
            error_code: 0,
        };
        let response = RpcResponse::from_request_header(request_header);
        let header = response.header();
        assert_eq!(header.src_rank, 2);
        assert_eq!(header.dst_rank, 1);
        assert_eq!(header.src_dealer, 20);
        assert_eq!(header.dst_dealer, 10);
        assert_eq!(header.rpc_id, 55);
        assert_eq!(header.session_id, 0);
    }

    #[test]
    fn write_then_read_round_trips_through_the_wire_bytes() {
        let mut response = RpcResponse::from_request_header(RpcHeader::default());
        response.write(&"ok".to_string()).unwrap();
        let body = response.take_body_bytes();

        let mut reread = RpcResponse {
            header: RpcHeader::default(),
            body: BinaryMemoryArchive::from_buffer(MemoryBuffer::view(&body)),
        };
        let value: String = reread.read().unwrap();
        assert_eq!(value, "ok");
    }
}
