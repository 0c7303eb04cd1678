//! The fixed-layout header prefixing every RPC envelope.

use std::io;

use crate::archive::Archive;
use crate::archive::{ArchiveDeserialize, ArchiveSerialize};

use super::error::ErrorCode;

/// Packed 34-byte header: `body_size` (u32), `src_rank`/`dst_rank` (i16
/// each), `src_dealer`/`dst_dealer` (i32 each), `rpc_id` (i32),
/// `session_id` (i32), `extra_block_count`/`extra_block_length` (u32
/// each), `error_code` (i16). Little-endian throughout, no implicit
/// padding.
///
/// Fields are read into locals before being serialized rather than
/// serialized in place, since taking a reference to a field of a
/// `#[repr(packed)]` struct is unsound (the field may be misaligned) --
/// this is the one place in the codec that cannot use `archive_struct!`.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcHeader {
    pub body_size: u32,
    pub src_rank: i16,
    pub dst_rank: i16,
    pub src_dealer: i32,
    pub dst_dealer: i32,
    pub rpc_id: i32,
    pub session_id: i32,
    pub extra_block_count: u32,
    pub extra_block_length: u32,
    pub error_code: i16,
}

/// Size of the packed header on the wire, computed rather than hardcoded
/// so it can never drift from the struct definition above.
pub const RPC_HEADER_LEN: usize = std::mem::size_of::<RpcHeader>();

impl RpcHeader {
    pub fn error_code(&self) -> ErrorCode {
        let raw = self.error_code;
        num_traits::FromPrimitive::from_i16(raw).unwrap_or(ErrorCode::LogicError)
    }

    pub fn set_error_code(&mut self, code: ErrorCode) {
        self.error_code = code as i16;
    }
}

impl<A: Archive> ArchiveSerialize<A> for RpcHeader {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        let body_size = self.body_size;
        let src_rank = self.src_rank;
        let dst_rank = self.dst_rank;
        let src_dealer = self.src_dealer;
        let dst_dealer = self.dst_dealer;
        let rpc_id = self.rpc_id;
        let session_id = self.session_id;
        let extra_block_count = self.extra_block_count;
        let extra_block_length = self.extra_block_length;
        let error_code = self.error_code;

        body_size.serialize(dest)?;
        src_rank.serialize(dest)?;
        dst_rank.serialize(dest)?;
        src_dealer.serialize(dest)?;
        dst_dealer.serialize(dest)?;
        rpc_id.serialize(dest)?;
        session_id.serialize(dest)?;
        extra_block_count.serialize(dest)?;
        extra_block_length.serialize(dest)?;
        error_code.serialize(dest)
    }
}

impl<A: Archive> ArchiveDeserialize<A> for RpcHeader {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let mut body_size = 0u32;
        body_size.deserialize(src)?;
        let mut src_rank = 0i16;
        src_rank.deserialize(src)?;
        let mut dst_rank = 0i16;
        dst_rank.deserialize(src)?;
        let mut src_dealer = 0i32;
        src_dealer.deserialize(src)?;
        let mut dst_dealer = 0i32;
        dst_dealer.deserialize(src)?;
        let mut rpc_id = 0i32;
        rpc_id.deserialize(src)?;
        let mut session_id = 0i32;
        session_id.deserialize(src)?;
        let mut extra_block_count = 0u32;
        extra_block_count.deserialize(src)?;
        let mut extra_block_length = 0u32;
        extra_block_length.deserialize(src)?;
        let mut error_code = 0i16;
        error_code.deserialize(src)?;

        self.body_size = body_size;
        self.src_rank = src_rank;
        self.dst_rank = dst_rank;
        self.src_dealer = src_dealer;
        self.dst_dealer = dst_dealer;
        self.rpc_id = rpc_id;
        self.session_id = session_id;
        self.extra_block_count = extra_block_count;
        self.extra_block_length = extra_block_length;
        self.error_code = error_code;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{from_bytes, to_bytes};

    #[test]
    fn header_round_trips_through_binary_archive() {
        let mut header = RpcHeader {
            body_size: 128,
            src_rank: 1,
            dst_rank: 2,
            src_dealer: 3,
            dst_dealer: 4,
            rpc_id: 99,
            session_id: 7,
            extra_block_count: 2,
            extra_block_length: 1100,
            error_code: 0,
        };
        header.set_error_code(ErrorCode::NotFound);
        let bytes = to_bytes(&header).unwrap();
        assert_eq!(bytes.len(), RPC_HEADER_LEN);
        let back: RpcHeader = from_bytes(&bytes).unwrap();
        assert_eq!(back, header);
        assert_eq!(back.error_code(), ErrorCode::NotFound);
    }
}
