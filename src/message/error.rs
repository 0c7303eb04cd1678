//! Error codes carried on RPC responses.

use num_derive::{FromPrimitive, ToPrimitive};

use crate::archive_enum;

/// Outcome of a remote call, carried in [`RpcHeader::error_code`](super::header::RpcHeader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(i16)]
pub enum ErrorCode {
    Ok = 0,
    NoSuchServer = 1,
    NoSuchRank = 2,
    NoSuchService = 3,
    LogicError = 4,
    IllegalMsg = 5,
    Timeout = 6,
    NotFound = 7,
    Connection = 8,
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::Ok
    }
}

archive_enum!(ErrorCode, i16);

impl ErrorCode {
    pub fn is_ok(self) -> bool {
        matches!(self, ErrorCode::Ok)
    }
}
