//! The RPC message envelope: a packed header, a serialized body, a
//! block-descriptor table, and inline small blocks laid out contiguously,
//! with byte-cursor views that separate copyable bytes from zero-copy
//! blocks for distinct network paths.
//!
//! Senders build an [`RpcRequest`], hand it to [`RpcMessage::from_request`]
//! to finalize it into wire bytes, then drive a [`cursor::CopyableCursor`]
//! or [`cursor::ZeroCopyCursor`] depending on the transport. Receivers go
//! the other way: [`RpcMessage::from_wire`] parses a buffer, and
//! [`RpcResponse::from_message`] turns it into a typed response.

mod cursor;
mod envelope;
mod error;
mod header;
mod request;
mod response;

pub use cursor::{Chunk, CopyableCursor, ZeroCopyCursor};
pub use envelope::{RpcMessage, ZERO_COPY_THRESHOLD};
pub use error::ErrorCode;
pub use header::{RpcHeader, RPC_HEADER_LEN};
pub use request::RpcRequest;
pub use response::RpcResponse;
