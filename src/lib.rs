//! rpcmesh - a zero-copy serialization and RPC message pipeline, plus a
//! ZooKeeper-shaped master coordination client, for parameter-server
//! style distributed training systems.
//!
//! ## Main Components
//!
//! - [`archive`]: the archive abstraction (`Archive`) and its four
//!   concrete tags -- binary/text, memory/file -- plus the
//!   `ArchiveSerialize`/`ArchiveDeserialize` codec traits and macros for
//!   structs and enums.
//!
//! - [`lazy`]: the lazy archive, which defers serialization of bulk
//!   payloads into a vector of `DataBlock`s so large buffers can be
//!   handed off zero-copy instead of being walked field-by-field.
//!
//! - [`message`]: the RPC message envelope -- a packed header, a body
//!   archive, and a block-descriptor table splitting small inline blocks
//!   from zero-copy "big" blocks -- plus request/response wrappers and
//!   the shared error-code enum.
//!
//! - [`buffer`], [`arena`], [`data_block`]: the memory-management layer
//!   the archive and message pipeline are built on: a plain owned growable
//!   buffer, a pooled arena recycling buffers across messages, and the
//!   zero-copy block representation with its pluggable deleter.
//!
//! - [`watcher`], [`async_watcher`]: the two notification primitives the
//!   coordination client builds its blocking waits and callback
//!   subscriptions on top of.
//!
//! - [`coordination`]: the master coordination client -- a path-tree
//!   abstraction over a strongly-consistent, ZooKeeper-shaped metadata
//!   store -- and the coordination primitives (barrier, lock, monotonic
//!   id, node registry, task lifecycle, role-rank allocation, RPC
//!   service directory, context/model store) built entirely out of that
//!   path-tree API.

pub mod archive;
pub mod arena;
pub mod async_watcher;
pub mod buffer;
pub mod coordination;
pub mod data_block;
pub mod lazy;
pub mod message;
pub mod watcher;

pub use archive::{Archive, BinaryFileArchive, BinaryMemoryArchive, TextFileArchive, TextMemoryArchive};
pub use data_block::DataBlock;
pub use message::{ErrorCode, RpcMessage, RpcRequest, RpcResponse};
