//! Lazy archive: defers serialization of bulk payloads so a big `Vec<T>`
//! or pre-built [`DataBlock`] can be handed to a transport without a
//! memcpy through an intermediate archive.
//!
//! A writer accumulates type-erased cells; `apply` drains them into a
//! vector of data blocks (small fields in one trailing "meta" block, bulk
//! payloads as their own shared blocks). A reader built with `attach`
//! walks the same sequence back out. Same-process consumers that never
//! serialize at all can read straight off the writer via
//! [`LazyArchiveWriter::get`] instead, as a direct accessor rather than an
//! implicit reader state machine, since Rust has no unchecked aliasing
//! trick to make a reader transparently alias a writer's cells.

use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::io;

use crate::archive::{ArchiveDeserialize, ArchiveSerialize, BinaryMemoryArchive};
use crate::buffer::MemoryBuffer;
use crate::data_block::DataBlock;

/// Extended codec for values carried by a lazy archive. The blanket impl
/// below routes any ordinarily-archivable type through the meta archive;
/// [`DataBlock`], [`SharedVec`], and nested [`BinaryMemoryArchive`] get
/// dedicated impls that route through a shared block instead.
pub trait LazySerialize {
    fn lazy_serialize(&self, meta: &mut BinaryMemoryArchive, blocks: &mut Vec<DataBlock>)
        -> io::Result<()>;
}

pub trait LazyDeserialize: Sized {
    fn lazy_deserialize(meta: &mut BinaryMemoryArchive, shared: &mut SharedBlockReader)
        -> io::Result<Self>;
}

impl<T> LazySerialize for T
where
    T: ArchiveSerialize<BinaryMemoryArchive>,
{
    fn lazy_serialize(
        &self,
        meta: &mut BinaryMemoryArchive,
        _blocks: &mut Vec<DataBlock>,
    ) -> io::Result<()> {
        self.serialize(meta)
    }
}

impl<T> LazyDeserialize for T
where
    T: ArchiveDeserialize<BinaryMemoryArchive> + Default,
{
    fn lazy_deserialize(
        meta: &mut BinaryMemoryArchive,
        _shared: &mut SharedBlockReader,
    ) -> io::Result<Self> {
        let mut value = T::default();
        value.deserialize(meta)?;
        Ok(value)
    }
}

/// Marker for types whose in-memory representation is exactly their
/// serialized form, enabling the [`SharedVec`] memcpy fast path. Not
/// implemented for `bool`: a `Vec<bool>` packs to one bit per element in
/// the ordinary codec and has no useful raw-byte representation here.
pub trait PlainOldData: Copy + 'static {}

macro_rules! plain_old_data {
    ($($t:ty),+) => { $(impl PlainOldData for $t {})+ };
}

plain_old_data!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// Wraps a `Vec<T>` of plain-old-data so it takes the shared-block memcpy
/// path through a lazy archive instead of the element-at-a-time meta path
/// an ordinary `Vec<T>` would take.
pub struct SharedVec<T>(pub Vec<T>);

impl<T: PlainOldData> LazySerialize for SharedVec<T> {
    fn lazy_serialize(
        &self,
        meta: &mut BinaryMemoryArchive,
        blocks: &mut Vec<DataBlock>,
    ) -> io::Result<()> {
        (self.0.len() as u64).serialize(meta)?;
        let byte_len = std::mem::size_of_val(self.0.as_slice());
        let bytes = unsafe { std::slice::from_raw_parts(self.0.as_ptr() as *const u8, byte_len) };
        blocks.push(DataBlock::view(bytes));
        Ok(())
    }
}

impl<T: PlainOldData + Default> LazyDeserialize for SharedVec<T> {
    fn lazy_deserialize(
        meta: &mut BinaryMemoryArchive,
        shared: &mut SharedBlockReader,
    ) -> io::Result<Self> {
        let mut len = 0u64;
        len.deserialize(meta)?;
        let len = len as usize;
        let block = shared
            .take_next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "lazy archive: expected shared block"))?;
        let elem_size = std::mem::size_of::<T>();
        if block.len() != len * elem_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "lazy archive: shared block has {} bytes, expected {} for {len} elements",
                    block.len(),
                    len * elem_size
                ),
            ));
        }
        let mut out = Vec::with_capacity(len);
        unsafe {
            std::ptr::copy_nonoverlapping(block.as_slice().as_ptr() as *const T, out.as_mut_ptr(), len);
            out.set_len(len);
        }
        Ok(SharedVec(out))
    }
}

impl LazySerialize for DataBlock {
    fn lazy_serialize(
        &self,
        _meta: &mut BinaryMemoryArchive,
        blocks: &mut Vec<DataBlock>,
    ) -> io::Result<()> {
        blocks.push(DataBlock::view(self.as_slice()));
        Ok(())
    }
}

impl LazyDeserialize for DataBlock {
    fn lazy_deserialize(
        _meta: &mut BinaryMemoryArchive,
        shared: &mut SharedBlockReader,
    ) -> io::Result<Self> {
        shared
            .take_next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "lazy archive: expected shared block"))
    }
}

impl LazySerialize for BinaryMemoryArchive {
    fn lazy_serialize(
        &self,
        _meta: &mut BinaryMemoryArchive,
        blocks: &mut Vec<DataBlock>,
    ) -> io::Result<()> {
        blocks.push(DataBlock::view(self.0.written()));
        Ok(())
    }
}

impl LazyDeserialize for BinaryMemoryArchive {
    fn lazy_deserialize(
        _meta: &mut BinaryMemoryArchive,
        shared: &mut SharedBlockReader,
    ) -> io::Result<Self> {
        let block = shared
            .take_next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "lazy archive: expected shared block"))?;
        // A literal zero-copy hand-off would need the archive to keep
        // `block` alive through an Arc-backed buffer; `MemoryBuffer`'s
        // storage is a plain `Vec<u8>`, so this copies once rather than
        // aliasing the block's memory.
        Ok(BinaryMemoryArchive::from_buffer(MemoryBuffer::from_owned(
            block.as_slice().to_vec(),
        )))
    }
}

/// Remaining shared blocks a reader pulls from, in the order `apply`
/// pushed them.
pub struct SharedBlockReader {
    blocks: VecDeque<DataBlock>,
}

impl SharedBlockReader {
    fn new(blocks: Vec<DataBlock>) -> Self {
        Self {
            blocks: blocks.into(),
        }
    }

    pub fn take_next(&mut self) -> Option<DataBlock> {
        self.blocks.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.blocks.len()
    }
}

trait LazyCell: Send {
    fn apply(&self, meta: &mut BinaryMemoryArchive, blocks: &mut Vec<DataBlock>) -> io::Result<()>;
    fn as_any(&self) -> &dyn Any;
    fn cell_type_id(&self) -> TypeId;
}

struct TypedCell<T>(T);

impl<T: LazySerialize + Any + Send> LazyCell for TypedCell<T> {
    fn apply(&self, meta: &mut BinaryMemoryArchive, blocks: &mut Vec<DataBlock>) -> io::Result<()> {
        self.0.lazy_serialize(meta, blocks)
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn cell_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

/// Accumulates values of any [`LazySerialize`] type for later, one-shot
/// conversion into a vector of data blocks.
#[derive(Default)]
pub struct LazyArchiveWriter {
    cells: Vec<Box<dyn LazyCell>>,
}

impl LazyArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value, returning the index it can later be read back
    /// from via [`get`](Self::get).
    pub fn push<T: LazySerialize + Any + Send>(&mut self, value: T) -> usize {
        self.cells.push(Box::new(TypedCell(value)));
        self.cells.len() - 1
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Reads a previously pushed value back by index and expected type,
    /// without going through serialization. Returns `None` on an index or
    /// type mismatch -- callers that need a hard failure should compare
    /// against [`len`](Self::len) and the pushed type themselves.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        let cell = self.cells.get(index)?;
        if cell.cell_type_id() != TypeId::of::<T>() {
            return None;
        }
        cell.as_any().downcast_ref::<T>()
    }

    /// Converts every pushed cell into data blocks, in insertion order,
    /// with the accumulated meta archive appended as the final block. A
    /// writer with no cells produces no blocks at all, rather than a
    /// stray empty trailing block -- callers that never touch the lazy
    /// archive should see no trace of it on the wire.
    pub fn apply(&self) -> io::Result<Vec<DataBlock>> {
        if self.cells.is_empty() {
            return Ok(Vec::new());
        }
        let mut meta = BinaryMemoryArchive::new();
        let mut blocks = Vec::new();
        for cell in &self.cells {
            cell.apply(&mut meta, &mut blocks)?;
        }
        blocks.push(DataBlock::owned(meta.into_buffer().release()));
        Ok(blocks)
    }
}

/// Reconstructs values from a vector of data blocks produced by
/// [`LazyArchiveWriter::apply`].
pub struct LazyArchiveReader {
    meta: BinaryMemoryArchive,
    shared: SharedBlockReader,
}

impl LazyArchiveReader {
    pub fn attach(mut blocks: Vec<DataBlock>) -> Self {
        let meta_block = blocks.pop();
        let meta = match meta_block {
            Some(block) => {
                BinaryMemoryArchive::from_buffer(MemoryBuffer::from_owned(block.as_slice().to_vec()))
            }
            None => BinaryMemoryArchive::new(),
        };
        Self {
            meta,
            shared: SharedBlockReader::new(blocks),
        }
    }

    pub fn pull<T: LazyDeserialize>(&mut self) -> io::Result<T> {
        T::lazy_deserialize(&mut self.meta, &mut self.shared)
    }

    pub fn shared_blocks_remaining(&self) -> usize {
        self.shared.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_only_values_round_trip() {
        let mut writer = LazyArchiveWriter::new();
        writer.push(42i32);
        writer.push("hello".to_string());
        let blocks = writer.apply().unwrap();
        assert_eq!(blocks.len(), 1);

        let mut reader = LazyArchiveReader::attach(blocks);
        let a: i32 = reader.pull().unwrap();
        let b: String = reader.pull().unwrap();
        assert_eq!(a, 42);
        assert_eq!(b, "hello");
    }

    #[test]
    fn shared_vec_takes_the_memcpy_path() {
        let mut writer = LazyArchiveWriter::new();
        writer.push(7u8);
        writer.push(SharedVec(vec![1i32, 2, 3, 4, 5]));
        let blocks = writer.apply().unwrap();
        assert_eq!(blocks.len(), 2, "shared vector plus trailing meta block");

        let mut reader = LazyArchiveReader::attach(blocks);
        let tag: u8 = reader.pull().unwrap();
        let shared: SharedVec<i32> = reader.pull().unwrap();
        assert_eq!(tag, 7);
        assert_eq!(shared.0, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn data_block_is_passed_through_as_its_own_block() {
        let mut writer = LazyArchiveWriter::new();
        let big = vec![0xabu8; 8192];
        writer.push(DataBlock::owned(big.clone()));
        let blocks = writer.apply().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 8192);

        let mut reader = LazyArchiveReader::attach(blocks);
        let block: DataBlock = reader.pull().unwrap();
        assert_eq!(block.as_slice(), big.as_slice());
    }

    #[test]
    fn writer_can_be_read_directly_without_serializing() {
        let mut writer = LazyArchiveWriter::new();
        let idx = writer.push(99i32);
        assert_eq!(writer.get::<i32>(idx), Some(&99));
        assert_eq!(writer.get::<String>(idx), None);
    }
}
