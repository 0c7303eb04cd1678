//! Archive tags: the four concrete carriers values are serialized into.
//!
//! An archive tag fixes two independent choices: the *storage* (an
//! in-memory [`MemoryBuffer`](crate::buffer::MemoryBuffer) or a file on
//! disk) and the *encoding* (packed binary, or a self-delimiting textual
//! form useful for debug dumps and config snapshots). The four
//! combinations are distinct zero-overhead types rather than one type with
//! a runtime flag, so a binary writer can never be handed to a caller
//! expecting text framing by accident.
//!
//! Every tag implements [`Archive`], which exposes only the handful of
//! storage-level primitives (`write_raw`, `read_raw`, `read_byte`) that
//! differ between memory and file backing. The encoding-level behavior --
//! whether a value round-trips as raw bytes or as a token in a
//! space-delimited stream -- lives once, in the blanket codec impls in
//! [`codec`], by branching on [`Archive::is_text`].

mod codec;

pub use codec::{ArchiveDeserialize, ArchiveSerialize};

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::buffer::MemoryBuffer;

/// Storage-level primitives shared by all four archive tags.
///
/// Implementations are free to fail (`io::Error`) -- a file archive can
/// hit a real I/O error, and a reader archive of any kind can hit
/// end-of-stream -- callers see both as the same `io::Result` the codec
/// layer already threads through every `serialize`/`deserialize` call.
pub trait Archive {
    /// `true` for [`TextMemoryArchive`]/[`TextFileArchive`], `false` for
    /// the binary tags. Primitive codec impls in [`codec`] branch on this
    /// rather than requiring a separate impl per tag.
    fn is_text(&self) -> bool;

    /// Appends `bytes` verbatim.
    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads exactly `len` bytes, failing with `UnexpectedEof` if fewer
    /// remain.
    fn read_raw(&mut self, len: usize) -> io::Result<Vec<u8>>;

    /// Reads a single byte, or `None` at end of stream. Used only by the
    /// text-token scanner in [`codec`]; binary primitive codecs never
    /// call it.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Text tags separate every written primitive with a single space;
    /// binary tags rely on fixed widths and length prefixes instead.
    fn write_space(&mut self) -> io::Result<()> {
        if self.is_text() {
            self.write_raw(b" ")
        } else {
            Ok(())
        }
    }

    /// Consumes exactly one delimiter space. A no-op on binary tags.
    fn skip_space(&mut self) -> io::Result<()> {
        if !self.is_text() {
            return Ok(());
        }
        match self.read_byte()? {
            Some(b' ') | None => Ok(()),
            Some(other) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("archive: expected delimiter space, found byte {other}"),
            )),
        }
    }

    /// Reads one whitespace-delimited token, skipping any leading spaces
    /// first. Used by the arithmetic codec on text tags.
    fn read_token(&mut self) -> io::Result<String> {
        let mut token = Vec::new();
        loop {
            match self.read_byte()? {
                Some(b' ') if token.is_empty() => continue,
                Some(b' ') | None => break,
                Some(b) => token.push(b),
            }
        }
        String::from_utf8(token)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

fn eof(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, format!("archive: {what}"))
}

fn read_only() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "archive: write attempted on an archive opened for reading",
    )
}

fn write_only() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "archive: read attempted on an archive opened for writing",
    )
}

/// Packed binary encoding backed by a [`MemoryBuffer`].
///
/// This is the hot path: RPC bodies and lazy-archive metadata blocks are
/// always serialized through this tag.
#[derive(Debug, Default)]
pub struct BinaryMemoryArchive(pub MemoryBuffer);

impl BinaryMemoryArchive {
    pub fn new() -> Self {
        Self(MemoryBuffer::new())
    }

    pub fn from_buffer(buffer: MemoryBuffer) -> Self {
        Self(buffer)
    }

    pub fn into_buffer(self) -> MemoryBuffer {
        self.0
    }
}

impl Archive for BinaryMemoryArchive {
    fn is_text(&self) -> bool {
        false
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_bytes(bytes);
        Ok(())
    }

    fn read_raw(&mut self, len: usize) -> io::Result<Vec<u8>> {
        self.0
            .try_read_bytes(len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| eof("unexpected end of buffer"))
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.0.try_read_bytes(1).map(|b| b[0]))
    }
}

/// Self-delimiting textual encoding backed by a [`MemoryBuffer`]; used for
/// human-readable dumps of config and coordination-path snapshots.
#[derive(Debug, Default)]
pub struct TextMemoryArchive(pub MemoryBuffer);

impl TextMemoryArchive {
    pub fn new() -> Self {
        Self(MemoryBuffer::new())
    }

    pub fn from_buffer(buffer: MemoryBuffer) -> Self {
        Self(buffer)
    }

    pub fn into_buffer(self) -> MemoryBuffer {
        self.0
    }
}

impl Archive for TextMemoryArchive {
    fn is_text(&self) -> bool {
        true
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_bytes(bytes);
        Ok(())
    }

    fn read_raw(&mut self, len: usize) -> io::Result<Vec<u8>> {
        self.0
            .try_read_bytes(len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| eof("unexpected end of buffer"))
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.0.try_read_bytes(1).map(|b| b[0]))
    }
}

/// A file opened in exactly one direction; an archive built on top of it
/// either writes or reads for its whole lifetime, matching how every
/// caller in this crate actually uses one (snapshot-out, load-in).
enum FileIo {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

impl FileIo {
    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            FileIo::Writer(w) => w.write_all(bytes),
            FileIo::Reader(_) => Err(read_only()),
        }
    }

    fn read_raw(&mut self, len: usize) -> io::Result<Vec<u8>> {
        match self {
            FileIo::Reader(r) => {
                let mut buf = vec![0u8; len];
                r.read_exact(&mut buf)?;
                Ok(buf)
            }
            FileIo::Writer(_) => Err(write_only()),
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match self {
            FileIo::Reader(r) => {
                let mut b = [0u8; 1];
                match r.read(&mut b)? {
                    0 => Ok(None),
                    _ => Ok(Some(b[0])),
                }
            }
            FileIo::Writer(_) => Err(write_only()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileIo::Writer(w) => w.flush(),
            FileIo::Reader(_) => Ok(()),
        }
    }
}

/// Packed binary encoding backed by a file, for persisting lazy archives
/// and coordination snapshots larger than is comfortable to hold resident.
pub struct BinaryFileArchive(FileIo);

impl BinaryFileArchive {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self(FileIo::Writer(BufWriter::new(File::create(path)?))))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self(FileIo::Reader(BufReader::new(File::open(path)?))))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Archive for BinaryFileArchive {
    fn is_text(&self) -> bool {
        false
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_raw(bytes)
    }

    fn read_raw(&mut self, len: usize) -> io::Result<Vec<u8>> {
        self.0.read_raw(len)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.0.read_byte()
    }
}

/// Self-delimiting textual encoding backed by a file.
pub struct TextFileArchive(FileIo);

impl TextFileArchive {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self(FileIo::Writer(BufWriter::new(File::create(path)?))))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self(FileIo::Reader(BufReader::new(File::open(path)?))))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Archive for TextFileArchive {
    fn is_text(&self) -> bool {
        true
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_raw(bytes)
    }

    fn read_raw(&mut self, len: usize) -> io::Result<Vec<u8>> {
        self.0.read_raw(len)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.0.read_byte()
    }
}

/// Serializes `value` into a fresh binary-memory archive and returns the
/// written bytes. The common case for RPC request/response bodies.
pub fn to_bytes<T>(value: &T) -> io::Result<Vec<u8>>
where
    T: ArchiveSerialize<BinaryMemoryArchive>,
{
    let mut archive = BinaryMemoryArchive::new();
    value.serialize(&mut archive)?;
    Ok(archive.into_buffer().release())
}

/// Deserializes `T` from a byte slice previously produced by [`to_bytes`].
pub fn from_bytes<T>(bytes: &[u8]) -> io::Result<T>
where
    T: ArchiveDeserialize<BinaryMemoryArchive> + Default,
{
    let mut archive = BinaryMemoryArchive::from_buffer(MemoryBuffer::view(bytes));
    let mut value = T::default();
    value.deserialize(&mut archive)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_round_trips_through_bytes() {
        let bytes = to_bytes(&42i32).unwrap();
        let back: i32 = from_bytes(&bytes).unwrap();
        assert_eq!(back, 42);
    }

    #[test]
    fn text_archive_is_self_delimiting() {
        let mut archive = TextMemoryArchive::new();
        42i32.serialize(&mut archive).unwrap();
        (-7i32).serialize(&mut archive).unwrap();
        let written = archive.0.written().to_vec();
        assert_eq!(std::str::from_utf8(&written).unwrap(), "42 -7 ");
        let mut reader = TextMemoryArchive::from_buffer(MemoryBuffer::view(&written));
        let mut a = 0i32;
        let mut b = 0i32;
        a.deserialize(&mut reader).unwrap();
        b.deserialize(&mut reader).unwrap();
        assert_eq!((a, b), (42, -7));
    }

    #[test]
    fn file_archive_is_write_only_or_read_only() {
        let dir = std::env::temp_dir().join(format!("rpcmesh-archive-test-{}", std::process::id()));
        let mut writer = BinaryFileArchive::create(&dir).unwrap();
        writer.write_raw(b"abcd").unwrap();
        assert!(writer.read_raw(1).is_err());
        writer.flush().unwrap();
        drop(writer);

        let mut reader = BinaryFileArchive::open(&dir).unwrap();
        assert_eq!(reader.read_raw(4).unwrap(), b"abcd");
        assert!(reader.write_raw(b"x").is_err());
        std::fs::remove_file(&dir).ok();
    }
}
