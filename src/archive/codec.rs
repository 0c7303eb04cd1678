//! Value codec: how Rust values map onto the [`Archive`](super::Archive)
//! primitives.
//!
//! Every impl here is generic over `A: Archive` rather than written once
//! per tag, so adding a fifth archive tag later needs no new codec code --
//! only a new [`Archive`](super::Archive) impl. Binary vs. text framing is
//! chosen at the leaves (primitive integers, floats, strings) by branching
//! on [`Archive::is_text`]; container and struct impls above that layer
//! never need to know which tag they are running against.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::io;

use super::Archive;

/// Writes `self` into an archive. A split-trait codec parameterized over
/// the archive tag rather than a bare `Write`, so the same impl covers
/// binary and text framing.
pub trait ArchiveSerialize<A: Archive> {
    fn serialize(&self, dest: &mut A) -> io::Result<()>;

    /// `true` for types whose in-memory representation is exactly their
    /// wire representation on a binary tag (the arithmetic primitives),
    /// letting `Vec<T>` skip the element loop for a single `copy_from_slice`.
    /// Never override this by hand outside `archive_int!`.
    const TRIVIAL: bool = false;
}

/// Reads a value from an archive into `self`, in place, so callers
/// pre-construct a `Default` value (or reuse one) rather than the
/// archive manufacturing one from nothing.
pub trait ArchiveDeserialize<A: Archive> {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()>;
}

/// The serialized size of a value, in bytes, for a given tag -- used to
/// size-check lazy-archive data blocks before the memcpy fast path
/// commits to a buffer of that length.
pub trait SerializedSize<A: Archive> {
    fn serialized_size(&self) -> usize;
}

macro_rules! archive_int {
    ($t:ty) => {
        impl<A: Archive> ArchiveSerialize<A> for $t {
            fn serialize(&self, dest: &mut A) -> io::Result<()> {
                if dest.is_text() {
                    dest.write_raw(self.to_string().as_bytes())?;
                    dest.write_space()
                } else {
                    dest.write_raw(&self.to_le_bytes())
                }
            }

            const TRIVIAL: bool = true;
        }

        impl<A: Archive> ArchiveDeserialize<A> for $t {
            fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
                if src.is_text() {
                    let token = src.read_token()?;
                    *self = token.parse().map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("archive: `{token}` is not a valid {}", stringify!($t)),
                        )
                    })?;
                    Ok(())
                } else {
                    let bytes = src.read_raw(std::mem::size_of::<$t>())?;
                    *self = <$t>::from_le_bytes(bytes.as_slice().try_into().expect(
                        "read_raw(size_of::<T>()) always returns exactly that many bytes",
                    ));
                    Ok(())
                }
            }
        }

        impl<A: Archive> SerializedSize<A> for $t {
            fn serialized_size(&self) -> usize {
                std::mem::size_of::<$t>()
            }
        }
    };
}

archive_int!(i8);
archive_int!(u8);
archive_int!(i16);
archive_int!(u16);
archive_int!(i32);
archive_int!(u32);
archive_int!(i64);
archive_int!(u64);
archive_int!(f32);
archive_int!(f64);

impl<A: Archive> ArchiveSerialize<A> for bool {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        if dest.is_text() {
            dest.write_raw(if *self { b"1" } else { b"0" })?;
            dest.write_space()
        } else {
            dest.write_raw(&[*self as u8])
        }
    }
}

impl<A: Archive> ArchiveDeserialize<A> for bool {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        if src.is_text() {
            let token = src.read_token()?;
            *self = match token.as_str() {
                "0" => false,
                "1" => true,
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("archive: `{other}` is not a valid bool"),
                    ))
                }
            };
            Ok(())
        } else {
            let bytes = src.read_raw(1)?;
            *self = bytes[0] != 0;
            Ok(())
        }
    }
}

/// Strings are length-prefixed in every tag, then followed by raw bytes
/// (never escaped: embedded spaces and newlines survive a text-tag round
/// trip because the reader knows exactly how many bytes to take) and a
/// trailing delimiter.
impl<A: Archive> ArchiveSerialize<A> for String {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        (self.len() as u64).serialize(dest)?;
        dest.write_raw(self.as_bytes())?;
        dest.write_space()
    }
}

impl<A: Archive> ArchiveDeserialize<A> for String {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let mut len = 0u64;
        len.deserialize(src)?;
        let bytes = src.read_raw(len as usize)?;
        *self = String::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        src.skip_space()
    }
}

impl<A: Archive> SerializedSize<A> for String {
    fn serialized_size(&self) -> usize {
        std::mem::size_of::<u64>() + self.len()
    }
}

impl<A: Archive, T: SerializedSize<A>> SerializedSize<A> for Vec<T> {
    fn serialized_size(&self) -> usize {
        std::mem::size_of::<u64>() + self.iter().map(|v| v.serialized_size()).sum::<usize>()
    }
}

impl<const N: usize, A: Archive> ArchiveSerialize<A> for [u8; N] {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        dest.write_raw(self)
    }
}

impl<const N: usize, A: Archive> ArchiveDeserialize<A> for [u8; N] {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let bytes = src.read_raw(N)?;
        self.copy_from_slice(&bytes);
        Ok(())
    }
}

impl<A: Archive, T: ArchiveSerialize<A>> ArchiveSerialize<A> for Option<T> {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        match self {
            None => false.serialize(dest),
            Some(v) => {
                true.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl<A: Archive, T: ArchiveDeserialize<A> + Default> ArchiveDeserialize<A> for Option<T> {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let mut present = false;
        present.deserialize(src)?;
        *self = if present {
            let mut v = T::default();
            v.deserialize(src)?;
            Some(v)
        } else {
            None
        };
        Ok(())
    }
}

/// Length-prefixed. On a binary tag, a `Vec<T>` of a `TRIVIAL` type (the
/// arithmetic primitives) is written with a single `copy_from_slice`
/// instead of walking each element through `to_le_bytes`, trading
/// cross-endian portability for throughput -- the same tradeoff the
/// lazy archive's `SharedVec` makes for its shared blocks. `Vec<bool>` is
/// packed 8-to-a-byte rather than one byte per element. Text tags and
/// every other `T` fall back to the element-at-a-time loop.
impl<A: Archive, T: ArchiveSerialize<A> + 'static> ArchiveSerialize<A> for Vec<T> {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        if !dest.is_text() {
            if TypeId::of::<T>() == TypeId::of::<bool>() {
                let bools = unsafe { &*(self as *const Vec<T> as *const Vec<bool>) };
                return write_packed_bools(bools, dest);
            }
            if T::TRIVIAL {
                return write_trivial_slice(self, dest);
            }
        }
        (self.len() as u64).serialize(dest)?;
        for item in self {
            item.serialize(dest)?;
        }
        Ok(())
    }
}

impl<A: Archive, T: ArchiveDeserialize<A> + Default + 'static> ArchiveDeserialize<A> for Vec<T> {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        if !src.is_text() {
            if TypeId::of::<T>() == TypeId::of::<bool>() {
                let bools = unsafe { &mut *(self as *mut Vec<T> as *mut Vec<bool>) };
                return read_packed_bools(src, bools);
            }
            if T::TRIVIAL {
                return read_trivial_slice(src, self);
            }
        }
        let mut len = 0u64;
        len.deserialize(src)?;
        self.clear();
        self.reserve(len as usize);
        for _ in 0..len {
            let mut item = T::default();
            item.deserialize(src)?;
            self.push(item);
        }
        Ok(())
    }
}

fn write_trivial_slice<A: Archive, T>(values: &[T], dest: &mut A) -> io::Result<()> {
    (values.len() as u64).serialize(dest)?;
    let byte_len = std::mem::size_of_val(values);
    let bytes = unsafe { std::slice::from_raw_parts(values.as_ptr() as *const u8, byte_len) };
    dest.write_raw(bytes)
}

fn read_trivial_slice<A: Archive, T: Default + Clone>(src: &mut A, out: &mut Vec<T>) -> io::Result<()> {
    let mut len = 0u64;
    len.deserialize(src)?;
    let len = len as usize;
    let byte_len = len * std::mem::size_of::<T>();
    let bytes = src.read_raw(byte_len)?;
    out.clear();
    out.resize(len, T::default());
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out.as_mut_ptr() as *mut u8, byte_len);
    }
    Ok(())
}

fn write_packed_bools<A: Archive>(values: &[bool], dest: &mut A) -> io::Result<()> {
    (values.len() as u64).serialize(dest)?;
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, &value) in values.iter().enumerate() {
        if value {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    dest.write_raw(&packed)
}

fn read_packed_bools<A: Archive>(src: &mut A, out: &mut Vec<bool>) -> io::Result<()> {
    let mut len = 0u64;
    len.deserialize(src)?;
    let len = len as usize;
    let packed = src.read_raw(len.div_ceil(8))?;
    out.clear();
    out.reserve(len);
    for i in 0..len {
        out.push(packed[i / 8] & (1 << (i % 8)) != 0);
    }
    Ok(())
}

/// Length-prefixed, element-at-a-time -- `VecDeque` has no memcpy fast
/// path since its backing storage need not be contiguous.
impl<A: Archive, T: ArchiveSerialize<A>> ArchiveSerialize<A> for VecDeque<T> {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        (self.len() as u64).serialize(dest)?;
        for item in self {
            item.serialize(dest)?;
        }
        Ok(())
    }
}

impl<A: Archive, T: ArchiveDeserialize<A> + Default> ArchiveDeserialize<A> for VecDeque<T> {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let mut len = 0u64;
        len.deserialize(src)?;
        self.clear();
        self.reserve(len as usize);
        for _ in 0..len {
            let mut item = T::default();
            item.deserialize(src)?;
            self.push_back(item);
        }
        Ok(())
    }
}

macro_rules! archive_tuple {
    ($($idx:tt: $T:ident),+) => {
        impl<A: Archive, $($T: ArchiveSerialize<A>),+> ArchiveSerialize<A> for ($($T,)+) {
            fn serialize(&self, dest: &mut A) -> io::Result<()> {
                $(self.$idx.serialize(dest)?;)+
                Ok(())
            }
        }

        impl<A: Archive, $($T: ArchiveDeserialize<A> + Default),+> ArchiveDeserialize<A> for ($($T,)+) {
            fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
                $(self.$idx.deserialize(src)?;)+
                Ok(())
            }
        }
    };
}

archive_tuple!(0: T0, 1: T1);
archive_tuple!(0: T0, 1: T1, 2: T2);
archive_tuple!(0: T0, 1: T1, 2: T2, 3: T3);

impl<A: Archive, K: ArchiveSerialize<A> + Ord, V: ArchiveSerialize<A>> ArchiveSerialize<A>
    for BTreeMap<K, V>
{
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        (self.len() as u64).serialize(dest)?;
        for (k, v) in self {
            k.serialize(dest)?;
            v.serialize(dest)?;
        }
        Ok(())
    }
}

impl<A: Archive, K, V> ArchiveDeserialize<A> for BTreeMap<K, V>
where
    K: ArchiveDeserialize<A> + Default + Ord,
    V: ArchiveDeserialize<A> + Default,
{
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let mut len = 0u64;
        len.deserialize(src)?;
        self.clear();
        for _ in 0..len {
            let mut k = K::default();
            k.deserialize(src)?;
            let mut v = V::default();
            v.deserialize(src)?;
            self.insert(k, v);
        }
        Ok(())
    }
}

impl<A: Archive, T: ArchiveSerialize<A> + Ord> ArchiveSerialize<A> for BTreeSet<T> {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        (self.len() as u64).serialize(dest)?;
        for item in self {
            item.serialize(dest)?;
        }
        Ok(())
    }
}

impl<A: Archive, T: ArchiveDeserialize<A> + Default + Ord> ArchiveDeserialize<A> for BTreeSet<T> {
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let mut len = 0u64;
        len.deserialize(src)?;
        self.clear();
        for _ in 0..len {
            let mut item = T::default();
            item.deserialize(src)?;
            self.insert(item);
        }
        Ok(())
    }
}

impl<A: Archive, K: ArchiveSerialize<A> + Eq + Hash, V: ArchiveSerialize<A>> ArchiveSerialize<A>
    for HashMap<K, V>
{
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        (self.len() as u64).serialize(dest)?;
        for (k, v) in self {
            k.serialize(dest)?;
            v.serialize(dest)?;
        }
        Ok(())
    }
}

impl<A: Archive, K, V> ArchiveDeserialize<A> for HashMap<K, V>
where
    K: ArchiveDeserialize<A> + Default + Eq + Hash,
    V: ArchiveDeserialize<A> + Default,
{
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let mut len = 0u64;
        len.deserialize(src)?;
        self.clear();
        self.reserve(len as usize);
        for _ in 0..len {
            let mut k = K::default();
            k.deserialize(src)?;
            let mut v = V::default();
            v.deserialize(src)?;
            self.insert(k, v);
        }
        Ok(())
    }
}

impl<A: Archive, T: ArchiveSerialize<A> + Eq + Hash> ArchiveSerialize<A> for HashSet<T> {
    fn serialize(&self, dest: &mut A) -> io::Result<()> {
        (self.len() as u64).serialize(dest)?;
        for item in self {
            item.serialize(dest)?;
        }
        Ok(())
    }
}

impl<A: Archive, T: ArchiveDeserialize<A> + Default + Eq + Hash> ArchiveDeserialize<A>
    for HashSet<T>
{
    fn deserialize(&mut self, src: &mut A) -> io::Result<()> {
        let mut len = 0u64;
        len.deserialize(src)?;
        self.clear();
        self.reserve(len as usize);
        for _ in 0..len {
            let mut item = T::default();
            item.deserialize(src)?;
            self.insert(item);
        }
        Ok(())
    }
}

/// Implements [`ArchiveSerialize`]/[`ArchiveDeserialize`] for a struct by
/// serializing its named fields in order, generic over every archive tag
/// at once.
///
/// ```ignore
/// archive_struct!(RpcHeader, body_size, src_rank, dst_rank, rpc_id);
/// ```
#[macro_export]
macro_rules! archive_struct {
    ($t:ident, $($field:ident),+ $(,)?) => {
        impl<A: $crate::archive::Archive> $crate::archive::ArchiveSerialize<A> for $t {
            fn serialize(&self, dest: &mut A) -> ::std::io::Result<()> {
                $($crate::archive::ArchiveSerialize::serialize(&self.$field, dest)?;)+
                Ok(())
            }
        }

        impl<A: $crate::archive::Archive> $crate::archive::ArchiveDeserialize<A> for $t {
            fn deserialize(&mut self, src: &mut A) -> ::std::io::Result<()> {
                $($crate::archive::ArchiveDeserialize::deserialize(&mut self.$field, src)?;)+
                Ok(())
            }
        }
    };
}

/// Implements the codec for a fieldless enum by round-tripping it through
/// an integer representation, generic over the archive tag.
///
/// ```ignore
/// archive_enum!(MasterStatus, i32);
/// ```
#[macro_export]
macro_rules! archive_enum {
    ($t:ident, $repr:ty) => {
        impl<A: $crate::archive::Archive> $crate::archive::ArchiveSerialize<A> for $t {
            fn serialize(&self, dest: &mut A) -> ::std::io::Result<()> {
                $crate::archive::ArchiveSerialize::serialize(&(*self as $repr), dest)
            }
        }

        impl<A: $crate::archive::Archive> $crate::archive::ArchiveDeserialize<A> for $t {
            fn deserialize(&mut self, src: &mut A) -> ::std::io::Result<()> {
                let mut raw: $repr = Default::default();
                $crate::archive::ArchiveDeserialize::deserialize(&mut raw, src)?;
                *self = num_traits::FromPrimitive::from_i64(raw as i64).ok_or_else(|| {
                    ::std::io::Error::new(
                        ::std::io::ErrorKind::InvalidData,
                        concat!("archive: invalid discriminant for ", stringify!($t)),
                    )
                })?;
                Ok(())
            }
        }
    };
}
