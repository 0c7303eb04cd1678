//! The RPC message arena: a process-wide pool of reusable byte buffers.
//!
//! Real deployments back this with pages registered for RDMA so a
//! zero-copy block can be handed straight to the network card; this crate
//! ships a plain pooled-`Vec<u8>` implementation behind the same trait so
//! tests and non-RDMA builds need nothing special. `MemoryBuffer::is_msg`
//! records which allocator produced a buffer so callers never mix arenas.

use std::sync::{Mutex, OnceLock};

/// A source of reusable byte storage for the message-pool arena.
///
/// Implementations must be safe to share across threads; the default
/// `PooledArena` guards its free list with a `Mutex`.
pub trait BufferArena: Send + Sync {
    /// Obtains a buffer with at least `capacity` bytes reserved.
    fn acquire(&self, capacity: usize) -> Vec<u8>;

    /// Returns a buffer to the pool for reuse. Implementations may simply
    /// drop it.
    fn release(&self, buffer: Vec<u8>);
}

/// Default arena: a bounded free list of `Vec<u8>` buffers, recycled by
/// capacity rather than content.
pub struct PooledArena {
    free_list: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
}

impl PooledArena {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free_list: Mutex::new(Vec::new()),
            max_pooled,
        }
    }
}

impl Default for PooledArena {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BufferArena for PooledArena {
    fn acquire(&self, capacity: usize) -> Vec<u8> {
        let mut free_list = self.free_list.lock().expect("arena mutex poisoned");
        if let Some(pos) = free_list.iter().position(|b| b.capacity() >= capacity) {
            let mut buf = free_list.swap_remove(pos);
            buf.clear();
            return buf;
        }
        Vec::with_capacity(capacity)
    }

    fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut free_list = self.free_list.lock().expect("arena mutex poisoned");
        if free_list.len() < self.max_pooled {
            free_list.push(buffer);
        }
    }
}

static GLOBAL_ARENA: OnceLock<Box<dyn BufferArena>> = OnceLock::new();

/// The process-wide message arena.
///
/// Call [`install_global`] once, before any buffer is allocated with
/// `is_msg = true`, to substitute a custom (e.g. RDMA-registered) arena.
/// If nothing is installed the first call to [`global`] lazily installs a
/// [`PooledArena`].
pub struct MessageArena;

impl MessageArena {
    /// Installs a custom global arena. Returns `Err(())` if an arena was
    /// already installed (including the lazy default).
    pub fn install_global(arena: Box<dyn BufferArena>) -> Result<(), ()> {
        GLOBAL_ARENA.set(arena).map_err(|_| ())
    }

    /// Returns the process-wide arena, installing the default pooled
    /// implementation on first use.
    pub fn global() -> &'static dyn BufferArena {
        GLOBAL_ARENA
            .get_or_init(|| Box::new(PooledArena::default()))
            .as_ref()
    }

    /// Builds a standalone arena, bypassing the global singleton; intended
    /// for tests that want isolation from other tests' global state.
    pub fn standalone(max_pooled: usize) -> PooledArena {
        PooledArena::new(max_pooled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_arena_reuses_released_buffers() {
        let arena = PooledArena::new(4);
        let buf = arena.acquire(128);
        assert!(buf.capacity() >= 128);
        arena.release(buf);
        let reused = arena.acquire(64);
        assert!(reused.capacity() >= 64);
    }
}
