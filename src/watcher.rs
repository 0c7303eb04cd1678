//! A keyed multiset of callbacks with stable handles, serialized by a
//! single mutex. Used by the master client to dispatch path-tree events
//! to whoever registered interest in a path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub type WatcherCallback = Box<dyn Fn() + Send + Sync>;

/// Identifies one registered callback; stable until [`WatcherTable::erase`]
/// removes it, regardless of how many other callbacks are inserted or
/// erased for the same key in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherHandle(u64);

struct Record {
    handle: WatcherHandle,
    callback: WatcherCallback,
}

/// `insert`/`erase`/`invoke` are all safe to call from any thread. A
/// callback invoked by `invoke(key)` must not call back into the same
/// table -- on a single thread this would deadlock against the internal
/// `Mutex` rather than corrupt state, which is the contract's actual
/// enforcement mechanism in this implementation.
#[derive(Default)]
pub struct WatcherTable {
    records: Mutex<HashMap<String, Vec<Record>>>,
    next_handle: AtomicU64,
}

impl WatcherTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F: Fn() + Send + Sync + 'static>(&self, key: &str, callback: F) -> WatcherHandle {
        let handle = WatcherHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut records = self.records.lock().expect("watcher table mutex poisoned");
        records.entry(key.to_string()).or_default().push(Record {
            handle,
            callback: Box::new(callback),
        });
        handle
    }

    pub fn erase(&self, key: &str, handle: WatcherHandle) {
        let mut records = self.records.lock().expect("watcher table mutex poisoned");
        if let Some(list) = records.get_mut(key) {
            list.retain(|r| r.handle != handle);
            if list.is_empty() {
                records.remove(key);
            }
        }
    }

    /// Calls every callback registered for `key`, in insertion order.
    pub fn invoke(&self, key: &str) {
        let records = self.records.lock().expect("watcher table mutex poisoned");
        if let Some(list) = records.get(key) {
            for record in list {
                (record.callback)();
            }
        }
    }

    pub fn len_for(&self, key: &str) -> usize {
        let records = self.records.lock().expect("watcher table mutex poisoned");
        records.get(key).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn erased_callback_is_not_invoked() {
        let table = WatcherTable::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let handle = table.insert("/a", move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        table.erase("/a", handle);
        table.invoke("/a");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remaining_callbacks_still_fire_after_a_sibling_erase() {
        let table = WatcherTable::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let h1 = table.insert("/a", {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        let counted = calls.clone();
        table.insert("/a", move || {
            counted.fetch_add(10, Ordering::SeqCst);
        });
        table.erase("/a", h1);
        table.invoke("/a");
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
