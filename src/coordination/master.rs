//! The master client: a single connection to a coordination backend that
//! every primitive in this module (barrier, lock, id generator, node
//! registry, task state, rpc directory, context/model store) is built on
//! top of. Nothing outside this file ever calls a [`CoordinationBackend`]
//! directly.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::async_watcher::AsyncWatcher;
use crate::watcher::{WatcherHandle, WatcherTable};

use super::backend::{BackendError, BackendResult, CoordinationBackend};
use super::path;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The outcome of a path-tree call once transient `Disconnected` errors
/// have been retried away and a fatal `Error` has aborted the process.
/// Only the semantic outcomes remain for callers to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterStatus {
    Ok,
    PathFailed,
    NodeFailed,
}

impl MasterStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, MasterStatus::Ok)
    }
}

/// The fixed sub-trees every master client ensures exist under its root
/// prefix at connect time.
const FIXED_SUBTREES: &[&str] = &[
    "_node_",
    "_task_state_",
    "_rpc_",
    "_id_gen_",
    "_lock_",
    "_barrier_",
    "_context_",
    "_model_",
];

/// A path-tree client rooted under a configurable prefix, with a watcher
/// table for callback subscribers and a pool of [`AsyncWatcher`]s the
/// blocking coordination primitives (barrier, lock, `wait_task_ready`)
/// poll against.
///
/// Not `Clone`: callers share one client through `Arc<MasterClient>`, one
/// `MasterClient` per process.
pub struct MasterClient {
    backend: Arc<dyn CoordinationBackend>,
    root: String,
    table: Arc<WatcherTable>,
    async_watchers: Arc<Mutex<HashMap<String, Arc<AsyncWatcher>>>>,
    acquired_locks: Mutex<HashMap<String, String>>,
    dispatch_task: tokio::task::JoinHandle<()>,
}

impl Drop for MasterClient {
    fn drop(&mut self) {
        self.dispatch_task.abort();
    }
}

impl MasterClient {
    /// Connects to `backend`, arms the event-dispatch task, and ensures
    /// every segment of `root` plus the eight fixed sub-trees exist.
    /// `backend.take_events()` is called exactly once here; a backend
    /// that has already had its events taken fails the connect.
    pub async fn connect(backend: Arc<dyn CoordinationBackend>, root: &str) -> anyhow::Result<Arc<Self>> {
        let events = backend
            .take_events()
            .ok_or_else(|| anyhow::anyhow!("master client: backend event channel already taken"))?;
        let table = Arc::new(WatcherTable::new());
        let async_watchers: Arc<Mutex<HashMap<String, Arc<AsyncWatcher>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let dispatch_task = tokio::spawn(Self::dispatch_loop(
            events,
            table.clone(),
            async_watchers.clone(),
        ));
        let client = Arc::new(Self {
            backend,
            root: root.trim_matches('/').to_string(),
            table,
            async_watchers,
            acquired_locks: Mutex::new(HashMap::new()),
            dispatch_task,
        });
        client.initialize().await;
        Ok(client)
    }

    /// Drains backend events and fans each one out to every watcher
    /// registered on the fired path or any of its ancestors -- both the
    /// callback table and the async-watcher pool used by blocking waits.
    async fn dispatch_loop(
        mut events: mpsc::UnboundedReceiver<String>,
        table: Arc<WatcherTable>,
        async_watchers: Arc<Mutex<HashMap<String, Arc<AsyncWatcher>>>>,
    ) {
        while let Some(fired_path) = events.recv().await {
            for prefix in path::prefixes(&fired_path) {
                table.invoke(&prefix);
                if let Some(watcher) = async_watchers.lock().expect("async watcher map poisoned").get(&prefix) {
                    watcher.notify();
                }
            }
        }
    }

    async fn initialize(&self) {
        let mut accum = String::new();
        for segment in path::segments(&self.root) {
            if !accum.is_empty() {
                accum.push('/');
            }
            accum.push_str(segment);
            self.raw_add(&accum, "", false).await;
        }
        for sub in FIXED_SUBTREES {
            self.add(sub, "", false).await;
        }
    }

    pub fn endpoint(&self) -> String {
        self.backend.endpoint()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub(crate) fn full(&self, relative: &str) -> String {
        path::join(&self.root, relative)
    }

    /// Retries `make_future` for as long as the backend reports
    /// `Disconnected`, with a jittered backoff between attempts; returns
    /// `Ok` on success and the semantic status on `PathFailed`/
    /// `NodeFailed`. A backend-reported `Error` is a fatal, unrecoverable
    /// condition and aborts the process rather than returning.
    async fn retry<T, F, Fut>(&self, mut make_future: F) -> Result<T, MasterStatus>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        loop {
            match make_future().await {
                Ok(value) => return Ok(value),
                Err(BackendError::Disconnected) => {
                    let backoff = jittered_backoff();
                    warn!(?backoff, "master client: disconnected from coordination backend, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(BackendError::PathFailed) => return Err(MasterStatus::PathFailed),
                Err(BackendError::NodeFailed) => return Err(MasterStatus::NodeFailed),
                Err(BackendError::Other(message)) => {
                    error!(error = %message, "master client: fatal coordination backend error");
                    panic!("master client: fatal coordination backend error: {message}");
                }
            }
        }
    }

    async fn raw_add(&self, full_path: &str, value: &str, ephemeral: bool) -> MasterStatus {
        match self.retry(|| self.backend.add(full_path, value, ephemeral)).await {
            Ok(()) => MasterStatus::Ok,
            Err(status) => status,
        }
    }

    pub async fn add(&self, path: &str, value: &str, ephemeral: bool) -> MasterStatus {
        self.raw_add(&self.full(path), value, ephemeral).await
    }

    pub async fn set(&self, path: &str, value: &str) -> MasterStatus {
        let full = self.full(path);
        match self.retry(|| self.backend.set(&full, value)).await {
            Ok(()) => MasterStatus::Ok,
            Err(status) => status,
        }
    }

    /// Reads `path`'s value and re-arms its backend watch as a side
    /// effect, regardless of whether the node exists -- so a caller can
    /// `get` a not-yet-created node and still be woken on its creation.
    pub async fn get(&self, path: &str) -> (MasterStatus, Option<String>) {
        let full = self.full(path);
        match self.retry(|| self.backend.get(&full)).await {
            Ok(value) => {
                self.backend.arm_watch(&full).await;
                (MasterStatus::Ok, value)
            }
            Err(status) => (status, None),
        }
    }

    async fn raw_del(&self, full_path: &str) -> MasterStatus {
        match self.retry(|| self.backend.del(full_path)).await {
            Ok(()) => MasterStatus::Ok,
            Err(status) => status,
        }
    }

    pub async fn del(&self, path: &str) -> MasterStatus {
        self.raw_del(&self.full(path)).await
    }

    async fn raw_sub(&self, full_path: &str) -> (MasterStatus, Vec<String>) {
        match self.retry(|| self.backend.sub(full_path)).await {
            Ok(children) => {
                self.backend.arm_watch(full_path).await;
                (MasterStatus::Ok, children)
            }
            Err(status) => (status, Vec::new()),
        }
    }

    pub async fn sub(&self, path: &str) -> (MasterStatus, Vec<String>) {
        self.raw_sub(&self.full(path)).await
    }

    pub async fn gen(&self, path: &str, value: &str, ephemeral: bool) -> (MasterStatus, String) {
        let full = self.full(path);
        match self.retry(|| self.backend.gen(&full, value, ephemeral)).await {
            Ok(name) => (MasterStatus::Ok, name),
            Err(status) => (status, String::new()),
        }
    }

    /// Registers `cb` under `path` in the watcher table, then immediately
    /// issues a `get`/`sub` to arm the backend's one-shot watch. This is
    /// the key contract: backend watches fire exactly once, so a callback
    /// that wants further notifications must re-`get`/`sub` itself --
    /// `watch` only arms the *first* one.
    pub async fn watch<F: Fn() + Send + Sync + 'static>(&self, path: &str, cb: F) -> WatcherHandle {
        let full = self.full(path);
        let handle = self.table.insert(&full, cb);
        let _ = self.get(path).await;
        let _ = self.sub(path).await;
        handle
    }

    pub fn unwatch(&self, path: &str, handle: WatcherHandle) {
        self.table.erase(&self.full(path), handle);
    }

    /// Returns the shared [`AsyncWatcher`] for `path`, creating it on
    /// first use. Used internally by the blocking coordination primitives
    /// to turn "wait until some path-tree condition holds" into a
    /// retry-when-version-changes loop.
    pub(crate) fn watcher_for(&self, path: &str) -> Arc<AsyncWatcher> {
        let full = self.full(path);
        self.async_watchers
            .lock()
            .expect("async watcher map poisoned")
            .entry(full)
            .or_insert_with(|| Arc::new(AsyncWatcher::new()))
            .clone()
    }

    /// Recursively deletes `path` and every descendant, relative to the
    /// client's root.
    pub(crate) fn delete_subtree<'a>(&'a self, path: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let (_, children) = self.sub(path).await;
            for child in children {
                let child_path = format!("{path}/{child}");
                self.delete_subtree(&child_path).await;
            }
            self.del(path).await;
        })
    }

    /// Recursively deletes every child of the root, leaving the root and
    /// its fixed sub-trees themselves untouched -- the fixed sub-trees are
    /// structural (every coordination primitive assumes they exist) rather
    /// than user data, so they are skipped here and never need recreating.
    pub async fn clear_master(&self) {
        let (_, children) = self.sub("").await;
        for child in children {
            if FIXED_SUBTREES.contains(&child.as_str()) {
                continue;
            }
            self.delete_subtree(&child).await;
        }
    }

    pub(crate) fn acquired_locks(&self) -> &Mutex<HashMap<String, String>> {
        &self.acquired_locks
    }
}

fn jittered_backoff() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(200..600))
}

#[cfg(test)]
mod tests {
    use super::super::InMemoryBackend;
    use super::*;

    async fn connected_client(root: &str) -> Arc<MasterClient> {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        MasterClient::connect(backend, root).await.unwrap()
    }

    #[tokio::test]
    async fn initialize_creates_the_fixed_subtrees() {
        let client = connected_client("cluster/a").await;
        for sub in FIXED_SUBTREES {
            let (status, _) = client.sub(sub).await;
            assert_eq!(status, MasterStatus::Ok, "missing fixed subtree {sub}");
        }
    }

    #[tokio::test]
    async fn add_get_set_del_round_trip() {
        let client = connected_client("root").await;
        assert_eq!(client.add("k", "v1", false).await, MasterStatus::Ok);
        assert_eq!(client.add("k", "v2", false).await, MasterStatus::NodeFailed);
        let (status, value) = client.get("k").await;
        assert_eq!(status, MasterStatus::Ok);
        assert_eq!(value, Some("v1".to_string()));

        assert_eq!(client.set("k", "v2").await, MasterStatus::Ok);
        let (_, value) = client.get("k").await;
        assert_eq!(value, Some("v2".to_string()));

        assert_eq!(client.del("k").await, MasterStatus::Ok);
        let (_, value) = client.get("k").await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn add_under_missing_parent_is_path_failed() {
        let client = connected_client("root").await;
        assert_eq!(client.add("missing/child", "v", false).await, MasterStatus::PathFailed);
    }

    #[tokio::test]
    async fn watch_fires_on_creation_and_is_one_shot() {
        let client = connected_client("root").await;
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = seen.clone();
        client
            .watch("k", move || {
                counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .await;

        client.add("k", "v1", false).await;
        // Give the dispatch task a turn to run.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);

        // The backend watch armed by `watch`'s `get` was consumed by the
        // `add` event above; a second mutation fires nothing until the
        // callback re-arms it itself (which this callback does not do).
        client.set("k", "v2").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_master_removes_children_but_keeps_fixed_subtrees() {
        let client = connected_client("root").await;
        client.add("scratch", "v", false).await;
        client.add("scratch/nested", "v", false).await;
        client.clear_master().await;

        let (_, value) = client.get("scratch").await;
        assert_eq!(value, None);
        let (status, _) = client.sub("_node_").await;
        assert_eq!(status, MasterStatus::Ok);
    }
}
