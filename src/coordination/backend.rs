//! The storage contract a coordination backend must satisfy: a
//! slash-delimited path tree with ephemeral nodes, sequential children,
//! and one-shot watches. Any ZooKeeper-shaped store can implement this
//! trait; [`InMemoryBackend`] is a test-only implementation that
//! emulates the one-shot re-arming contract explicitly rather than
//! offering the persistent watches a plain map could trivially support.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    Disconnected,
    PathFailed,
    NodeFailed,
    Other(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A ZooKeeper-shaped path tree. Every method takes a fully-qualified
/// path (root prefix already joined in by the caller).
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    async fn add(&self, path: &str, value: &str, ephemeral: bool) -> BackendResult<()>;
    async fn set(&self, path: &str, value: &str) -> BackendResult<()>;
    async fn get(&self, path: &str) -> BackendResult<Option<String>>;
    async fn del(&self, path: &str) -> BackendResult<()>;
    async fn sub(&self, path: &str) -> BackendResult<Vec<String>>;
    /// Creates a sequential child `"<path>/_<seq>"` and returns `_<seq>`.
    async fn gen(&self, path: &str, value: &str, ephemeral: bool) -> BackendResult<String>;
    /// Arms a one-shot watch on `path`: the next mutation affecting it
    /// fires exactly one event on the channel returned by
    /// [`CoordinationBackend::take_events`], then the arming is
    /// consumed.
    async fn arm_watch(&self, path: &str);
    fn endpoint(&self) -> String;
    /// Returns the event receiver. Callable exactly once per backend
    /// instance; the master client takes it at connect time.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<String>>;
}

struct Node {
    value: String,
    ephemeral: bool,
    children: BTreeMap<String, ()>,
    /// Next sequence number to hand out to a `gen`-created child of this
    /// node. ZooKeeper scopes sequential counters per parent rather than
    /// globally, so two unrelated sequential directories both start their
    /// children at `_0000000000`.
    next_seq: u64,
}

struct State {
    nodes: HashMap<String, Node>,
    armed_watches: HashMap<String, u32>,
}

/// A single-process path tree for tests, guarded by a `std::sync::Mutex`
/// since operations never actually await I/O.
pub struct InMemoryBackend {
    state: Mutex<State>,
    events_tx: mpsc::UnboundedSender<String>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    endpoint: String,
}

impl InMemoryBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(State {
                nodes: HashMap::new(),
                armed_watches: HashMap::new(),
            }),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            endpoint: endpoint.into(),
        }
    }

    fn fire(state: &mut State, tx: &mpsc::UnboundedSender<String>, path: &str) {
        if let Some(count) = state.armed_watches.get_mut(path) {
            if *count > 0 {
                *count -= 1;
                let _ = tx.send(path.to_string());
            }
            if *count == 0 {
                state.armed_watches.remove(path);
            }
        }
    }

    fn insert_child(state: &mut State, parent: &str, child_name: &str) {
        if let Some(node) = state.nodes.get_mut(parent) {
            node.children.insert(child_name.to_string(), ());
        }
    }

    fn remove_child(state: &mut State, parent: &str, child_name: &str) {
        if let Some(node) = state.nodes.get_mut(parent) {
            node.children.remove(child_name);
        }
    }
}

#[async_trait]
impl CoordinationBackend for InMemoryBackend {
    async fn add(&self, full_path: &str, value: &str, ephemeral: bool) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.nodes.contains_key(full_path) {
            return Err(BackendError::NodeFailed);
        }
        if let Some(parent) = path::parent(full_path) {
            if !state.nodes.contains_key(&parent) {
                return Err(BackendError::PathFailed);
            }
        }
        state.nodes.insert(
            full_path.to_string(),
            Node {
                value: value.to_string(),
                ephemeral,
                children: BTreeMap::new(),
                next_seq: 0,
            },
        );
        if let Some(parent) = path::parent(full_path) {
            let name = path::basename(full_path).to_string();
            Self::insert_child(&mut state, &parent, &name);
            Self::fire(&mut state, &self.events_tx, &parent);
        }
        // A watch armed on `full_path` itself (via `get`/`exists`, before
        // the node existed) fires on its creation too, mirroring
        // ZooKeeper's NodeCreated event alongside NodeChildrenChanged on
        // the parent.
        Self::fire(&mut state, &self.events_tx, full_path);
        Ok(())
    }

    async fn set(&self, full_path: &str, value: &str) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(full_path) {
            Some(node) => {
                node.value = value.to_string();
                Self::fire(&mut state, &self.events_tx, full_path);
                Ok(())
            }
            None => Err(BackendError::NodeFailed),
        }
    }

    async fn get(&self, full_path: &str) -> BackendResult<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.nodes.get(full_path).map(|n| n.value.clone()))
    }

    async fn del(&self, full_path: &str) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.nodes.remove(full_path).is_none() {
            return Err(BackendError::NodeFailed);
        }
        if let Some(parent) = path::parent(full_path) {
            let name = path::basename(full_path).to_string();
            Self::remove_child(&mut state, &parent, &name);
            Self::fire(&mut state, &self.events_tx, &parent);
        }
        Self::fire(&mut state, &self.events_tx, full_path);
        Ok(())
    }

    async fn sub(&self, full_path: &str) -> BackendResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(full_path) {
            Some(node) => Ok(node.children.keys().cloned().collect()),
            None => Err(BackendError::PathFailed),
        }
    }

    async fn gen(&self, full_path: &str, value: &str, ephemeral: bool) -> BackendResult<String> {
        let seq = {
            let mut state = self.state.lock().unwrap();
            let node = state.nodes.get_mut(full_path).ok_or(BackendError::PathFailed)?;
            let seq = node.next_seq;
            node.next_seq += 1;
            seq
        };
        let name = format!("_{seq:010}");
        let child_path = format!("{full_path}/{name}");
        self.add(&child_path, value, ephemeral).await?;
        Ok(name)
    }

    async fn arm_watch(&self, full_path: &str) {
        let mut state = self.state.lock().unwrap();
        *state.armed_watches.entry(full_path.to_string()).or_insert(0) += 1;
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.events_rx.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_fails_without_parent_and_succeeds_once_parent_exists() {
        let backend = InMemoryBackend::new("mem:0");
        assert_eq!(
            backend.add("a/b", "v", false).await,
            Err(BackendError::PathFailed)
        );
        backend.add("a", "root", false).await.unwrap();
        backend.add("a/b", "v", false).await.unwrap();
        assert_eq!(backend.get("a/b").await.unwrap(), Some("v".to_string()));
        assert_eq!(backend.sub("a").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn watch_is_one_shot() {
        let backend = InMemoryBackend::new("mem:0");
        backend.add("a", "1", false).await.unwrap();
        backend.arm_watch("a").await;
        let mut rx = backend.take_events().unwrap();

        backend.set("a", "2").await.unwrap();
        assert_eq!(rx.recv().await, Some("a".to_string()));

        backend.set("a", "3").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn gen_creates_sorted_sequential_children() {
        let backend = InMemoryBackend::new("mem:0");
        backend.add("g", "root", false).await.unwrap();
        let n0 = backend.gen("g", "", true).await.unwrap();
        let n1 = backend.gen("g", "", true).await.unwrap();
        assert!(n0 < n1);
        assert_eq!(backend.sub("g").await.unwrap(), vec![n0, n1]);
    }

    #[tokio::test]
    async fn gen_sequence_counters_are_scoped_per_parent() {
        let backend = InMemoryBackend::new("mem:0");
        backend.add("g1", "root", false).await.unwrap();
        backend.add("g2", "root", false).await.unwrap();
        backend.gen("g1", "", true).await.unwrap();
        let first_under_g2 = backend.gen("g2", "", true).await.unwrap();
        assert_eq!(first_under_g2, "_0000000000");
    }
}
