//! Context / model store: two flat key-value namespaces, `_context_` for
//! ephemeral per-run state and `_model_` for published model artifacts,
//! the latter with a watch hook so subscribers learn when a name is
//! published or updated.

use super::master::{MasterClient, MasterStatus};
use crate::watcher::WatcherHandle;

/// Which of the two flat namespaces a key-value call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Context,
    Model,
}

impl StoreKind {
    fn prefix(self) -> &'static str {
        match self {
            StoreKind::Context => "_context_",
            StoreKind::Model => "_model_",
        }
    }
}

impl MasterClient {
    pub async fn store_add(&self, kind: StoreKind, key: &str, value: &str) -> MasterStatus {
        self.add(&format!("{}/{key}", kind.prefix()), value, false).await
    }

    pub async fn store_set(&self, kind: StoreKind, key: &str, value: &str) -> MasterStatus {
        self.set(&format!("{}/{key}", kind.prefix()), value).await
    }

    pub async fn store_get(&self, kind: StoreKind, key: &str) -> Option<String> {
        let (_, value) = self.get(&format!("{}/{key}", kind.prefix())).await;
        value
    }

    pub async fn store_del(&self, kind: StoreKind, key: &str) -> MasterStatus {
        self.del(&format!("{}/{key}", kind.prefix())).await
    }

    /// Lists every key currently held in `_context_`.
    pub async fn get_storage_list(&self) -> Vec<String> {
        let (_, names) = self.sub(StoreKind::Context.prefix()).await;
        names
    }

    /// Lists every name currently published in `_model_`.
    pub async fn get_model_names(&self) -> Vec<String> {
        let (_, names) = self.sub(StoreKind::Model.prefix()).await;
        names
    }

    /// Watches for `name` being published or updated under `_model_`.
    /// Like every other `watch` use in this module, `cb` fires once and
    /// must re-arm itself (via another `watch_model` call, or a fresh
    /// `store_get`) to see further changes.
    pub async fn watch_model<F: Fn() + Send + Sync + 'static>(
        &self,
        name: &str,
        cb: F,
    ) -> WatcherHandle {
        self.watch(&format!("_model_/{name}"), cb).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::super::backend::InMemoryBackend;
    use super::super::CoordinationBackend;
    use super::*;

    async fn connected() -> Arc<MasterClient> {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        MasterClient::connect(backend, "cluster").await.unwrap()
    }

    #[tokio::test]
    async fn context_and_model_are_independent_namespaces() {
        let client = connected().await;
        client.store_add(StoreKind::Context, "run-1", "active").await;
        client.store_add(StoreKind::Model, "run-1", "v1").await;

        assert_eq!(client.store_get(StoreKind::Context, "run-1").await, Some("active".to_string()));
        assert_eq!(client.store_get(StoreKind::Model, "run-1").await, Some("v1".to_string()));

        client.store_del(StoreKind::Context, "run-1").await;
        assert_eq!(client.store_get(StoreKind::Context, "run-1").await, None);
        assert_eq!(client.store_get(StoreKind::Model, "run-1").await, Some("v1".to_string()));
    }

    #[tokio::test]
    async fn storage_and_model_lists_enumerate_their_keys() {
        let client = connected().await;
        client.store_add(StoreKind::Context, "a", "1").await;
        client.store_add(StoreKind::Context, "b", "2").await;
        client.store_add(StoreKind::Model, "m", "v").await;

        let mut storage = client.get_storage_list().await;
        storage.sort();
        assert_eq!(storage, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(client.get_model_names().await, vec!["m".to_string()]);
    }

    #[tokio::test]
    async fn watch_model_fires_once_on_publish() {
        let client = connected().await;
        let seen = Arc::new(AtomicUsize::new(0));
        let counted = seen.clone();
        client
            .watch_model("resnet", move || {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        client.store_add(StoreKind::Model, "resnet", "v1").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
