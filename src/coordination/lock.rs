//! Distributed mutual exclusion: an ephemeral sequential child per
//! contender under `_lock_/<name>`; whoever's child sorts first holds the
//! lock. A crashed holder's ephemeral node disappears with its session,
//! so the lock releases itself without any other participant acting.

use super::master::MasterClient;

impl MasterClient {
    /// Blocks until this client holds the lock named `name`, recording
    /// the acquired node's path so [`release_lock`](Self::release_lock)
    /// can find it again.
    pub async fn acquire_lock(&self, name: &str) {
        let lock_dir = format!("_lock_/{name}");
        self.add(&lock_dir, "", false).await;
        let (_, generated) = self.gen(&lock_dir, "", true).await;

        loop {
            let watcher = self.watcher_for(&lock_dir);
            let (_, changed) = watcher.arm();
            let (_, children) = self.sub(&lock_dir).await;
            if children.first() == Some(&generated) {
                break;
            }
            changed.await;
        }

        self.acquired_locks()
            .lock()
            .expect("acquired-lock map poisoned")
            .insert(name.to_string(), format!("{lock_dir}/{generated}"));
    }

    /// Releases a lock previously acquired by this client. A no-op if
    /// `name` is not currently held.
    pub async fn release_lock(&self, name: &str) {
        let held_path = self
            .acquired_locks()
            .lock()
            .expect("acquired-lock map poisoned")
            .remove(name);
        if let Some(held_path) = held_path {
            self.del(&held_path).await;
        }
    }

    pub fn holds_lock(&self, name: &str) -> bool {
        self.acquired_locks()
            .lock()
            .expect("acquired-lock map poisoned")
            .contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::super::backend::InMemoryBackend;
    use super::super::CoordinationBackend;
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ten_workers_a_hundred_increments_each_stay_exact() {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        let client = MasterClient::connect(backend, "cluster").await.unwrap();
        let counter = Arc::new(AtomicI64::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let client = client.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    client.acquire_lock("L").await;
                    let current = counter.load(Ordering::SeqCst);
                    counter.store(current + 1, Ordering::SeqCst);
                    client.release_lock("L").await;
                }
            }));
        }

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1000);
    }

    #[tokio::test]
    async fn release_clears_the_held_marker() {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        let client = MasterClient::connect(backend, "cluster").await.unwrap();
        client.acquire_lock("x").await;
        assert!(client.holds_lock("x"));
        client.release_lock("x").await;
        assert!(!client.holds_lock("x"));
    }
}
