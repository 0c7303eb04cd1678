//! Task lifecycle: the four fixed nodes under `_task_state_` a master
//! uses to announce readiness or failure to every worker in a job, and
//! that workers use to advertise their own role.

use super::master::{MasterClient, MasterStatus};

impl MasterClient {
    /// Blocks until `_task_state_/ready` exists. Implemented as a
    /// retry-when-notified loop over the shared async watcher for that
    /// path: each iteration re-arms the backend watch via `get` (the
    /// one-shot re-arming contract every primitive in this module has to
    /// honor) before waiting for the next notification.
    pub async fn wait_task_ready(&self) {
        loop {
            let watcher = self.watcher_for("_task_state_/ready");
            let (_, changed) = watcher.arm();
            let (_, value) = self.get("_task_state_/ready").await;
            if value.is_some() {
                return;
            }
            changed.await;
        }
    }

    pub async fn set_task_ready(&self) -> MasterStatus {
        self.add("_task_state_/ready", "", false).await
    }

    /// Registers `cb` to fire with the failure message once
    /// `_task_state_/fail` is created, firing immediately if it already
    /// exists. Spawns a short-lived task per notification to perform the
    /// follow-up read, since the watcher-table callback itself must stay
    /// synchronous and non-reentrant.
    pub async fn watch_task_fail<F>(self: &std::sync::Arc<Self>, cb: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let cb: std::sync::Arc<dyn Fn(String) + Send + Sync> = std::sync::Arc::new(cb);
        let client = self.clone();
        let watch_cb = cb.clone();
        self.watch("_task_state_/fail", move || {
            let client = client.clone();
            let cb = watch_cb.clone();
            tokio::spawn(async move {
                if let (_, Some(message)) = client.get("_task_state_/fail").await {
                    cb(message);
                }
            });
        })
        .await;

        if let (_, Some(message)) = self.get("_task_state_/fail").await {
            cb(message);
        }
    }

    pub async fn set_task_fail(&self, message: &str) -> MasterStatus {
        self.add("_task_state_/fail", message, false).await
    }

    pub async fn add_task_node(&self, rank: i32, role: &str) -> MasterStatus {
        self.add("_task_state_/node", "", false).await;
        self.add(&format!("_task_state_/node/{rank}"), role, false).await
    }

    pub async fn del_task_node(&self, rank: i32) -> MasterStatus {
        self.del(&format!("_task_state_/node/{rank}")).await
    }

    /// Lists every participant node, optionally filtered to one role.
    pub async fn get_task_node(&self, role: Option<&str>) -> Vec<(i32, String)> {
        let (_, ranks) = self.sub("_task_state_/node").await;
        let mut out = Vec::new();
        for rank_str in ranks {
            let Ok(rank) = rank_str.parse::<i32>() else { continue };
            let (_, value) = self.get(&format!("_task_state_/node/{rank}")).await;
            let Some(value) = value else { continue };
            if role.is_none_or(|wanted| wanted == value) {
                out.push((rank, value));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
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
    async fn wait_task_ready_unblocks_once_ready_appears() {
        let client = connected().await;
        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.wait_task_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.set_task_ready().await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_task_ready should unblock")
            .unwrap();
    }

    #[tokio::test]
    async fn watch_task_fail_fires_immediately_if_already_present() {
        let client = connected().await;
        client.set_task_fail("boom").await;

        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        client
            .watch_task_fail(move |msg| {
                assert_eq!(msg, "boom");
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn task_nodes_are_filterable_by_role() {
        let client = connected().await;
        client.add_task_node(0, "server").await;
        client.add_task_node(1, "worker").await;
        client.add_task_node(2, "worker").await;

        let workers = client.get_task_node(Some("worker")).await;
        assert_eq!(workers.len(), 2);
        let all = client.get_task_node(None).await;
        assert_eq!(all.len(), 3);
    }
}
