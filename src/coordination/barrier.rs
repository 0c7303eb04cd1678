//! Barrier: all-wait-for-all synchronization built from an ephemeral
//! sequential node per participant and a single "releaser" -- the
//! participant whose node turns out to be lexicographically last once
//! everyone has joined.

use super::master::MasterClient;

impl MasterClient {
    /// Blocks until `participant_count` distinct callers have entered the
    /// barrier named `name`. Safe to call again with the same name once
    /// every participant has left: the barrier leaves no residual state
    /// behind in the non-releaser path, and the releaser cleans up both
    /// its own node and the `ready` marker before returning.
    pub async fn barrier(&self, name: &str, participant_count: usize) {
        let ready_path = format!("_barrier_/{name}/ready");
        let node_dir = format!("_barrier_/{name}/node");

        self.wait_until_absent(&ready_path).await;

        self.add(&format!("_barrier_/{name}"), "", false).await;
        self.add(&node_dir, "", false).await;
        let (_, generated) = self.gen(&node_dir, "", true).await;
        let own_path = format!("{node_dir}/{generated}");

        let (_, children) = self.sub(&node_dir).await;
        let is_releaser = children.len() == participant_count && children.last() == Some(&generated);

        if is_releaser {
            self.add(&ready_path, "", false).await;
            loop {
                let watcher = self.watcher_for(&node_dir);
                let (_, changed) = watcher.arm();
                let (_, children) = self.sub(&node_dir).await;
                if children.len() <= 1 {
                    break;
                }
                changed.await;
            }
            self.del(&own_path).await;
            self.del(&ready_path).await;
        } else {
            self.wait_until_present(&ready_path).await;
            self.del(&own_path).await;
        }
    }

    async fn wait_until_absent(&self, path: &str) {
        loop {
            let watcher = self.watcher_for(path);
            let (_, changed) = watcher.arm();
            let (_, value) = self.get(path).await;
            if value.is_none() {
                return;
            }
            changed.await;
        }
    }

    async fn wait_until_present(&self, path: &str) {
        loop {
            let watcher = self.watcher_for(path);
            let (_, changed) = watcher.arm();
            let (_, value) = self.get(path).await;
            if value.is_some() {
                return;
            }
            changed.await;
        }
    }
}
