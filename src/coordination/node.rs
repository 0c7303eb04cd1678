//! Node registry: every live process registers itself ephemerally under
//! `_node_/<global_rank>` so the rest of the fleet can look its
//! connection info up by rank.

use serde::{Deserialize, Serialize};

use super::master::{MasterClient, MasterStatus};

/// The connection information a process advertises about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommInfo {
    pub global_rank: i32,
    pub host: String,
    pub port: u16,
}

impl MasterClient {
    /// Writes `info` to `_node_/<info.global_rank>`, ephemerally: the
    /// registration disappears automatically if this process's session
    /// is lost.
    pub async fn register_node(&self, info: &CommInfo) -> MasterStatus {
        let value = serde_json::to_string(info).expect("CommInfo always serializes");
        self.add(&format!("_node_/{}", info.global_rank), &value, true).await
    }

    pub async fn get_comm_info(&self, global_rank: i32) -> Option<CommInfo> {
        let (_, value) = self.get(&format!("_node_/{global_rank}")).await;
        value.and_then(|json| serde_json::from_str(&json).ok())
    }

    /// Enumerates every registered node by listing `_node_`'s children
    /// and reading each in turn.
    pub async fn get_all_comm_info(&self) -> Vec<CommInfo> {
        let (_, ranks) = self.sub("_node_").await;
        let mut infos = Vec::with_capacity(ranks.len());
        for rank in ranks {
            let (_, value) = self.get(&format!("_node_/{rank}")).await;
            if let Some(info) = value.and_then(|json| serde_json::from_str(&json).ok()) {
                infos.push(info);
            }
        }
        infos
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::backend::InMemoryBackend;
    use super::super::CoordinationBackend;
    use super::*;

    #[tokio::test]
    async fn register_and_read_back_by_rank() {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        let client = MasterClient::connect(backend, "cluster").await.unwrap();

        let info = CommInfo { global_rank: 3, host: "10.0.0.3".to_string(), port: 9000 };
        assert_eq!(client.register_node(&info).await, MasterStatus::Ok);

        let read_back = client.get_comm_info(3).await.unwrap();
        assert_eq!(read_back, info);
        assert!(client.get_comm_info(4).await.is_none());
    }

    #[tokio::test]
    async fn enumerates_every_registered_node() {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        let client = MasterClient::connect(backend, "cluster").await.unwrap();

        client
            .register_node(&CommInfo { global_rank: 0, host: "a".into(), port: 1 })
            .await;
        client
            .register_node(&CommInfo { global_rank: 1, host: "b".into(), port: 2 })
            .await;

        let mut all = client.get_all_comm_info().await;
        all.sort_by_key(|i| i.global_rank);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].host, "a");
        assert_eq!(all[1].host, "b");
    }
}
