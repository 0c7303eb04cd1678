//! RPC service directory: maps an `(api, service_name)` pair to a stable
//! `rpc_id`, and each registered server under it to a `server_id` and
//! the global rank hosting it, under `_rpc_/<api>/<service_name>`.

use super::master::MasterClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_id: u64,
    pub global_rank: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcServiceInfo {
    pub service_name: String,
    pub rpc_id: u64,
    pub servers: Vec<ServerInfo>,
}

impl MasterClient {
    /// Returns the stable `rpc_id` for `(api, name)`, allocating one via
    /// [`generate_id`](Self::generate_id) the first time the service name
    /// is seen under `api`. Serialized by a lock keyed on `<api>$<name>`
    /// so concurrent first registrations of the same name never race.
    pub async fn register_rpc_service(&self, api: &str, name: &str) -> u64 {
        let lock_name = format!("{api}${name}");
        self.acquire_lock(&lock_name).await;

        self.add(&format!("_rpc_/{api}"), "", false).await;
        let node = format!("_rpc_/{api}/{name}");
        let (_, existing) = self.get(&node).await;
        let rpc_id = match existing {
            Some(value) => value.parse().expect("rpc-id node always holds a u64"),
            None => {
                let id = self.generate_id(api).await;
                self.add(&node, &id.to_string(), false).await;
                id
            }
        };

        self.release_lock(&lock_name).await;
        rpc_id
    }

    /// Registers a server hosting `(api, name)` at `global_rank`, under
    /// the `rpc_id` returned by [`register_rpc_service`](Self::register_rpc_service).
    /// A `server_id` is allocated via `generate_id` keyed on `<api>$<name>`
    /// unless the caller supplies one, letting a restarting server keep
    /// its previous identity.
    pub async fn register_server(
        &self,
        api: &str,
        name: &str,
        global_rank: i32,
        server_id: Option<u64>,
    ) -> (u64, u64) {
        let rpc_id = self.register_rpc_service(api, name).await;
        let server_id = match server_id {
            Some(id) => id,
            None => self.generate_id(&format!("{api}${name}")).await,
        };

        let node = format!("_rpc_/{api}/{name}/{server_id}");
        self.add(&node, &global_rank.to_string(), true).await;
        (rpc_id, server_id)
    }

    pub async fn deregister_server(&self, api: &str, name: &str, server_id: u64) {
        self.del(&format!("_rpc_/{api}/{name}/{server_id}")).await;
    }

    pub async fn deregister_rpc_service(&self, api: &str, name: &str) {
        self.delete_subtree(&format!("_rpc_/{api}/{name}")).await;
    }

    /// Lists every service registered under `api`, each with its current
    /// server set.
    pub async fn get_rpc_service_info(&self, api: &str) -> Vec<RpcServiceInfo> {
        let (_, names) = self.sub(&format!("_rpc_/{api}")).await;
        let mut out = Vec::new();
        for name in names {
            out.push(self.get_rpc_service_info_one(api, &name).await);
        }
        out
    }

    /// Reads a single service's info by name, without listing siblings.
    pub async fn get_rpc_service_info_one(&self, api: &str, name: &str) -> RpcServiceInfo {
        let (_, rpc_id_value) = self.get(&format!("_rpc_/{api}/{name}")).await;
        let rpc_id = rpc_id_value.and_then(|v| v.parse().ok()).unwrap_or(0);

        let (_, server_ids) = self.sub(&format!("_rpc_/{api}/{name}")).await;
        let mut servers = Vec::new();
        for server_id in server_ids {
            let (_, rank_value) = self.get(&format!("_rpc_/{api}/{name}/{server_id}")).await;
            if let (Ok(server_id), Some(global_rank)) =
                (server_id.parse(), rank_value.and_then(|v| v.parse().ok()))
            {
                servers.push(ServerInfo { server_id, global_rank });
            }
        }
        RpcServiceInfo { service_name: name.to_string(), rpc_id, servers }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::backend::InMemoryBackend;
    use super::super::CoordinationBackend;
    use super::*;

    async fn connected() -> Arc<MasterClient> {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        MasterClient::connect(backend, "cluster").await.unwrap()
    }

    #[tokio::test]
    async fn second_registration_reuses_rpc_id_with_a_fresh_server_id() {
        let client = connected().await;

        let (rpc_id_a, server_id_a) = client.register_server("embed", "svc", 0, None).await;
        let (rpc_id_b, server_id_b) = client.register_server("embed", "svc", 1, None).await;

        assert_eq!(rpc_id_a, rpc_id_b);
        assert_ne!(server_id_a, server_id_b);

        let info = client.get_rpc_service_info_one("embed", "svc").await;
        assert_eq!(info.rpc_id, rpc_id_a);
        assert_eq!(info.servers.len(), 2);
    }

    #[tokio::test]
    async fn get_rpc_service_info_lists_every_service_under_the_api() {
        let client = connected().await;
        client.register_server("embed", "a", 0, None).await;
        client.register_server("embed", "b", 1, None).await;

        let infos = client.get_rpc_service_info("embed").await;
        assert_eq!(infos.len(), 2);
    }

    #[tokio::test]
    async fn deregister_server_removes_only_that_server() {
        let client = connected().await;
        let (_, server_id) = client.register_server("embed", "svc", 0, None).await;
        client.register_server("embed", "svc", 1, None).await;

        client.deregister_server("embed", "svc", server_id).await;
        let info = client.get_rpc_service_info_one("embed", "svc").await;
        assert_eq!(info.servers.len(), 1);
        assert_eq!(info.servers[0].global_rank, 1);
    }
}
