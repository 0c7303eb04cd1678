//! Monotonic id generation: every call to [`generate_id`](MasterClient::generate_id)
//! for a given key hands back the next integer in a strictly increasing
//! sequence, implemented as a sequential child under `_id_gen_/<key>`.

use super::master::MasterClient;
use super::path;

impl MasterClient {
    /// Allocates the next id in the sequence keyed by `key`. The
    /// generated child's name has the form `_<integer>`; its sequence
    /// number is the id.
    pub async fn generate_id(&self, key: &str) -> u64 {
        let dir = format!("_id_gen_/{key}");
        self.add(&dir, "", false).await;
        let (_, generated) = self.gen(&dir, "", false).await;
        path::sequence_number(&generated).expect("backend always returns `_<seq>` names")
    }

    /// Recursively clears the subtree backing `key`'s sequence, so the
    /// next [`generate_id`](Self::generate_id) call for it starts over.
    pub async fn reset_generate_id(&self, key: &str) {
        self.delete_subtree(&format!("_id_gen_/{key}")).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::backend::InMemoryBackend;
    use super::super::CoordinationBackend;
    use super::*;

    #[tokio::test]
    async fn ids_are_strictly_increasing() {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        let client = MasterClient::connect(backend, "cluster").await.unwrap();

        let a = client.generate_id("k").await;
        let b = client.generate_id("k").await;
        let c = client.generate_id("k").await;
        assert!(a < b);
        assert!(b < c);
    }

    #[tokio::test]
    async fn reset_restarts_the_sequence_from_zero() {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        let client = MasterClient::connect(backend, "cluster").await.unwrap();

        client.generate_id("k").await;
        client.generate_id("k").await;
        client.reset_generate_id("k").await;
        let after_reset = client.generate_id("k").await;
        assert_eq!(after_reset, 0);
    }

    #[tokio::test]
    async fn distinct_keys_have_independent_sequences() {
        let backend: Arc<dyn CoordinationBackend> = Arc::new(InMemoryBackend::new("mem:0"));
        let client = MasterClient::connect(backend, "cluster").await.unwrap();

        let a = client.generate_id("a").await;
        let b = client.generate_id("b").await;
        assert_eq!(a, 0);
        assert_eq!(b, 0);
    }
}
