//! Role-rank allocation: every participant filling a given role agrees
//! on a dense, ordered rank among peers sharing that role, entirely via
//! three rounds of [`barrier`](MasterClient::barrier).

use super::master::MasterClient;

impl MasterClient {
    /// Allocates this participant's rank among `role_num` peers sharing
    /// `role`, keyed by its (unique) `global_rank`. Returns the assigned
    /// `role_rank` (this participant's index in the sorted list of
    /// `global_rank`s) and `all`, the full ordered list.
    ///
    /// Safe to call once per `(role, global_rank)` pair per job: the
    /// clear step at the start assumes no stale state survives between
    /// unrelated jobs reusing the same role name.
    pub async fn alloc_role_rank(
        &self,
        role: &str,
        role_num: usize,
        global_rank: i32,
    ) -> (usize, Vec<i32>) {
        let dir = format!("alloc_role_rank_{role}");
        let barrier_name = format!("alloc_role_rank_{role}");

        self.delete_subtree(&dir).await;
        self.barrier(&barrier_name, role_num).await;

        self.add(&dir, "", false).await;
        self.add(&format!("{dir}/{global_rank}"), "", false).await;
        self.barrier(&barrier_name, role_num).await;

        let (_, children) = self.sub(&dir).await;
        // Children are named after the (unpadded) decimal `global_rank`, so
        // a lexicographic sort of the names would misorder e.g. "10" before
        // "2"; sort by parsed value instead.
        let mut all: Vec<i32> = children.iter().filter_map(|c| c.parse().ok()).collect();
        all.sort_unstable();
        let role_rank = all.iter().position(|&rank| rank == global_rank).unwrap_or(0);

        self.barrier(&barrier_name, role_num).await;
        (role_rank, all)
    }
}

#[cfg(test)]
mod tests {
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
    async fn three_peers_get_a_dense_sorted_ranking() {
        let client = connected().await;
        let ranks = [40, 10, 20];

        let mut handles = Vec::new();
        for &global_rank in &ranks {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client.alloc_role_rank("worker", 3, global_rank).await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(
                tokio::time::timeout(Duration::from_secs(2), handle)
                    .await
                    .expect("alloc_role_rank should complete")
                    .unwrap(),
            );
        }

        for (role_rank, all) in &results {
            assert_eq!(all, &vec![10, 20, 40]);
            assert_eq!(all[*role_rank], all[*role_rank]);
        }
        // Each participant computed its own position correctly.
        for (global_rank, (role_rank, all)) in ranks.iter().zip(results.iter()) {
            assert_eq!(all[*role_rank], *global_rank);
        }
    }

    #[tokio::test]
    async fn ranks_sort_numerically_not_lexicographically() {
        let client = connected().await;
        let ranks = [2, 10, 1];

        let mut handles = Vec::new();
        for &global_rank in &ranks {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client.alloc_role_rank("wide", 3, global_rank).await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(
                tokio::time::timeout(Duration::from_secs(2), handle)
                    .await
                    .expect("alloc_role_rank should complete")
                    .unwrap(),
            );
        }

        for (_, all) in &results {
            assert_eq!(all, &vec![1, 2, 10], "a lexicographic sort would put 10 before 2");
        }
    }
}
