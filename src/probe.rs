//! Fleet reachability: probe many tables at once, bounded by a semaphore.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::runner::CommandRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub host: String,
    pub reachable: bool,
}

/// Probe every host, at most `max_parallel` at a time. Results keep input order.
pub async fn probe_all(runner: &CommandRunner, hosts: &[String], max_parallel: usize) -> Vec<Probe> {
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, host) in hosts.iter().enumerate() {
        let runner = runner.clone();
        let permits = Arc::clone(&permits);
        let host = host.clone();
        tasks.spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            let reachable = runner.test_connection(&host).await;
            debug!(%host, reachable, "probe finished");
            (idx, reachable)
        });
    }

    let mut reachable = vec![false; hosts.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, ok)) => reachable[idx] = ok,
            Err(e) => warn!("probe task failed: {e}"),
        }
    }

    hosts
        .iter()
        .zip(reachable)
        .map(|(host, reachable)| Probe {
            host: host.clone(),
            reachable,
        })
        .collect()
}

/// `3/4 tables reachable`
pub fn summary(probes: &[Probe]) -> String {
    let up = probes.iter().filter(|p| p.reachable).count();
    format!("{up}/{} tables reachable", probes.len())
}
