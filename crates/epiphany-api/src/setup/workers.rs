//! Worker pool startup

use crate::state::AppState;
use epiphany_worker::{JobHandler, WorkerConfig, WorkerPool};
use std::sync::{Arc, Weak};

/// Start one pool per queue. The pools hold a weak reference to the state,
/// so dropping the state stops dispatch.
pub fn start_workers(state: &Arc<AppState>) -> Vec<WorkerPool> {
    let config = WorkerConfig::from(&state.config.queue);
    let handler: Weak<dyn JobHandler> = Arc::downgrade(state) as Weak<dyn JobHandler>;
    let pools = WorkerPool::start_all(state.coordinator.queues(), &config, handler);
    tracing::info!(
        pools = pools.len(),
        concurrency = config.concurrency,
        "Workers started"
    );
    pools
}

/// Stop every pool and wait for the claim loops to exit
pub async fn shutdown_workers(pools: &[WorkerPool]) {
    for pool in pools {
        pool.shutdown().await;
    }
    tracing::info!("Workers stopped");
}
