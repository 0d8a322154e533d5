use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::worker::{RestartState, Worker};

/// Broadcast when a worker dies, carrying its id so the Room Manager can
/// enumerate and close every room whose router lived on that worker,
/// without the Worker Pool needing to know about rooms directly.
#[derive(Debug, Clone)]
pub struct WorkerCrashed {
    pub worker_id: u64,
}

pub struct WorkerPool {
    binary_path: String,
    max_backoff: Duration,
    workers: RwLock<Vec<Arc<Worker>>>,
    pub crashes: broadcast::Sender<WorkerCrashed>,
}

impl WorkerPool {
    pub async fn spawn(count: usize, binary_path: &str, max_backoff: Duration) -> anyhow::Result<Arc<Self>> {
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let worker = Worker::spawn(i as u64, binary_path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to spawn media worker {i}: {e}"))?;
            tracing::info!(worker_id = i, pid = worker.pid, "media worker spawned");
            workers.push(Arc::new(worker));
        }

        let (crashes, _) = broadcast::channel(64);
        let pool = Arc::new(Self {
            binary_path: binary_path.to_string(),
            max_backoff,
            workers: RwLock::new(workers),
            crashes,
        });

        for worker in pool.workers.read().iter().cloned().collect::<Vec<_>>() {
            pool.clone().watch(worker);
        }

        Ok(pool)
    }

    /// Spawns the supervision task for one worker: awaits process exit,
    /// then removes it from the live set, announces the crash, and
    /// respawns with exponential backoff before accepting new router
    /// allocations on the replacement.
    fn watch(self: Arc<Self>, worker: Arc<Worker>) {
        tokio::spawn(async move {
            let worker_id = worker.id;
            let _ = worker.wait().await;
            tracing::error!(worker_id, "media worker exited unexpectedly");

            self.workers.write().retain(|w| w.id != worker_id);
            let _ = self.crashes.send(WorkerCrashed { worker_id });

            let mut restart = RestartState::new();
            loop {
                let backoff = restart.next_backoff(self.max_backoff);
                tokio::time::sleep(backoff).await;
                restart.restart_count += 1;
                restart.last_restart_attempt = Some(std::time::Instant::now());

                match Worker::spawn(worker_id, &self.binary_path).await {
                    Ok(replacement) => {
                        tracing::info!(worker_id, attempts = restart.restart_count, "media worker restarted");
                        let replacement = Arc::new(replacement);
                        self.workers.write().push(replacement.clone());
                        self.clone().watch(replacement);
                        metrics::counter!("worker_restarts_total").increment(1);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(worker_id, error = %e, attempt = restart.restart_count, "media worker restart failed, backing off");
                    }
                }
            }
        });
    }

    /// Picks the worker with the smallest current router count; ties are
    /// broken by lowest PID, matching the documented placement policy.
    pub fn pick_worker(&self) -> Option<Arc<Worker>> {
        self.workers
            .read()
            .iter()
            .cloned()
            .min_by_key(|w| (w.router_count(), w.pid))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }

    pub fn get(&self, worker_id: u64) -> Option<Arc<Worker>> {
        self.workers.read().iter().find(|w| w.id == worker_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_event_carries_worker_id() {
        let event = WorkerCrashed { worker_id: 7 };
        assert_eq!(event.worker_id, 7);
    }
}
