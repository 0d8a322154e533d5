use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use socketioxide::SocketIo;

use super::worker_pool::WorkerPool;

#[derive(Debug, Serialize, Clone)]
pub struct SpeakerActive {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub volume: u32,
    pub timestamp: i64,
}

/// Subscribes to a worker's active-speaker notification stream for one
/// router and republishes it to the room as `speaker:active`, throttled to
/// at most once per 200ms — the worker already rate-limits at source, this
/// is a defensive floor in case it doesn't.
pub fn spawn_speaker_relay(
    io: SocketIo,
    worker_pool: Arc<WorkerPool>,
    worker_id: u64,
    room_id: String,
    producer_to_user: Arc<dashmap::DashMap<String, i64>>,
) {
    let Some(worker) = worker_pool.get(worker_id) else {
        return;
    };
    let mut notifications = worker.notifications.subscribe();

    tokio::spawn(async move {
        let mut last_emit = tokio::time::Instant::now() - Duration::from_millis(200);
        loop {
            match notifications.recv().await {
                Ok(note) if note.method == "active-speaker-changed" => {
                    let Some(producer_id) = note.params.get("producerId").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    let Some(user_id) = producer_to_user.get(producer_id).map(|e| *e) else {
                        continue;
                    };

                    let now = tokio::time::Instant::now();
                    if now.duration_since(last_emit) < Duration::from_millis(200) {
                        continue;
                    }
                    last_emit = now;

                    let event = SpeakerActive {
                        user_id,
                        volume: 0,
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    };
                    let _ = io.to(room_id.clone()).emit("speaker:active", &event);
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
