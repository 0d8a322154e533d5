use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use socketioxide::extract::SocketRef;
use uuid::Uuid;

use skyroom_shared::clients::{InternalApiClient, RedisClient};

use crate::config::AppConfig;
use crate::error::AckError;
use crate::registry::UserId;

#[derive(Debug, Deserialize, validator::Validate)]
pub struct GiftSendPayload {
    #[validate(length(min = 1))]
    #[serde(rename = "giftId")]
    pub gift_id: String,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
    #[serde(rename = "toUserId")]
    pub to_user_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftEvent {
    #[serde(rename = "transactionId")]
    pub transaction_id: Uuid,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "fromUserId")]
    pub from_user_id: UserId,
    #[serde(rename = "toUserId")]
    pub to_user_id: Option<UserId>,
    #[serde(rename = "giftId")]
    pub gift_id: String,
    pub quantity: u32,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct GiftBroadcast<'a> {
    #[serde(rename = "transactionId")]
    pub transaction_id: Uuid,
    #[serde(rename = "fromUserId")]
    pub from_user_id: UserId,
    #[serde(rename = "toUserId")]
    pub to_user_id: Option<UserId>,
    #[serde(rename = "giftId")]
    pub gift_id: &'a str,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
struct GiftBatchResult {
    #[serde(rename = "transactionId")]
    transaction_id: Uuid,
    accepted: bool,
}

#[derive(Debug, Deserialize)]
struct GiftBatchResponse {
    results: Vec<GiftBatchResult>,
}

fn rate_limit_key(user_id: UserId) -> String {
    format!("gift:ratelimit:{user_id}")
}

/// In-memory FIFO of gift events awaiting batched persistence. The room
/// broadcast happens immediately on `push` (optimistic UX); the backend
/// write-through happens on the flusher's own schedule, and a logical
/// rejection from the backend is never retried — only a transport failure
/// re-queues the whole batch, per §4.7's "no retry on logical failure" rule.
pub struct GiftBuffer {
    queue: Mutex<VecDeque<GiftEvent>>,
    high_water: usize,
}

impl GiftBuffer {
    pub fn new(high_water: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            high_water,
        }
    }

    fn push(&self, event: GiftEvent) -> Result<(), AckError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.high_water {
            return Err(AckError::GIFT_BUFFER_OVERLOADED);
        }
        queue.push_back(event);
        Ok(())
    }

    fn drain_batch(&self, max_batch: usize) -> Vec<GiftEvent> {
        let mut queue = self.queue.lock();
        let take = max_batch.min(queue.len());
        queue.drain(..take).collect()
    }

    fn requeue_front(&self, events: Vec<GiftEvent>) {
        let mut queue = self.queue.lock();
        for event in events.into_iter().rev() {
            queue.push_front(event);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validates, rate-limits, optimistically broadcasts, and enqueues a gift
/// for batched persistence. Returns before the backend write-through has
/// happened — the caller's ack only promises the room saw it.
pub async fn handle_gift_send(
    redis: &RedisClient,
    config: &AppConfig,
    buffer: &GiftBuffer,
    socket: &SocketRef,
    room_id: &str,
    from_user_id: UserId,
    payload: GiftSendPayload,
) -> Result<Uuid, AckError> {
    use validator::Validate;
    payload.validate().map_err(|_| AckError::INVALID_PAYLOAD)?;

    let allowed = redis
        .rate_limit_check(&rate_limit_key(from_user_id), config.gift_rate_limit, config.gift_rate_window_secs)
        .await?;
    if !allowed {
        return Err(AckError::TOO_MANY_GIFTS);
    }

    let event = GiftEvent {
        transaction_id: Uuid::new_v4(),
        room_id: room_id.to_string(),
        from_user_id,
        to_user_id: payload.to_user_id,
        gift_id: payload.gift_id,
        quantity: payload.quantity,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };

    let broadcast = GiftBroadcast {
        transaction_id: event.transaction_id,
        from_user_id: event.from_user_id,
        to_user_id: event.to_user_id,
        gift_id: &event.gift_id,
        quantity: event.quantity,
    };
    let _ = socket.to(room_id.to_string()).emit("gift:received", &broadcast);

    let transaction_id = event.transaction_id;
    buffer.push(event)?;
    Ok(transaction_id)
}

/// Periodic flusher: drains up to `max_batch` events every
/// `flush_interval`, posts them to the business backend, and re-queues the
/// whole batch only on a transport-level failure. Call `flush_once` again
/// from the shutdown path to drain what remains within a bounded number of
/// attempts.
pub fn spawn_gift_flusher(
    buffer: Arc<GiftBuffer>,
    biz: InternalApiClient,
    flush_interval: Duration,
    max_batch: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(flush_interval).await;
            flush_once(&buffer, &biz, max_batch).await;
        }
    })
}

async fn flush_once(buffer: &GiftBuffer, biz: &InternalApiClient, max_batch: usize) {
    let batch = buffer.drain_batch(max_batch);
    if batch.is_empty() {
        return;
    }

    match biz.post::<_, GiftBatchResponse>("/internal/v1/gifts/batch", &batch).await {
        Ok(response) => {
            let rejected = response.results.iter().filter(|r| !r.accepted).count();
            if rejected > 0 {
                tracing::warn!(rejected, "backend rejected gifts in batch, not retrying");
            }
            metrics::counter!("gifts_persisted_total").increment((batch.len() - rejected) as u64);
        }
        Err(e) => {
            tracing::warn!(error = %e, batch_size = batch.len(), "gift batch persistence failed, re-queueing");
            buffer.requeue_front(batch);
        }
    }
}

/// Drains the buffer during graceful shutdown, bounded so a persistently
/// failing backend can't hang the shutdown sequence forever.
pub async fn drain_on_shutdown(buffer: &GiftBuffer, biz: &InternalApiClient, max_batch: usize, max_attempts: usize) {
    for _ in 0..max_attempts {
        if buffer.is_empty() {
            break;
        }
        flush_once(buffer, biz, max_batch).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> GiftEvent {
        GiftEvent {
            transaction_id: Uuid::new_v4(),
            room_id: "room-1".into(),
            from_user_id: 1,
            to_user_id: None,
            gift_id: "rose".into(),
            quantity: 1,
            timestamp: 0,
        }
    }

    #[test]
    fn push_rejects_above_high_water() {
        let buffer = GiftBuffer::new(1);
        assert!(buffer.push(sample_event()).is_ok());
        assert_eq!(buffer.push(sample_event()), Err(AckError::GIFT_BUFFER_OVERLOADED));
    }

    #[test]
    fn drain_batch_respects_max() {
        let buffer = GiftBuffer::new(10);
        for _ in 0..5 {
            buffer.push(sample_event()).unwrap();
        }
        let batch = buffer.drain_batch(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(buffer.len(), 2);
    }
}
