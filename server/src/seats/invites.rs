use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use skyroom_shared::clients::RedisClient;

use crate::error::AckError;
use crate::registry::{ClientRegistry, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingInvite {
    #[serde(rename = "targetUserId")]
    target_user_id: UserId,
    #[serde(rename = "issuedAt")]
    issued_at: i64,
}

#[derive(Debug, Clone, Serialize)]
struct InviteExpired {
    #[serde(rename = "seatIndex")]
    seat_index: u8,
}

#[derive(Debug, Clone, Serialize)]
struct InvitePayload {
    #[serde(rename = "roomId")]
    room_id: String,
    #[serde(rename = "seatIndex")]
    seat_index: u8,
}

/// One pending invite per (room, seat). Redis holds the authoritative
/// record with a TTL so the invite still expires even if this process
/// restarts; the local timer only drives the user-facing `invite:expired`
/// notification and is a no-op if the Redis record already moved on
/// (accepted, declined, or superseded) by the time it fires.
pub struct InviteStore {
    redis: RedisClient,
    registry: Arc<ClientRegistry>,
    ttl_secs: u64,
    timers: DashMap<(String, u8), tokio::task::JoinHandle<()>>,
}

impl InviteStore {
    pub fn new(redis: RedisClient, registry: Arc<ClientRegistry>, ttl_secs: u64) -> Self {
        Self {
            redis,
            registry,
            ttl_secs,
            timers: DashMap::new(),
        }
    }

    fn key(room_id: &str, seat_index: u8) -> String {
        format!("room:{room_id}:invite:{seat_index}")
    }

    pub async fn invite(&self, room_id: &str, seat_index: u8, target_user_id: UserId) -> Result<(), AckError> {
        let key = Self::key(room_id, seat_index);
        if self.redis.exists(&key).await? {
            return Err(AckError::INVITE_ALREADY_PENDING);
        }

        let record = PendingInvite {
            target_user_id,
            issued_at: chrono::Utc::now().timestamp_millis(),
        };
        let serialized = serde_json::to_string(&record).map_err(|_| AckError::INTERNAL)?;
        self.redis.set(&key, &serialized, self.ttl_secs).await?;

        self.emit_to_user(target_user_id, "seat:invite", &InvitePayload {
            room_id: room_id.to_string(),
            seat_index,
        });

        self.arm_expiry(room_id.to_string(), seat_index, target_user_id);
        Ok(())
    }

    pub async fn accept(&self, room_id: &str, seat_index: u8, user_id: UserId) -> Result<(), AckError> {
        self.resolve(room_id, seat_index, user_id).await
    }

    pub async fn decline(&self, room_id: &str, seat_index: u8, user_id: UserId) -> Result<(), AckError> {
        self.resolve(room_id, seat_index, user_id).await
    }

    async fn resolve(&self, room_id: &str, seat_index: u8, user_id: UserId) -> Result<(), AckError> {
        let key = Self::key(room_id, seat_index);
        let Some(raw) = self.redis.get(&key).await? else {
            return Err(AckError::NO_PENDING_INVITE);
        };
        let record: PendingInvite = serde_json::from_str(&raw).map_err(|_| AckError::INTERNAL)?;
        if record.target_user_id != user_id {
            return Err(AckError::NO_PENDING_INVITE);
        }
        self.redis.del(&key).await?;
        self.cancel_timer(room_id, seat_index);
        Ok(())
    }

    fn arm_expiry(&self, room_id: String, seat_index: u8, target_user_id: UserId) {
        let redis = self.redis.clone();
        let registry = self.registry.clone();
        let ttl = Duration::from_secs(self.ttl_secs);
        let timer_room = room_id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let key = Self::key(&room_id, seat_index);

            // Still the same invite? A newer one would have a different
            // issuedAt, but simplest and race-free is: if the key is gone,
            // someone already resolved it — nothing to do.
            let Ok(Some(raw)) = redis.get(&key).await else {
                return;
            };
            let Ok(record) = serde_json::from_str::<PendingInvite>(&raw) else {
                return;
            };
            if record.target_user_id != target_user_id {
                return;
            }

            let _ = redis.del(&key).await;
            for conn in registry.get_by_user_id(target_user_id) {
                let _ = conn.socket.emit("seat:invite:expired", &InviteExpired { seat_index });
            }
        });

        self.timers.insert((timer_room, seat_index), handle);
    }

    fn cancel_timer(&self, room_id: &str, seat_index: u8) {
        if let Some((_, handle)) = self.timers.remove(&(room_id.to_string(), seat_index)) {
            handle.abort();
        }
    }

    fn emit_to_user(&self, user_id: UserId, event: &'static str, payload: &InvitePayload) {
        for conn in self.registry.get_by_user_id(user_id) {
            let _ = conn.socket.emit(event, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_key_is_namespaced_per_seat() {
        assert_eq!(InviteStore::key("room-1", 4), "room:room-1:invite:4");
    }
}
