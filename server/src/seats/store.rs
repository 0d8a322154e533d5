use serde::{Deserialize, Serialize};
use skyroom_shared::clients::RedisClient;

use crate::error::AckError;

use super::scripts::{classify_script_error, scripts};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatOccupant {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatSlot {
    #[serde(rename = "seatIndex")]
    pub seat_index: u8,
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
    #[serde(rename = "isMuted")]
    pub is_muted: bool,
}

fn ack_error_for(code: &str) -> AckError {
    match code {
        "SEAT_INVALID" => AckError::SEAT_INVALID,
        "SEAT_LOCKED" => AckError::SEAT_LOCKED,
        "SEAT_TAKEN" => AckError::SEAT_TAKEN,
        "NOT_SEATED" => AckError::NOT_SEATED,
        "ALREADY_LOCKED" => AckError::SEAT_ALREADY_LOCKED,
        "NOT_LOCKED" => AckError::SEAT_NOT_LOCKED,
        _ => AckError::INTERNAL,
    }
}

/// Authoritative seat state lives entirely in Redis, mutated only through
/// the atomic scripts in `scripts.rs`; this struct is a thin typed
/// wrapper, never a cache of truth (per §3's ownership note: in-memory
/// state is an emit-trigger only).
#[derive(Clone)]
pub struct SeatStore {
    redis: RedisClient,
}

impl SeatStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn seats_key(room_id: &str) -> String {
        format!("room:{room_id}:seats")
    }
    fn locked_key(room_id: &str) -> String {
        format!("room:{room_id}:locked_seats")
    }
    fn user_prefix(room_id: &str) -> String {
        format!("room:{room_id}:seat:user:")
    }

    pub async fn take(&self, room_id: &str, seat_index: u8, user_id: i64, seat_count: u8) -> Result<u8, AckError> {
        let seats_key = Self::seats_key(room_id);
        let locked_key = Self::locked_key(room_id);
        let prefix = Self::user_prefix(room_id);
        let result: Result<String, redis::RedisError> = self
            .redis
            .eval_script(
                &scripts().take,
                &[&seats_key, &locked_key],
                &[seat_index.to_string(), user_id.to_string(), seat_count.to_string(), prefix],
            )
            .await;
        match result {
            Ok(idx) => idx.parse().map_err(|_| AckError::INTERNAL),
            Err(e) => Err(ack_error_for(classify_script_error(&e))),
        }
    }

    pub async fn leave(&self, room_id: &str, user_id: i64) -> Result<u8, AckError> {
        let seats_key = Self::seats_key(room_id);
        let prefix = Self::user_prefix(room_id);
        let result: Result<String, redis::RedisError> = self
            .redis
            .eval_script(&scripts().leave, &[&seats_key], &[user_id.to_string(), prefix])
            .await;
        match result {
            Ok(idx) => idx.parse().map_err(|_| AckError::INTERNAL),
            Err(e) => Err(ack_error_for(classify_script_error(&e))),
        }
    }

    pub async fn assign(
        &self,
        room_id: &str,
        seat_index: u8,
        target_user_id: i64,
        seat_count: u8,
    ) -> Result<u8, AckError> {
        let seats_key = Self::seats_key(room_id);
        let locked_key = Self::locked_key(room_id);
        let prefix = Self::user_prefix(room_id);
        let result: Result<String, redis::RedisError> = self
            .redis
            .eval_script(
                &scripts().assign,
                &[&seats_key, &locked_key],
                &[
                    seat_index.to_string(),
                    target_user_id.to_string(),
                    seat_count.to_string(),
                    prefix,
                ],
            )
            .await;
        match result {
            Ok(idx) => idx.parse().map_err(|_| AckError::INTERNAL),
            Err(e) => Err(ack_error_for(classify_script_error(&e))),
        }
    }

    pub async fn set_mute(&self, room_id: &str, seat_index: u8, muted: bool) -> Result<bool, AckError> {
        let seats_key = Self::seats_key(room_id);
        let result: Result<i64, redis::RedisError> = self
            .redis
            .eval_script(
                &scripts().set_mute,
                &[&seats_key],
                &[seat_index.to_string(), if muted { "1".into() } else { "0".into() }],
            )
            .await;
        match result {
            Ok(1) => Ok(true),
            Ok(_) => Ok(false),
            Err(_) => Err(AckError::INTERNAL),
        }
    }

    /// Returns the evicted occupant's user id, if any.
    pub async fn lock(&self, room_id: &str, seat_index: u8) -> Result<Option<i64>, AckError> {
        let seats_key = Self::seats_key(room_id);
        let locked_key = Self::locked_key(room_id);
        let prefix = Self::user_prefix(room_id);
        let result: Result<String, redis::RedisError> = self
            .redis
            .eval_script(&scripts().lock, &[&seats_key, &locked_key], &[seat_index.to_string(), prefix])
            .await;
        match result {
            Ok(kicked) if kicked.is_empty() => Ok(None),
            Ok(kicked) => kicked.parse().map(Some).map_err(|_| AckError::INTERNAL),
            Err(e) => Err(ack_error_for(classify_script_error(&e))),
        }
    }

    pub async fn unlock(&self, room_id: &str, seat_index: u8) -> Result<(), AckError> {
        let locked_key = Self::locked_key(room_id);
        let result: Result<i64, redis::RedisError> = self
            .redis
            .eval_script(&scripts().unlock, &[&locked_key], &[seat_index.to_string()])
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(ack_error_for(classify_script_error(&e))),
        }
    }

    /// Full seat snapshot for `room:join`: all seats with nulls for empty
    /// positions, per the BL-007 shape chosen in DESIGN.md.
    pub async fn snapshot(&self, room_id: &str, seat_count: u8) -> Result<Vec<SeatSlot>, AckError> {
        let seats_key = Self::seats_key(room_id);
        let raw: std::collections::HashMap<String, String> = {
            let mut conn = self.redis.connection();
            redis::AsyncCommands::hgetall(&mut conn, &seats_key)
                .await
                .map_err(|_| AckError::INTERNAL)?
        };

        let mut occupants = std::collections::HashMap::new();
        for (idx, raw_val) in raw {
            if let (Ok(idx), Ok(occupant)) = (idx.parse::<u8>(), serde_json::from_str::<SeatOccupant>(&raw_val)) {
                occupants.insert(idx, occupant);
            }
        }

        Ok((0..seat_count)
            .map(|i| match occupants.get(&i) {
                Some(o) => SeatSlot {
                    seat_index: i,
                    user_id: Some(o.user_id),
                    is_muted: o.muted,
                },
                None => SeatSlot {
                    seat_index: i,
                    user_id: None,
                    is_muted: false,
                },
            })
            .collect())
    }

    pub async fn locked_seats(&self, room_id: &str) -> Result<Vec<u8>, AckError> {
        let locked_key = Self::locked_key(room_id);
        let raw: Vec<String> = {
            let mut conn = self.redis.connection();
            redis::AsyncCommands::smembers(&mut conn, &locked_key)
                .await
                .map_err(|_| AckError::INTERNAL)?
        };
        Ok(raw.into_iter().filter_map(|s| s.parse().ok()).collect())
    }

    pub async fn clear_room(&self, room_id: &str) {
        let _ = self.redis.del(&Self::seats_key(room_id)).await;
        let _ = self.redis.del(&Self::locked_key(room_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_script_codes_to_ack_errors() {
        assert_eq!(ack_error_for("SEAT_LOCKED"), AckError::SEAT_LOCKED);
        assert_eq!(ack_error_for("NOT_LOCKED"), AckError::SEAT_NOT_LOCKED);
        assert_eq!(ack_error_for("nonsense"), AckError::INTERNAL);
    }
}
