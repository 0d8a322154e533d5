use serde::{Deserialize, Serialize};
use socketioxide::extract::SocketRef;

use skyroom_shared::clients::RedisClient;

use crate::config::AppConfig;
use crate::error::AckError;
use crate::registry::UserId;

#[derive(Debug, Deserialize, validator::Validate)]
pub struct ChatMessagePayload {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ChatMessageBroadcast<'a> {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub text: &'a str,
    pub timestamp: i64,
}

/// Fixed-window rate limit shared across every socket a user has open,
/// per §4.7: `chat:ratelimit:{userId}`, window from config.
fn rate_limit_key(user_id: UserId) -> String {
    format!("chat:ratelimit:{user_id}")
}

pub async fn handle_chat_message(
    redis: &RedisClient,
    config: &AppConfig,
    socket: &SocketRef,
    room_id: &str,
    user_id: UserId,
    payload: ChatMessagePayload,
) -> Result<(), AckError> {
    use validator::Validate;
    payload.validate().map_err(|_| AckError::INVALID_PAYLOAD)?;

    let allowed = redis
        .rate_limit_check(&rate_limit_key(user_id), config.chat_rate_limit, config.chat_rate_window_secs)
        .await?;
    if !allowed {
        return Err(AckError::TOO_MANY_MESSAGES);
    }

    let broadcast = ChatMessageBroadcast {
        user_id,
        text: &payload.text,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    let _ = socket.to(room_id.to_string()).emit("chat:message", &broadcast);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_key_is_per_user() {
        assert_eq!(rate_limit_key(42), "chat:ratelimit:42");
    }
}
