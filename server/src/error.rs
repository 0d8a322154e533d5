use serde::Serialize;

/// The stable string error taxonomy returned to clients via ack
/// callbacks (§7). Handler bodies build these directly or propagate one
/// via `?` from `redis`/`reqwest`/`anyhow`, all of which collapse to
/// `InternalServerError` so only taxonomy strings ever cross the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckError(pub &'static str);

impl AckError {
    pub const INVALID_PAYLOAD: AckError = AckError("Invalid payload");
    pub const AUTH_REQUIRED: AckError = AckError("Authentication required");
    pub const INVALID_CREDENTIALS: AckError = AckError("Invalid credentials");
    pub const AUTH_FAILED: AckError = AckError("Authentication failed");
    pub const NOT_AUTHORIZED: AckError = AckError("Not authorized");
    pub const AUTHORIZATION_CHECK_FAILED: AckError = AckError("Authorization check failed");
    pub const ROOM_NOT_FOUND: AckError = AckError("Room not found");
    pub const TRANSPORT_NOT_FOUND: AckError = AckError("Transport not found");
    pub const CONSUMER_NOT_FOUND: AckError = AckError("Consumer not found");
    pub const SEAT_INVALID: AckError = AckError("SEAT_INVALID");
    pub const SEAT_LOCKED: AckError = AckError("SEAT_LOCKED");
    pub const SEAT_TAKEN: AckError = AckError("SEAT_TAKEN");
    pub const NOT_SEATED: AckError = AckError("NOT_SEATED");
    pub const SEAT_ALREADY_LOCKED: AckError = AckError("SEAT_ALREADY_LOCKED");
    pub const SEAT_NOT_LOCKED: AckError = AckError("SEAT_NOT_LOCKED");
    pub const INVITE_ALREADY_PENDING: AckError = AckError("Invite already pending for this seat");
    pub const NO_PENDING_INVITE: AckError = AckError("No pending invite found");
    pub const SEAT_NO_LONGER_AVAILABLE: AckError = AckError("Seat is no longer available");
    pub const CANNOT_CONSUME: AckError = AckError("Cannot consume");
    pub const PRODUCE_FAILED: AckError = AckError("Produce failed");
    pub const CONNECT_FAILED: AckError = AckError("Connect failed");
    pub const RESUME_FAILED: AckError = AckError("Resume failed");
    pub const CONSUME_FAILED: AckError = AckError("Consume failed");
    pub const TOO_MANY_MESSAGES: AckError = AckError("Too many messages");
    pub const TOO_MANY_GIFTS: AckError = AckError("Too many gifts, please slow down");
    pub const GIFT_BUFFER_OVERLOADED: AckError = AckError("overloaded");
    pub const INTERNAL: AckError = AckError("Internal server error");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for AckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<redis::RedisError> for AckError {
    fn from(e: redis::RedisError) -> Self {
        tracing::error!(error = %e, "redis error in handler");
        AckError::INTERNAL
    }
}

impl From<reqwest::Error> for AckError {
    fn from(e: reqwest::Error) -> Self {
        tracing::error!(error = %e, "http error in handler");
        AckError::INTERNAL
    }
}

impl From<anyhow::Error> for AckError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(error = %e, "internal error in handler");
        AckError::INTERNAL
    }
}

impl From<skyroom_shared::clients::InternalApiError> for AckError {
    fn from(e: skyroom_shared::clients::InternalApiError) -> Self {
        tracing::error!(error = %e, "internal API call failed");
        AckError::INTERNAL
    }
}

/// Shape of every ack payload on failure: `{error: "..."}`, matching the
/// literal error contract in §7.
#[derive(Debug, Serialize)]
pub struct AckErrorPayload {
    pub error: &'static str,
}

impl From<AckError> for AckErrorPayload {
    fn from(e: AckError) -> Self {
        Self { error: e.as_str() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_errors_collapse_to_internal() {
        let redis_err = redis::RedisError::from((redis::ErrorKind::IoError, "boom"));
        let ack: AckError = redis_err.into();
        assert_eq!(ack, AckError::INTERNAL);
    }
}
