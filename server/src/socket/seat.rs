use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use socketioxide::extract::{AckSender, Data, SocketRef, State};

use crate::error::AckError;
use crate::media::Room;
use crate::registry::UserId;
use crate::state::AppState;

use super::payloads::{
    SeatAssignPayload, SeatInvitePayload, SeatInviteResponsePayload, SeatLockPayload, SeatMutePayload,
    SeatTakePayload,
};

#[derive(Debug, Serialize)]
struct SeatChanged {
    #[serde(rename = "seatIndex")]
    seat_index: u8,
    #[serde(rename = "userId")]
    user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
struct SeatMuted {
    #[serde(rename = "seatIndex")]
    seat_index: u8,
    muted: bool,
}

#[derive(Debug, Serialize)]
struct SeatLocked {
    #[serde(rename = "seatIndex")]
    seat_index: u8,
}

#[derive(Debug, Deserialize)]
struct RoomOwnerResponse {
    #[serde(rename = "ownerId")]
    owner_id: UserId,
}

/// Owner verification per §4.6: check the per-room in-process cache first,
/// then the Redis-level cache (`room:{id}:owner`, TTL `owner_cache_ttl_secs`),
/// then fall back to the backend's get-room endpoint under a 5s timeout,
/// caching whatever it returns before answering.
async fn verify_owner(state: &AppState, room: &Room, user_id: UserId) -> Result<(), AckError> {
    if let Some(cached) = *room.owner_id.lock().await {
        return if cached == user_id { Ok(()) } else { Err(AckError::NOT_AUTHORIZED) };
    }

    let owner_key = format!("room:{}:owner", room.room_id);
    if let Ok(Some(raw)) = state.redis.get(&owner_key).await {
        if let Ok(owner_id) = raw.parse::<UserId>() {
            *room.owner_id.lock().await = Some(owner_id);
            return if owner_id == user_id { Ok(()) } else { Err(AckError::NOT_AUTHORIZED) };
        }
    }

    let url = format!("/internal/v1/rooms/{}", room.room_id);
    let fetch = state.biz_client.get::<RoomOwnerResponse>(&url);
    let response = tokio::time::timeout(Duration::from_secs(5), fetch)
        .await
        .map_err(|_| AckError::AUTHORIZATION_CHECK_FAILED)?
        .map_err(|_| AckError::AUTHORIZATION_CHECK_FAILED)?;

    *room.owner_id.lock().await = Some(response.owner_id);
    let _ = state
        .redis
        .set(&owner_key, &response.owner_id.to_string(), state.config.owner_cache_ttl_secs)
        .await;

    if response.owner_id == user_id {
        Ok(())
    } else {
        Err(AckError::NOT_AUTHORIZED)
    }
}

fn current_user(state: &AppState, socket: &SocketRef) -> Result<UserId, AckError> {
    state
        .registry
        .get_by_conn_id(&socket.id.to_string())
        .map(|e| e.user_id)
        .ok_or(AckError::INTERNAL)
}

fn current_room(state: &AppState, user_id: UserId, socket: &SocketRef) -> Result<Arc<Room>, AckError> {
    let entry = state.registry.get_by_conn_id(&socket.id.to_string()).ok_or(AckError::INTERNAL)?;
    let room_id = entry.room().ok_or(AckError::ROOM_NOT_FOUND)?;
    let _ = user_id;
    state.room_manager.get(&room_id).ok_or(AckError::ROOM_NOT_FOUND)
}

pub async fn handle_seat_take(
    socket: SocketRef,
    Data(payload): Data<SeatTakePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    use validator::Validate;
    if payload.validate().is_err() {
        ack.send(&AckError::INVALID_PAYLOAD.as_str()).ok();
        return;
    }
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };

    match state.seats.take(&room.room_id, payload.seat_index, user_id, room.seat_count).await {
        Ok(idx) => {
            let _ = socket
                .to(room.room_id.clone())
                .emit("seat:changed", &SeatChanged { seat_index: idx, user_id: Some(user_id) });
            ack.send(&serde_json::json!({ "seatIndex": idx })).ok();
        }
        Err(e) => {
            ack.send(&e.as_str()).ok();
        }
    }
}

pub async fn handle_seat_leave(socket: SocketRef, State(state): State<Arc<AppState>>, ack: AckSender) {
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };

    match state.seats.leave(&room.room_id, user_id).await {
        Ok(idx) => {
            let _ = socket
                .to(room.room_id.clone())
                .emit("seat:changed", &SeatChanged { seat_index: idx, user_id: None });
            ack.send(&serde_json::json!({ "ok": true })).ok();
        }
        Err(e) => {
            ack.send(&e.as_str()).ok();
        }
    }
}

pub async fn handle_seat_assign(
    socket: SocketRef,
    Data(payload): Data<SeatAssignPayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    use validator::Validate;
    if payload.validate().is_err() {
        ack.send(&AckError::INVALID_PAYLOAD.as_str()).ok();
        return;
    }
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    if let Err(e) = verify_owner(&state, &room, user_id).await {
        ack.send(&e.as_str()).ok();
        return;
    }

    match state
        .seats
        .assign(&room.room_id, payload.seat_index, payload.target_user_id, room.seat_count)
        .await
    {
        Ok(idx) => {
            let _ = socket.to(room.room_id.clone()).emit(
                "seat:changed",
                &SeatChanged { seat_index: idx, user_id: Some(payload.target_user_id) },
            );
            ack.send(&serde_json::json!({ "seatIndex": idx })).ok();
        }
        Err(e) => {
            ack.send(&e.as_str()).ok();
        }
    }
}

pub async fn handle_seat_mute(
    socket: SocketRef,
    Data(payload): Data<SeatMutePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    if let Err(e) = verify_owner(&state, &room, user_id).await {
        ack.send(&e.as_str()).ok();
        return;
    }

    match state.seats.set_mute(&room.room_id, payload.seat_index, payload.muted).await {
        Ok(true) => {
            let _ = socket
                .to(room.room_id.clone())
                .emit("seat:muted", &SeatMuted { seat_index: payload.seat_index, muted: payload.muted });
            ack.send(&serde_json::json!({ "ok": true })).ok();
        }
        Ok(false) => {
            ack.send(&AckError::NOT_SEATED.as_str()).ok();
        }
        Err(_) => {
            ack.send(&AckError::INTERNAL.as_str()).ok();
        }
    }
}

pub async fn handle_seat_lock(
    socket: SocketRef,
    Data(payload): Data<SeatLockPayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    if let Err(e) = verify_owner(&state, &room, user_id).await {
        ack.send(&e.as_str()).ok();
        return;
    }

    match state.seats.lock(&room.room_id, payload.seat_index).await {
        Ok(kicked) => {
            if let Some(kicked_id) = kicked {
                let _ = socket.to(room.room_id.clone()).emit(
                    "seat:changed",
                    &SeatChanged { seat_index: payload.seat_index, user_id: None },
                );
                let _ = kicked_id;
            }
            let _ = socket
                .to(room.room_id.clone())
                .emit("seat:locked", &SeatLocked { seat_index: payload.seat_index });
            ack.send(&serde_json::json!({ "ok": true })).ok();
        }
        Err(e) => {
            ack.send(&e.as_str()).ok();
        }
    }
}

pub async fn handle_seat_unlock(
    socket: SocketRef,
    Data(payload): Data<SeatLockPayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    if let Err(e) = verify_owner(&state, &room, user_id).await {
        ack.send(&e.as_str()).ok();
        return;
    }

    match state.seats.unlock(&room.room_id, payload.seat_index).await {
        Ok(()) => {
            let _ = socket
                .to(room.room_id.clone())
                .emit("seat:unlocked", &SeatLocked { seat_index: payload.seat_index });
            ack.send(&serde_json::json!({ "ok": true })).ok();
        }
        Err(e) => {
            ack.send(&e.as_str()).ok();
        }
    }
}

pub async fn handle_seat_invite(
    socket: SocketRef,
    Data(payload): Data<SeatInvitePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    if let Err(e) = verify_owner(&state, &room, user_id).await {
        ack.send(&e.as_str()).ok();
        return;
    }

    match state.invites.invite(&room.room_id, payload.seat_index, payload.target_user_id).await {
        Ok(()) => ack.send(&serde_json::json!({ "ok": true })).ok(),
        Err(e) => ack.send(&e.as_str()).ok(),
    };
}

pub async fn handle_seat_invite_accept(
    socket: SocketRef,
    Data(payload): Data<SeatInviteResponsePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };

    if let Err(e) = state.invites.accept(&room.room_id, payload.seat_index, user_id).await {
        ack.send(&e.as_str()).ok();
        return;
    }

    match state.seats.take(&room.room_id, payload.seat_index, user_id, room.seat_count).await {
        Ok(idx) => {
            let _ = socket
                .to(room.room_id.clone())
                .emit("seat:changed", &SeatChanged { seat_index: idx, user_id: Some(user_id) });
            ack.send(&serde_json::json!({ "seatIndex": idx })).ok();
        }
        Err(_) => {
            ack.send(&AckError::SEAT_NO_LONGER_AVAILABLE.as_str()).ok();
        }
    }
}

pub async fn handle_seat_invite_decline(
    socket: SocketRef,
    Data(payload): Data<SeatInviteResponsePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, user_id, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };

    match state.invites.decline(&room.room_id, payload.seat_index, user_id).await {
        Ok(()) => ack.send(&serde_json::json!({ "ok": true })).ok(),
        Err(e) => ack.send(&e.as_str()).ok(),
    };
}
