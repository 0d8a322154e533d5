use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socketioxide::extract::{AckSender, Data, SocketRef, State};

use crate::error::AckError;
use crate::registry::UserId;
use crate::state::AppState;

use super::payloads::{RoomJoinPayload, RoomLeavePayload};

#[derive(Debug, Deserialize)]
struct UserProfileLite {
    id: UserId,
    name: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct SeatUser {
    id: UserId,
    name: String,
    #[serde(rename = "avatarUrl")]
    avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct SeatView {
    #[serde(rename = "seatIndex")]
    seat_index: u8,
    user: Option<SeatUser>,
    #[serde(rename = "isMuted")]
    is_muted: bool,
}

#[derive(Debug, Serialize)]
pub struct RoomJoinAck {
    #[serde(rename = "roomId")]
    room_id: String,
    seats: Vec<SeatView>,
    #[serde(rename = "lockedSeats")]
    locked_seats: Vec<u8>,
    #[serde(rename = "participantCount")]
    participant_count: u32,
}

#[derive(Debug, Serialize)]
struct PresenceEvent {
    #[serde(rename = "userId")]
    user_id: UserId,
}

/// `room:join`: creates or reuses the room's router, registers membership
/// in the socket.io room and the client registry, seeds the owner cache
/// when this user is the declared owner, broadcasts `room:user-joined` to
/// the rest of the room, and acks with the BL-007 seat-snapshot shape
/// (seats carry the occupant's `{id, name, avatarUrl}`, not just an id —
/// see DESIGN.md for why this shape won over the older flat-id form).
pub async fn handle_room_join(
    socket: SocketRef,
    Data(payload): Data<RoomJoinPayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    use validator::Validate;
    if payload.validate().is_err() {
        ack.send(&AckError::INVALID_PAYLOAD.as_str()).ok();
        return;
    }

    let Some(entry) = state.registry.get_by_conn_id(&socket.id.to_string()) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let user_id = entry.user_id;

    let room = match state.room_manager.get_or_create_room(&payload.room_id).await {
        Ok(room) => room,
        Err(e) => {
            tracing::error!(error = %e, "failed to create room");
            ack.send(&AckError::INTERNAL.as_str()).ok();
            return;
        }
    };

    socket.join(payload.room_id.clone());
    state.registry.set_room(&socket.id.to_string(), &payload.room_id);
    state.room_manager.on_join(&room, user_id, None).await;

    let seats = match state.seats.snapshot(&payload.room_id, room.seat_count).await {
        Ok(seats) => seats,
        Err(e) => {
            ack.send(&e.as_str()).ok();
            return;
        }
    };
    let locked = state.seats.locked_seats(&payload.room_id).await.unwrap_or_default();

    let occupant_ids: Vec<UserId> = seats.iter().filter_map(|s| s.user_id).collect();
    let profiles = fetch_profiles(&state, &occupant_ids).await;

    let seat_views = seats
        .into_iter()
        .map(|s| SeatView {
            seat_index: s.seat_index,
            is_muted: s.is_muted,
            user: s.user_id.map(|id| {
                profiles
                    .iter()
                    .find(|p| p.id == id)
                    .map(|p| SeatUser {
                        id,
                        name: p.name.clone(),
                        avatar_url: p.avatar_url.clone(),
                    })
                    .unwrap_or(SeatUser {
                        id,
                        name: String::new(),
                        avatar_url: None,
                    })
            }),
        })
        .collect();

    let _ = socket.to(payload.room_id.clone()).emit("room:user-joined", &PresenceEvent { user_id });

    ack.send(&RoomJoinAck {
        room_id: payload.room_id,
        seats: seat_views,
        locked_seats: locked,
        participant_count: room.participant_count(),
    })
    .ok();
}

async fn fetch_profiles(state: &AppState, ids: &[UserId]) -> Vec<UserProfileLite> {
    if ids.is_empty() {
        return Vec::new();
    }
    state
        .biz_client
        .post::<_, Vec<UserProfileLite>>("/internal/v1/users/profiles", &ids)
        .await
        .unwrap_or_default()
}

/// `room:leave`: the inverse of join, run from an explicit client request
/// rather than disconnect (disconnect has its own cleanup path in
/// `dispatcher.rs` that additionally tears down media resources).
pub async fn handle_room_leave(
    socket: SocketRef,
    Data(payload): Data<RoomLeavePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Some(entry) = state.registry.get_by_conn_id(&socket.id.to_string()) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let user_id = entry.user_id;

    let Some(room) = state.room_manager.get(&payload.room_id) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };

    let _ = state.seats.leave(&payload.room_id, user_id).await;
    socket.leave(payload.room_id.clone());
    state.registry.set_room(&socket.id.to_string(), "");
    state.room_manager.on_leave(&room).await;

    let _ = socket.to(payload.room_id.clone()).emit("room:user-left", &PresenceEvent { user_id });
    ack.send(&serde_json::json!({ "ok": true })).ok();
}

/// `user:get-room`: a side-effect-free query returning the caller's
/// current room mapping, or `null` if they aren't in one — deliberately
/// the simplest reading of an otherwise-undocumented event (§9 Open
/// Question), since nothing else in the spec implies it mutates state.
pub async fn handle_user_get_room(socket: SocketRef, State(state): State<Arc<AppState>>, ack: AckSender) {
    let Some(entry) = state.registry.get_by_conn_id(&socket.id.to_string()) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let room_id = state.redis.get(&format!("user:{}:room", entry.user_id)).await.ok().flatten();
    ack.send(&serde_json::json!({ "roomId": room_id })).ok();
}
