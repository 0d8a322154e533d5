use std::sync::Arc;

use serde::Serialize;
use socketioxide::extract::{AckSender, Data, SocketRef, State};

use crate::error::AckError;
use crate::media::{speaker, Room};
use crate::registry::{MediaKind, TransportRole, UserId};
use crate::state::AppState;

use super::payloads::{
    AudioConsumePayload, AudioProducePayload, ConsumerResumePayload, TransportConnectPayload, TransportCreatePayload,
};

#[derive(Debug, Serialize)]
struct ProducerClosed {
    #[serde(rename = "producerId")]
    producer_id: String,
}

fn current_user(state: &AppState, socket: &SocketRef) -> Result<UserId, AckError> {
    state
        .registry
        .get_by_conn_id(&socket.id.to_string())
        .map(|e| e.user_id)
        .ok_or(AckError::INTERNAL)
}

fn current_room(state: &AppState, socket: &SocketRef) -> Result<Arc<Room>, AckError> {
    let entry = state.registry.get_by_conn_id(&socket.id.to_string()).ok_or(AckError::INTERNAL)?;
    let room_id = entry.room().ok_or(AckError::ROOM_NOT_FOUND)?;
    state.room_manager.get(&room_id).ok_or(AckError::ROOM_NOT_FOUND)
}

fn parse_role(raw: &str) -> Option<TransportRole> {
    match raw {
        "send" => Some(TransportRole::Send),
        "receive" | "recv" => Some(TransportRole::Receive),
        _ => None,
    }
}

pub async fn handle_transport_create(
    socket: SocketRef,
    Data(payload): Data<TransportCreatePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(room) = current_room(&state, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    let Some(role) = parse_role(&payload.role) else {
        ack.send(&AckError::INVALID_PAYLOAD.as_str()).ok();
        return;
    };
    let Some(worker) = state.worker_pool.get(room.worker_id) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };

    match worker.create_transport(&room.router_id, &payload.role).await {
        Ok(result) => {
            if let Some(transport_id) = result.get("transportId").and_then(|v| v.as_str()) {
                state.registry.add_transport(&socket.id.to_string(), transport_id.to_string(), role);
            }
            ack.send(&result).ok();
        }
        Err(e) => {
            tracing::warn!(error = %e, "transport create failed");
            ack.send(&AckError::TRANSPORT_NOT_FOUND.as_str()).ok();
        }
    }
}

pub async fn handle_transport_connect(
    socket: SocketRef,
    Data(payload): Data<TransportConnectPayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(room) = current_room(&state, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    let Some(worker) = state.worker_pool.get(room.worker_id) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };

    match worker.connect_transport(&payload.transport_id, payload.dtls_parameters).await {
        Ok(()) => {
            ack.send(&serde_json::json!({ "ok": true })).ok();
        }
        Err(e) => {
            tracing::warn!(error = %e, "transport connect failed");
            ack.send(&AckError::CONNECT_FAILED.as_str()).ok();
        }
    }
}

pub async fn handle_audio_produce(
    socket: SocketRef,
    io: socketioxide::SocketIo,
    Data(payload): Data<AudioProducePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(user_id) = current_user(&state, &socket) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    let Some(worker) = state.worker_pool.get(room.worker_id) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };

    match worker.create_producer(&payload.transport_id, "audio", payload.rtp_parameters).await {
        Ok(result) => {
            if let Some(producer_id) = result.get("producerId").and_then(|v| v.as_str()) {
                state
                    .registry
                    .add_producer(&socket.id.to_string(), MediaKind::Audio, producer_id.to_string());
                state.producer_owners.insert(producer_id.to_string(), user_id);
                if state.speaker_relays_started.insert(room.room_id.clone()) {
                    speaker::spawn_speaker_relay(
                        io.clone(),
                        state.worker_pool.clone(),
                        room.worker_id,
                        room.room_id.clone(),
                        state.producer_owners.clone(),
                    );
                }
            }
            ack.send(&result).ok();
        }
        Err(e) => {
            tracing::warn!(error = %e, "produce failed");
            ack.send(&AckError::PRODUCE_FAILED.as_str()).ok();
        }
    }
}

pub async fn handle_audio_consume(
    socket: SocketRef,
    Data(payload): Data<AudioConsumePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(room) = current_room(&state, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    let Some(worker) = state.worker_pool.get(room.worker_id) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };

    match worker
        .create_consumer(&payload.transport_id, &payload.producer_id, payload.rtp_capabilities)
        .await
    {
        Ok(result) => {
            if let Some(consumer_id) = result.get("consumerId").and_then(|v| v.as_str()) {
                state.registry.add_consumer(
                    &socket.id.to_string(),
                    payload.producer_id.clone(),
                    consumer_id.to_string(),
                );
            }
            ack.send(&result).ok();
        }
        Err(e) => {
            tracing::warn!(error = %e, "consume failed");
            ack.send(&AckError::CANNOT_CONSUME.as_str()).ok();
        }
    }
}

pub async fn handle_consumer_resume(
    socket: SocketRef,
    Data(payload): Data<ConsumerResumePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Ok(room) = current_room(&state, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    let Some(worker) = state.worker_pool.get(room.worker_id) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };

    match worker.resume_consumer(&payload.consumer_id).await {
        Ok(()) => {
            ack.send(&serde_json::json!({ "ok": true })).ok();
        }
        Err(e) => {
            tracing::warn!(error = %e, "consumer resume failed");
            ack.send(&AckError::RESUME_FAILED.as_str()).ok();
        }
    }
}

/// `audio:selfmute` / `audio:selfunmute`: pauses or resumes the caller's
/// own audio producer only. Left undocumented by the spec proper (§9 Open
/// Question) beyond their names; implemented here as the owner-mute
/// pattern applied to oneself — it never touches seat occupancy or the
/// `muted` seat flag, which stays an owner-only lever via `seat:mute`.
pub async fn handle_audio_selfmute(socket: SocketRef, State(state): State<Arc<AppState>>, ack: AckSender) {
    set_self_mute(socket, state, ack, true).await;
}

pub async fn handle_audio_selfunmute(socket: SocketRef, State(state): State<Arc<AppState>>, ack: AckSender) {
    set_self_mute(socket, state, ack, false).await;
}

async fn set_self_mute(socket: SocketRef, state: Arc<AppState>, ack: AckSender, muted: bool) {
    let Some(entry) = state.registry.get_by_conn_id(&socket.id.to_string()) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };
    let Ok(room) = current_room(&state, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };
    let Some(worker) = state.worker_pool.get(room.worker_id) else {
        ack.send(&AckError::INTERNAL.as_str()).ok();
        return;
    };

    let producer_id = entry.resources.lock().producers.get(&MediaKind::Audio).cloned();
    let Some(producer_id) = producer_id else {
        ack.send(&serde_json::json!({ "ok": true })).ok();
        return;
    };

    let result = if muted {
        worker.pause_producer(&producer_id).await
    } else {
        worker.resume_producer(&producer_id).await
    };

    match result {
        Ok(()) => {
            let _ = socket
                .to(room.room_id.clone())
                .emit(if muted { "audio:muted" } else { "audio:unmuted" }, &ProducerClosed { producer_id });
            ack.send(&serde_json::json!({ "ok": true })).ok();
        }
        Err(e) => {
            tracing::warn!(error = %e, "self mute toggle failed");
            ack.send(&AckError::INTERNAL.as_str()).ok();
        }
    }
}
