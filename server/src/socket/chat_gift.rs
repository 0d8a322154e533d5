use std::sync::Arc;

use serde::Deserialize;
use socketioxide::extract::{AckSender, Data, SocketRef, State};
use validator::Validate;

use crate::chat::{handle_chat_message, ChatMessagePayload};
use crate::error::AckError;
use crate::gift::{handle_gift_send, GiftSendPayload};
use crate::state::AppState;

fn current_conn(state: &AppState, socket: &SocketRef) -> Option<(i64, String)> {
    let entry = state.registry.get_by_conn_id(&socket.id.to_string())?;
    let room_id = entry.room()?;
    Some((entry.user_id, room_id))
}

pub async fn handle_chat(
    socket: SocketRef,
    Data(payload): Data<ChatMessagePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Some((user_id, room_id)) = current_conn(&state, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };

    match handle_chat_message(&state.redis, &state.config, &socket, &room_id, user_id, payload).await {
        Ok(()) => {
            ack.send(&serde_json::json!({ "ok": true })).ok();
        }
        Err(e) => {
            ack.send(&e.as_str()).ok();
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct GiftPreparePayload {
    #[validate(length(min = 1))]
    #[serde(rename = "giftId")]
    pub gift_id: String,
}

/// `gift:prepare`: a lightweight pre-flight the client calls before
/// `gift:send` to confirm the gift id is still sellable, kept separate so
/// the actual send stays on the fast optimistic-broadcast path without an
/// extra catalog round-trip in the common case.
pub async fn handle_gift_prepare(
    Data(payload): Data<GiftPreparePayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    if payload.validate().is_err() {
        ack.send(&AckError::INVALID_PAYLOAD.as_str()).ok();
        return;
    }
    match state
        .biz_client
        .get::<serde_json::Value>(&format!("/internal/v1/gifts/{}", payload.gift_id))
        .await
    {
        Ok(catalog_entry) => {
            ack.send(&catalog_entry).ok();
        }
        Err(_) => {
            ack.send(&AckError::INTERNAL.as_str()).ok();
        }
    }
}

pub async fn handle_gift_send_event(
    socket: SocketRef,
    Data(payload): Data<GiftSendPayload>,
    State(state): State<Arc<AppState>>,
    ack: AckSender,
) {
    let Some((user_id, room_id)) = current_conn(&state, &socket) else {
        ack.send(&AckError::ROOM_NOT_FOUND.as_str()).ok();
        return;
    };

    match handle_gift_send(&state.redis, &state.config, &state.gift_buffer, &socket, &room_id, user_id, payload).await {
        Ok(transaction_id) => {
            ack.send(&serde_json::json!({ "transactionId": transaction_id })).ok();
        }
        Err(e) => {
            ack.send(&e.as_str()).ok();
        }
    }
}
