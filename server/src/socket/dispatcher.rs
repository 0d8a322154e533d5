use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use socketioxide::extract::{Data, SocketRef, State};
use socketioxide::SocketIo;

use skyroom_shared::types::auth::AuthProfile;

use crate::registry::{ConnectionEntry, OwnedResources};
use crate::state::AppState;

use super::{chat_gift, media, room, seat};

#[derive(Debug, Deserialize)]
struct AuthQuery {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    profile: AuthProfile,
}

fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Authenticates the connecting socket against the external auth service,
/// caching the validated profile under `auth:token:{sha256(token)}` so a
/// reconnect with the same token skips the network round trip until the
/// cache entry expires or the token is revoked (`auth:revoked:{hash}`).
async fn authenticate(state: &AppState, token: &str) -> Result<AuthProfile, &'static str> {
    let hash = token_hash(token);

    if state.redis.exists(&format!("auth:revoked:{hash}")).await.unwrap_or(false) {
        return Err("Authentication failed");
    }

    if let Ok(Some(cached)) = state.redis.get(&format!("auth:token:{hash}")).await {
        if let Ok(profile) = serde_json::from_str::<AuthProfile>(&cached) {
            return Ok(profile);
        }
    }

    let response = state
        .auth_client
        .post_bearer::<_, ValidateResponse>("/api/v1/internal/auth/validate", token, &serde_json::json!({}))
        .await
        .map_err(|_| "Authentication failed")?;

    if let Ok(serialized) = serde_json::to_string(&response.profile) {
        let _ = state
            .redis
            .set(&format!("auth:token:{hash}"), &serialized, state.config.auth_cache_ttl_secs)
            .await;
    }

    Ok(response.profile)
}

/// Registers every event handler on the default namespace. Per
/// socketioxide's own model, handlers must be attached before the layer
/// starts accepting connections, so this runs once at startup against the
/// `Io` instance, not per-socket.
pub fn register_namespace(io: &SocketIo, state: Arc<AppState>) {
    let auth_state = state.clone();
    io.ns("/", move |socket: SocketRef, Data(query): Data<AuthQuery>| {
        let state = auth_state.clone();
        async move {
            on_connect(socket, query, state).await;
        }
    });
}

async fn on_connect(socket: SocketRef, query: AuthQuery, state: Arc<AppState>) {
    let profile = match authenticate(&state, &query.token).await {
        Ok(profile) => profile,
        Err(reason) => {
            tracing::info!(reason, "socket rejected at handshake");
            let _ = socket.disconnect();
            return;
        }
    };

    let entry = Arc::new(ConnectionEntry {
        conn_id: socket.id.to_string(),
        user_id: profile.id,
        socket: socket.clone(),
        room_id: parking_lot::Mutex::new(None),
        is_speaker: std::sync::atomic::AtomicBool::new(false),
        resources: parking_lot::Mutex::new(OwnedResources::default()),
    });
    state.registry.register(entry);
    metrics::gauge!("sockets_connected").increment(1);

    bind_handlers(&socket);

    let disconnect_state = state.clone();
    socket.on_disconnect(move |socket: SocketRef| {
        let state = disconnect_state.clone();
        async move {
            handle_disconnect(socket, state).await;
        }
    });
}

fn bind_handlers(socket: &SocketRef) {
    socket.on("room:join", room::handle_room_join);
    socket.on("room:leave", room::handle_room_leave);
    socket.on("user:get-room", room::handle_user_get_room);

    socket.on("seat:take", seat::handle_seat_take);
    socket.on("seat:leave", seat::handle_seat_leave);
    socket.on("seat:assign", seat::handle_seat_assign);
    socket.on("seat:mute", seat::handle_seat_mute);
    socket.on("seat:lock", seat::handle_seat_lock);
    socket.on("seat:unlock", seat::handle_seat_unlock);
    socket.on("seat:invite", seat::handle_seat_invite);
    socket.on("seat:invite:accept", seat::handle_seat_invite_accept);
    socket.on("seat:invite:decline", seat::handle_seat_invite_decline);

    socket.on("transport:create", media::handle_transport_create);
    socket.on("transport:connect", media::handle_transport_connect);
    socket.on("audio:produce", media::handle_audio_produce);
    socket.on("audio:consume", media::handle_audio_consume);
    socket.on("consumer:resume", media::handle_consumer_resume);
    socket.on("audio:selfmute", media::handle_audio_selfmute);
    socket.on("audio:selfunmute", media::handle_audio_selfunmute);

    socket.on("chat:message", chat_gift::handle_chat);
    socket.on("gift:prepare", chat_gift::handle_gift_prepare);
    socket.on("gift:send", chat_gift::handle_gift_send_event);
}

/// Disconnect cleanup, strictly ordered per §4.1: close consumers, then
/// producers, then transports (each an RPC into the worker the room's
/// router lives on), vacate the occupied seat if any, leave the
/// socket.io room, then drop the registry entry last so lookups during
/// the steps above still resolve.
async fn handle_disconnect(socket: SocketRef, state: Arc<AppState>) {
    let conn_id = socket.id.to_string();
    let Some(entry) = state.registry.get_by_conn_id(&conn_id) else {
        return;
    };
    let room_id = entry.room();

    if let Some(room_id) = &room_id {
        if let Some(room) = state.room_manager.get(room_id) {
            if let Some(worker) = state.worker_pool.get(room.worker_id) {
                let resources = state.registry.take_resources(&conn_id);
                for (_, consumer_id) in resources.consumers {
                    let _ = worker.close_consumer(&consumer_id).await;
                }
                for (_, producer_id) in resources.producers {
                    let _ = worker.close_producer(&producer_id).await;
                    state.producer_owners.remove(&producer_id);
                }
                for (transport_id, _) in resources.transports {
                    let _ = worker.close_transport(&transport_id).await;
                }
            }

            let _ = state.seats.leave(room_id, entry.user_id).await;
            state.room_manager.on_leave(&room).await;
        }
    }

    state.registry.unregister(&conn_id);
    metrics::gauge!("sockets_connected").decrement(1);
}
