use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use dashmap::{DashMap, DashSet};
use socketioxide::SocketIo;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod autoclose;
mod chat;
mod config;
mod error;
mod gift;
mod health;
mod media;
mod registry;
mod relay;
mod seats;
mod socket;
mod state;

use config::AppConfig;
use gift::GiftBuffer;
use media::{RoomManager, WorkerPool};
use registry::ClientRegistry;
use seats::{InviteStore, SeatStore};
use skyroom_shared::clients::{InternalApiClient, RedisClient};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    skyroom_shared::middleware::init_tracing("skyroom-server");

    let config = Arc::new(AppConfig::load());
    let metrics_handle = skyroom_shared::middleware::init_metrics();

    let redis = RedisClient::connect(&config.redis_url).await?;
    let auth_client = InternalApiClient::new(&config.auth_url, &config.internal_key);
    let biz_client = InternalApiClient::new(&config.biz_url, &config.internal_key);

    let registry = Arc::new(ClientRegistry::new());
    let worker_pool = WorkerPool::spawn(config.worker_count, &config.worker_binary_path, Duration::from_secs(30)).await?;
    let room_manager = Arc::new(RoomManager::new(worker_pool.clone(), redis.clone(), registry.clone(), config.clone()));
    let seats = Arc::new(SeatStore::new(redis.clone()));
    let invites = Arc::new(InviteStore::new(redis.clone(), registry.clone(), config.invite_ttl_secs));
    let gift_buffer = Arc::new(GiftBuffer::new(config.gift_buffer_high_water));

    let state = Arc::new(AppState {
        config: config.clone(),
        redis: redis.clone(),
        auth_client,
        biz_client: biz_client.clone(),
        registry: registry.clone(),
        worker_pool: worker_pool.clone(),
        room_manager: room_manager.clone(),
        seats: seats.clone(),
        invites,
        gift_buffer: gift_buffer.clone(),
        producer_owners: Arc::new(DashMap::new()),
        speaker_relays_started: Arc::new(DashSet::new()),
    });

    let (sio_layer, io) = SocketIo::builder().with_state(state.clone()).build_layer();

    socket::register_namespace(&io, state.clone());

    let gift_flusher = gift::spawn_gift_flusher(
        gift_buffer.clone(),
        biz_client.clone(),
        Duration::from_millis(config.gift_flush_interval_ms),
        config.gift_flush_max_batch,
    );
    let relay_task = relay::spawn_relay(redis.clone(), registry.clone(), io.clone(), config.clone()).await;
    let sweeper_task = autoclose::spawn_auto_close_sweeper(
        room_manager.clone(),
        seats.clone(),
        io.clone(),
        Duration::from_secs(config.auto_close_grace_secs),
    );

    let app = Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(move || async move { metrics_handle.render() }))
        .layer(sio_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(skyroom_shared::middleware::metrics_middleware))
        .with_state(state.clone());

    tracing::info!(addr = %config.bind_addr, "skyroom-server starting");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    relay_task.abort();
    sweeper_task.abort();
    gift_flusher.abort();
    gift::drain_on_shutdown(&gift_buffer, &biz_client, config.gift_flush_max_batch, 10).await;
    tracing::info!("skyroom-server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining");
}
