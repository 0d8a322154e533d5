use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use skyroom_shared::clients::{InternalApiClient, RedisClient};

use crate::config::AppConfig;
use crate::gift::GiftBuffer;
use crate::media::{RoomManager, WorkerPool};
use crate::registry::ClientRegistry;
use crate::seats::{InviteStore, SeatStore};

/// Everything a socket handler needs, constructed once in `main` and
/// shared behind `Arc` via socketioxide's `State` extractor.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub redis: RedisClient,
    pub auth_client: InternalApiClient,
    pub biz_client: InternalApiClient,
    pub registry: Arc<ClientRegistry>,
    pub worker_pool: Arc<WorkerPool>,
    pub room_manager: Arc<RoomManager>,
    pub seats: Arc<SeatStore>,
    pub invites: Arc<InviteStore>,
    pub gift_buffer: Arc<GiftBuffer>,
    /// producerId -> userId, needed to attribute active-speaker
    /// notifications (which only carry a producer id) back to a user.
    pub producer_owners: Arc<DashMap<String, i64>>,
    /// Rooms that already have a speaker-relay task running, so the first
    /// producer in a room starts it and later producers don't duplicate it.
    pub speaker_relays_started: Arc<DashSet<String>>,
}
