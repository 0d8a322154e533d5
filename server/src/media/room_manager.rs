use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use skyroom_shared::clients::RedisClient;

use crate::config::AppConfig;
use crate::registry::{ClientRegistry, RoomId};

use super::worker_pool::WorkerPool;

pub struct Room {
    pub room_id: RoomId,
    pub worker_id: u64,
    pub router_id: String,
    pub seat_count: u8,
    pub participant_count: AtomicU32,
    pub is_closing: AtomicBool,
    pub owner_id: AsyncMutex<Option<i64>>,
    grace_timer: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Room {
    pub fn participant_count(&self) -> u32 {
        self.participant_count.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    AutoClose,
    WorkerCrash,
    Explicit,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::AutoClose => "auto_close",
            CloseReason::WorkerCrash => "worker_crash",
            CloseReason::Explicit => "explicit",
        }
    }
}

/// At most one router per room-id, created idempotently per-room (a
/// per-room creation lock serializes concurrent `room:join`s for an
/// unseen room so they resolve to the same router), and torn down when
/// the room's participant count reaches zero for the grace interval or on
/// worker crash.
pub struct RoomManager {
    rooms: DashMap<RoomId, Arc<Room>>,
    creation_locks: DashMap<RoomId, Arc<AsyncMutex<()>>>,
    worker_pool: Arc<WorkerPool>,
    redis: RedisClient,
    registry: Arc<ClientRegistry>,
    config: Arc<AppConfig>,
}

impl RoomManager {
    pub fn new(
        worker_pool: Arc<WorkerPool>,
        redis: RedisClient,
        registry: Arc<ClientRegistry>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            creation_locks: DashMap::new(),
            worker_pool,
            redis,
            registry,
            config,
        }
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| r.clone())
    }

    /// Idempotent per room-id: concurrent callers for the same id resolve
    /// to the same router.
    pub async fn get_or_create_room(&self, room_id: &str) -> anyhow::Result<Arc<Room>> {
        if let Some(room) = self.rooms.get(room_id) {
            return Ok(room.clone());
        }

        let lock = self
            .creation_locks
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(room) = self.rooms.get(room_id) {
            return Ok(room.clone());
        }

        let worker = self
            .worker_pool
            .pick_worker()
            .ok_or_else(|| anyhow::anyhow!("no media workers available"))?;
        let router = worker.create_router(room_id).await?;
        let router_id = router
            .get("routerId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        worker.observe_active_speaker(&router_id).await.ok();

        let room = Arc::new(Room {
            room_id: room_id.to_string(),
            worker_id: worker.id,
            router_id,
            seat_count: self.config.default_seat_count,
            participant_count: AtomicU32::new(0),
            is_closing: AtomicBool::new(false),
            owner_id: AsyncMutex::new(None),
            grace_timer: AsyncMutex::new(None),
        });

        self.rooms.insert(room_id.to_string(), room.clone());
        tracing::info!(room_id, worker_id = worker.id, "router created");
        Ok(room)
    }

    /// §4.4 join side-effects: bump participant count, record activity,
    /// set user→room mapping, optionally seed the owner cache, and cancel
    /// any pending auto-close grace timer.
    pub async fn on_join(&self, room: &Arc<Room>, user_id: i64, owner_id: Option<i64>) {
        room.participant_count.fetch_add(1, Ordering::SeqCst);
        self.record_activity(&room.room_id).await;
        let _ = self
            .redis
            .set(&format!("user:{user_id}:room"), &room.room_id, 3600)
            .await;

        if let Some(owner) = owner_id {
            *room.owner_id.lock().await = Some(owner);
            let _ = self
                .redis
                .set(
                    &format!("room:{}:owner", room.room_id),
                    &owner.to_string(),
                    self.config.owner_seed_ttl_secs,
                )
                .await;
        }

        self.cancel_grace_timer(room).await;
    }

    /// §4.4 leave side-effects: decrement participant count, notify,
    /// arm the grace timer if the room is now empty.
    pub async fn on_leave(&self, room: &Arc<Room>) {
        let remaining = room
            .participant_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)))
            .map(|prev| prev.saturating_sub(1))
            .unwrap_or(0);
        let _ = self.redis.del(&format!("room:{}:activity", room.room_id)).await;
        if remaining == 0 {
            self.arm_grace_timer(room.clone()).await;
        }
    }

    pub async fn record_activity(&self, room_id: &str) {
        let _ = self
            .redis
            .set(&format!("room:{room_id}:activity"), "1", 30)
            .await;
    }

    async fn arm_grace_timer(&self, room: Arc<Room>) {
        let grace = Duration::from_secs(self.config_grace_secs());
        let watched = room.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if watched.participant_count() == 0 && !watched.is_closing.load(Ordering::SeqCst) {
                // The caller (AutoCloseSweeper) observes the activity key's
                // expiry on its own sweep and performs teardown via
                // `close_room`; this timer only flags eligibility in the
                // logs, the KV-authoritative activity timestamp stays the
                // source of truth for the sweeper.
                tracing::debug!(room_id = %watched.room_id, "grace timer elapsed, room eligible for auto-close");
            }
        });
        *room.grace_timer.lock().await = Some(handle);
    }

    async fn cancel_grace_timer(&self, room: &Arc<Room>) {
        if let Some(handle) = room.grace_timer.lock().await.take() {
            handle.abort();
        }
    }

    fn config_grace_secs(&self) -> u64 {
        self.config.auto_close_grace_secs
    }

    /// Closes a room: broadcasts are the caller's responsibility (the
    /// dispatcher/socket layer has the room membership needed to emit
    /// `room:closed`). This only releases the router and clears local
    /// bookkeeping, matching the Room-owns-router / Worker-owns-routers
    /// ownership split.
    pub async fn close_room(&self, room_id: &str, reason: CloseReason) -> Option<Arc<Room>> {
        let (_, room) = self.rooms.remove(room_id)?;
        room.is_closing.store(true, Ordering::SeqCst);
        self.cancel_grace_timer(&room).await;

        if let Some(worker) = self.worker_pool.get(room.worker_id) {
            if let Err(e) = worker.close_router(&room.router_id).await {
                tracing::warn!(room_id, error = %e, "failed to close router cleanly");
            }
        }

        let _ = self.redis.del(&format!("room:{room_id}:activity")).await;
        tracing::info!(room_id, reason = reason.as_str(), "room closed");
        Some(room)
    }

    /// Enumerates all rooms whose router lived on the given worker — used
    /// by the crash-recovery path (§4.3 step 1).
    pub fn rooms_on_worker(&self, worker_id: u64) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .filter(|r| r.worker_id == worker_id)
            .map(|r| r.clone())
            .collect()
    }

    /// Rooms with zero participants whose activity key has expired in
    /// Redis — the sweeper's candidate set for auto-close.
    pub async fn zero_participant_rooms(&self) -> Vec<Arc<Room>> {
        let mut candidates = Vec::new();
        for entry in self.rooms.iter() {
            let room = entry.clone();
            if room.participant_count() != 0 {
                continue;
            }
            let active = self
                .redis
                .exists(&format!("room:{}:activity", room.room_id))
                .await
                .unwrap_or(true);
            if !active {
                candidates.push(room);
            }
        }
        candidates
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }
}
