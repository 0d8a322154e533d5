use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use socketioxide::SocketIo;

use crate::media::{CloseReason, RoomManager};
use crate::seats::SeatStore;

#[derive(Debug, Serialize)]
struct RoomClosed<'a> {
    reason: &'a str,
}

/// Periodic housekeeping sweep: rooms with zero participants whose
/// activity key has already expired in Redis are closed and their
/// occupants (if any ghost sockets remain) notified via `room:closed`.
/// Runs independently of the per-room grace timer, which only exists to
/// keep the debug trail readable — this sweep is the actual authority.
pub fn spawn_auto_close_sweeper(
    room_manager: Arc<RoomManager>,
    seats: Arc<SeatStore>,
    io: SocketIo,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let candidates = room_manager.zero_participant_rooms().await;
            for room in candidates {
                let room_id = room.room_id.clone();
                if let Some(closed) = room_manager.close_room(&room_id, CloseReason::AutoClose).await {
                    seats.clear_room(&closed.room_id).await;
                    let _ = io.to(room_id.clone()).emit(
                        "room:closed",
                        &RoomClosed {
                            reason: CloseReason::AutoClose.as_str(),
                        },
                    );
                    tracing::info!(room_id, "room auto-closed by sweeper");
                }
            }
        }
    })
}
