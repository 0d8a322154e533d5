pub mod room_manager;
pub mod speaker;
pub mod worker;
pub mod worker_pool;

pub use room_manager::{CloseReason, Room, RoomManager};
pub use worker_pool::{WorkerCrashed, WorkerPool};
