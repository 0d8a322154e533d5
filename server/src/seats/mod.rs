pub mod invites;
pub mod scripts;
pub mod store;

pub use invites::InviteStore;
pub use store::{SeatSlot, SeatStore};
