pub mod chat_gift;
pub mod dispatcher;
pub mod media;
pub mod payloads;
pub mod room;
pub mod seat;

pub use dispatcher::register_namespace;
