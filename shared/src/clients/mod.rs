mod http;
mod redis;

pub use http::*;
pub use redis::RedisClient;
