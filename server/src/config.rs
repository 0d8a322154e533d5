use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    pub redis_url: String,
    #[serde(default = "default_redis_relay_db")]
    pub redis_relay_db: i64,
    #[serde(default = "default_relay_channel")]
    pub relay_channel: String,

    pub auth_url: String,
    pub biz_url: String,
    pub internal_key: String,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_worker_binary_path")]
    pub worker_binary_path: String,

    #[serde(default = "default_seat_count")]
    pub default_seat_count: u8,
    #[serde(default = "default_invite_ttl_secs")]
    pub invite_ttl_secs: u64,
    #[serde(default = "default_auto_close_grace_secs")]
    pub auto_close_grace_secs: u64,

    #[serde(default = "default_chat_rate_limit")]
    pub chat_rate_limit: u64,
    #[serde(default = "default_chat_rate_window_secs")]
    pub chat_rate_window_secs: u64,
    #[serde(default = "default_gift_rate_limit")]
    pub gift_rate_limit: u64,
    #[serde(default = "default_gift_rate_window_secs")]
    pub gift_rate_window_secs: u64,

    #[serde(default = "default_gift_flush_interval_ms")]
    pub gift_flush_interval_ms: u64,
    #[serde(default = "default_gift_flush_max_batch")]
    pub gift_flush_max_batch: usize,
    #[serde(default = "default_gift_buffer_high_water")]
    pub gift_buffer_high_water: usize,

    #[serde(default = "default_auth_cache_ttl_secs")]
    pub auth_cache_ttl_secs: u64,
    #[serde(default = "default_auth_revocation_ttl_secs")]
    pub auth_revocation_ttl_secs: u64,
    #[serde(default = "default_owner_cache_ttl_secs")]
    pub owner_cache_ttl_secs: u64,
    #[serde(default = "default_owner_seed_ttl_secs")]
    pub owner_seed_ttl_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:4000".to_string()
}
fn default_redis_relay_db() -> i64 {
    3
}
fn default_relay_channel() -> String {
    "flylive:msab:events".to_string()
}
fn default_worker_count() -> usize {
    num_cpus::get()
}
fn default_worker_binary_path() -> String {
    "./media-worker".to_string()
}
fn default_seat_count() -> u8 {
    15
}
fn default_invite_ttl_secs() -> u64 {
    30
}
fn default_auto_close_grace_secs() -> u64 {
    30
}
fn default_chat_rate_limit() -> u64 {
    60
}
fn default_chat_rate_window_secs() -> u64 {
    60
}
fn default_gift_rate_limit() -> u64 {
    330
}
fn default_gift_rate_window_secs() -> u64 {
    60
}
fn default_gift_flush_interval_ms() -> u64 {
    500
}
fn default_gift_flush_max_batch() -> usize {
    100
}
fn default_gift_buffer_high_water() -> usize {
    10_000
}
fn default_auth_cache_ttl_secs() -> u64 {
    300
}
fn default_auth_revocation_ttl_secs() -> u64 {
    86_400
}
fn default_owner_cache_ttl_secs() -> u64 {
    30
}
fn default_owner_seed_ttl_secs() -> u64 {
    300
}

impl AppConfig {
    pub fn load() -> Self {
        let builder = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("SKYROOM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build();

        match builder.and_then(|c| c.try_deserialize()) {
            Ok(cfg) => cfg,
            Err(e) => {
                panic!("invalid or missing configuration: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert_eq!(default_seat_count(), 15);
        assert_eq!(default_invite_ttl_secs(), 30);
        assert_eq!(default_auto_close_grace_secs(), 30);
    }
}
