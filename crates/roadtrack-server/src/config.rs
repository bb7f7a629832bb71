//! Server configuration from environment.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Base URL of the external routing provider.
    pub provider_url: String,
    /// Provider credential. When unset, every route is synthesized locally.
    pub provider_api_key: Option<String>,
    /// Per-call provider timeout in seconds.
    pub provider_timeout_s: u64,
    pub routing_profile: String,
    pub route_cache_capacity: usize,
    pub route_cache_ttl_ms: u64,
    pub offroute_threshold_m: f64,
    pub offroute_strike_threshold: u32,
    pub offroute_debounce_ms: i64,
    /// Proximity radius for hazard reports against active routes.
    pub hazard_radius_m: f64,
    /// Effect radius assumed for obstacle reports that omit one.
    pub default_obstacle_radius_m: f64,
    pub hazard_max_age_hours: i64,
    pub position_broadcast_max_per_window: usize,
    pub position_broadcast_window_ms: i64,
    pub ws_ping_interval_s: u64,
    pub ws_ping_grace_multiplier: u32,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_port: env_parse("ROADTRACK_PORT", 3000),
            provider_url: env::var("ROADTRACK_PROVIDER_URL")
                .unwrap_or_else(|_| "https://graphhopper.com/api/1".to_string()),
            provider_api_key: env::var("ROADTRACK_PROVIDER_KEY")
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            provider_timeout_s: env_parse("ROADTRACK_PROVIDER_TIMEOUT_S", 5),
            routing_profile: env::var("ROADTRACK_PROFILE").unwrap_or_else(|_| "car".to_string()),
            route_cache_capacity: env_parse("ROADTRACK_ROUTE_CACHE_CAPACITY", 100),
            route_cache_ttl_ms: env_parse("ROADTRACK_ROUTE_CACHE_TTL_MS", 30_000),
            offroute_threshold_m: env_parse("ROADTRACK_OFFROUTE_THRESHOLD_M", 50.0),
            offroute_strike_threshold: env_parse("ROADTRACK_OFFROUTE_STRIKES", 3),
            offroute_debounce_ms: env_parse("ROADTRACK_OFFROUTE_DEBOUNCE_MS", 2_000),
            hazard_radius_m: env_parse("ROADTRACK_HAZARD_RADIUS_M", 1_000.0),
            default_obstacle_radius_m: env_parse("ROADTRACK_OBSTACLE_RADIUS_M", 100.0),
            hazard_max_age_hours: env_parse("ROADTRACK_HAZARD_MAX_AGE_H", 24),
            position_broadcast_max_per_window: env_parse("ROADTRACK_POSITION_BROADCAST_MAX", 5),
            position_broadcast_window_ms: env_parse("ROADTRACK_POSITION_BROADCAST_WINDOW_MS", 1_000),
            ws_ping_interval_s: env_parse("ROADTRACK_WS_PING_INTERVAL_S", 30),
            ws_ping_grace_multiplier: env_parse("ROADTRACK_WS_PING_GRACE", 2),
        }
    }
}
