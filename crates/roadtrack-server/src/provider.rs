//! Resilient client for the external routing provider.
//!
//! The upstream is a GraphHopper-style directions API that is unreliable in
//! practice: rate limits, transient 5xx, and origins that snap to
//! non-routable surfaces. Each request is allowed a small retry budget, and
//! every retry applies a repair strategy chosen purely by attempt number:
//! axis swap, contraction-hierarchy bypass, and finally small origin
//! nudges. Responses are cached by rounded endpoints so bursts of identical
//! requests cost one upstream call.

use reqwest::{Client, StatusCode};
use roadtrack_core::models::{Coordinate, RouteInstruction};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{cache_key, RouteCache};
use crate::config::Config;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 100;
const BACKOFF_CAP_MS: u64 = 2_000;
const BACKOFF_JITTER_RATIO: f64 = 0.3;

/// One origin displacement, ~50 m. Applied when the provider cannot route
/// from the exact origin (water, parking structures, ...).
const NUDGE_STEP_DEG: f64 = 0.000_45;

/// (dlat, dlon) unit offsets: none, N, E, S, W, NE, NW, SE, SW.
const NUDGE_OFFSETS: [(f64, f64); 9] = [
    (0.0, 0.0),
    (1.0, 0.0),
    (0.0, 1.0),
    (-1.0, 0.0),
    (0.0, -1.0),
    (1.0, 1.0),
    (1.0, -1.0),
    (-1.0, 1.0),
    (-1.0, -1.0),
];

#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    #[error("provider rejected credential (HTTP {0})")]
    Unauthorized(u16),
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("provider returned no usable route")]
    NoRoute,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A route as returned by the provider, normalized to our units.
#[derive(Debug, Clone)]
pub struct ProviderRoute {
    pub distance_m: f64,
    pub duration_ms: i64,
    pub polyline: Vec<Coordinate>,
    pub instructions: Vec<RouteInstruction>,
}

/// Request modifications for one attempt. Pure function of attempt number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AttemptStrategy {
    pub swap_axes: bool,
    pub disable_ch: bool,
    pub nudge: Option<(f64, f64)>,
}

pub(crate) fn strategy_for_attempt(attempt: u32) -> AttemptStrategy {
    match attempt {
        0 => AttemptStrategy { swap_axes: false, disable_ch: false, nudge: None },
        1 => AttemptStrategy { swap_axes: true, disable_ch: false, nudge: None },
        2 => AttemptStrategy { swap_axes: false, disable_ch: true, nudge: None },
        3 => AttemptStrategy { swap_axes: true, disable_ch: true, nudge: None },
        n => {
            let (dlat, dlon) = NUDGE_OFFSETS[((n - 3) as usize) % NUDGE_OFFSETS.len()];
            AttemptStrategy {
                swap_axes: false,
                disable_ch: true,
                nudge: Some((dlat * NUDGE_STEP_DEG, dlon * NUDGE_STEP_DEG)),
            }
        }
    }
}

/// Exponential backoff for the given attempt, with up to 30% jitter on top.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS
        .saturating_mul(1u64 << attempt.min(16))
        .min(BACKOFF_CAP_MS);
    let jitter = (base as f64 * BACKOFF_JITTER_RATIO * rand::random::<f64>()) as u64;
    Duration::from_millis(base + jitter)
}

/// Outcome of a single provider call.
enum AttemptOutcome {
    Success(ProviderRoute),
    /// 429. Carries the provider-supplied retry-after delay, if any.
    RateLimited(Option<Duration>),
    /// Do not retry; surface immediately.
    Terminal(RoutingError),
    /// Recorded as the current failure reason; the budget decides.
    Retry(RoutingError),
}

pub struct RoutingClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    profile: String,
    cache: RouteCache,
}

impl RoutingClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(config.provider_timeout_s))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: config.provider_url.trim_end_matches('/').to_string(),
            api_key: config.provider_api_key.clone(),
            profile: config.routing_profile.clone(),
            cache: RouteCache::new(
                config.route_cache_capacity,
                Duration::from_millis(config.route_cache_ttl_ms),
            ),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    /// Obtain a route between two points, tolerating an unreliable upstream.
    ///
    /// Consults the cache first; otherwise spends up to five attempts, each
    /// with its repair strategy, backing off between tries. Unauthorized
    /// responses are terminal. On exhaustion the last recorded failure is
    /// returned.
    pub async fn fetch_route(
        &self,
        start: Coordinate,
        end: Coordinate,
        instructions: bool,
    ) -> Result<ProviderRoute, RoutingError> {
        let key = cache_key(start, end, &self.profile);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!("route cache hit for {}", key);
            return Ok(hit);
        }

        let mut retry_after: Option<Duration> = None;
        let mut last_failure = RoutingError::NoRoute;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = backoff_delay(attempt);
                let wait = match retry_after.take() {
                    Some(provider_delay) => provider_delay.max(backoff),
                    None => backoff,
                };
                tokio::time::sleep(wait).await;
            }

            let strategy = strategy_for_attempt(attempt);
            match self.execute_attempt(start, end, instructions, strategy).await {
                AttemptOutcome::Success(route) => {
                    self.cache.put(key.clone(), route.clone());
                    return Ok(route);
                }
                AttemptOutcome::RateLimited(after) => {
                    tracing::debug!(attempt, "provider rate limited, will back off");
                    retry_after = after;
                    last_failure = RoutingError::RateLimited;
                }
                AttemptOutcome::Terminal(err) => {
                    tracing::warn!(attempt, "terminal provider failure: {}", err);
                    return Err(err);
                }
                AttemptOutcome::Retry(err) => {
                    tracing::debug!(attempt, "provider attempt failed: {}", err);
                    last_failure = err;
                }
            }
        }

        Err(last_failure)
    }

    /// Lightweight reachability probe between two fixed nearby points.
    /// Bypasses the cache and the retry budget; mutates no state.
    pub async fn probe(&self) -> Result<(), RoutingError> {
        let start = Coordinate { lat: 37.7749, lon: -122.4194 };
        let end = Coordinate { lat: 37.7790, lon: -122.4140 };
        match self
            .execute_attempt(start, end, false, strategy_for_attempt(0))
            .await
        {
            AttemptOutcome::Success(_) => Ok(()),
            AttemptOutcome::RateLimited(_) => Err(RoutingError::RateLimited),
            AttemptOutcome::Terminal(err) | AttemptOutcome::Retry(err) => Err(err),
        }
    }

    async fn execute_attempt(
        &self,
        start: Coordinate,
        end: Coordinate,
        instructions: bool,
        strategy: AttemptStrategy,
    ) -> AttemptOutcome {
        let origin = match strategy.nudge {
            Some((dlat, dlon)) => Coordinate {
                lat: start.lat + dlat,
                lon: start.lon + dlon,
            },
            None => start,
        };

        let format_point = |c: Coordinate| {
            if strategy.swap_axes {
                format!("{},{}", c.lon, c.lat)
            } else {
                format!("{},{}", c.lat, c.lon)
            }
        };

        let mut query: Vec<(&str, String)> = vec![
            ("point", format_point(origin)),
            ("point", format_point(end)),
            ("profile", self.profile.clone()),
            ("instructions", instructions.to_string()),
            ("points_encoded", "false".to_string()),
        ];
        if strategy.disable_ch {
            query.push(("ch.disable", "true".to_string()));
        }
        if let Some(key) = self.api_key.as_deref() {
            query.push(("key", key.to_string()));
        }

        let url = format!("{}/route", self.base_url);
        let response = match self.http.get(&url).query(&query).send().await {
            Ok(response) => response,
            Err(err) => return AttemptOutcome::Retry(RoutingError::Transport(err.to_string())),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);
            return AttemptOutcome::RateLimited(after);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return AttemptOutcome::Terminal(RoutingError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return AttemptOutcome::Retry(RoutingError::Provider(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let payload: ProviderResponse = match response.json().await {
            Ok(payload) => payload,
            Err(err) => {
                return AttemptOutcome::Retry(RoutingError::Provider(format!(
                    "malformed payload: {}",
                    err
                )))
            }
        };

        match payload.into_route() {
            Some(route) => AttemptOutcome::Success(route),
            None => AttemptOutcome::Retry(RoutingError::NoRoute),
        }
    }
}

// Provider response types. GeoJSON coordinate order is [lon, lat].

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    paths: Vec<ProviderPath>,
}

#[derive(Debug, Deserialize)]
struct ProviderPath {
    distance: f64,
    time: i64,
    points: Option<ProviderPoints>,
    #[serde(default)]
    instructions: Vec<ProviderInstruction>,
}

#[derive(Debug, Deserialize)]
struct ProviderPoints {
    #[serde(default)]
    coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct ProviderInstruction {
    text: String,
    distance: f64,
    time: i64,
}

impl ProviderResponse {
    fn into_route(self) -> Option<ProviderRoute> {
        let path = self.paths.into_iter().next()?;
        let points = path.points?;
        let polyline: Vec<Coordinate> = points
            .coordinates
            .iter()
            .filter(|pair| pair.len() >= 2)
            .map(|pair| Coordinate { lat: pair[1], lon: pair[0] })
            .collect();
        if polyline.is_empty() {
            return None;
        }

        Some(ProviderRoute {
            distance_m: path.distance,
            duration_ms: path.time,
            polyline,
            instructions: path
                .instructions
                .into_iter()
                .map(|step| RouteInstruction {
                    text: step.text,
                    distance_m: step.distance,
                    duration_ms: step.time,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_table_for_first_four_attempts() {
        let baseline = strategy_for_attempt(0);
        assert!(!baseline.swap_axes && !baseline.disable_ch && baseline.nudge.is_none());

        let swapped = strategy_for_attempt(1);
        assert!(swapped.swap_axes && !swapped.disable_ch && swapped.nudge.is_none());

        let no_ch = strategy_for_attempt(2);
        assert!(!no_ch.swap_axes && no_ch.disable_ch && no_ch.nudge.is_none());

        let both = strategy_for_attempt(3);
        assert!(both.swap_axes && both.disable_ch && both.nudge.is_none());
    }

    #[test]
    fn nudge_offsets_cycle_from_attempt_four() {
        // (attempt - 3) mod 9 indexes the offset table.
        let fourth = strategy_for_attempt(4);
        assert!(!fourth.swap_axes && fourth.disable_ch);
        assert_eq!(fourth.nudge, Some((NUDGE_STEP_DEG, 0.0)));

        let fifth = strategy_for_attempt(5);
        assert_eq!(fifth.nudge, Some((0.0, NUDGE_STEP_DEG)));

        // Full cycle lands back on the unmodified origin.
        let wrapped = strategy_for_attempt(12);
        assert_eq!(wrapped.nudge, Some((0.0, 0.0)));
    }

    #[test]
    fn backoff_within_jitter_bounds() {
        for attempt in 0..6 {
            let base = (BACKOFF_BASE_MS * (1 << attempt)).min(BACKOFF_CAP_MS);
            for _ in 0..20 {
                let delay = backoff_delay(attempt).as_millis() as u64;
                assert!(delay >= base, "attempt {attempt}: {delay} < {base}");
                let max = base + (base as f64 * BACKOFF_JITTER_RATIO) as u64;
                assert!(delay <= max, "attempt {attempt}: {delay} > {max}");
            }
        }
    }

    #[test]
    fn backoff_base_caps_at_two_seconds() {
        let delay = backoff_delay(10).as_millis() as u64;
        assert!(delay >= 2_000 && delay <= 2_600);
    }

    #[test]
    fn response_parsing_takes_first_usable_path() {
        let json = r#"{
            "paths": [{
                "distance": 1523.4,
                "time": 210000,
                "points": {
                    "type": "LineString",
                    "coordinates": [[-122.4194, 37.7749], [-122.4094, 37.7849]]
                },
                "instructions": [
                    {"text": "Head north", "distance": 700.0, "time": 100000, "sign": 0}
                ]
            }]
        }"#;
        let payload: ProviderResponse = serde_json::from_str(json).unwrap();
        let route = payload.into_route().unwrap();
        assert_eq!(route.distance_m, 1523.4);
        assert_eq!(route.duration_ms, 210_000);
        assert_eq!(route.polyline.len(), 2);
        assert_eq!(route.polyline[0].lat, 37.7749);
        assert_eq!(route.polyline[0].lon, -122.4194);
        assert_eq!(route.instructions.len(), 1);
    }

    #[test]
    fn response_without_paths_is_unusable() {
        let payload: ProviderResponse = serde_json::from_str(r#"{"paths": []}"#).unwrap();
        assert!(payload.into_route().is_none());

        let payload: ProviderResponse =
            serde_json::from_str(r#"{"paths": [{"distance": 1.0, "time": 1}]}"#).unwrap();
        assert!(payload.into_route().is_none());
    }
}
