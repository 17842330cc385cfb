//! Recorded location trace as a `GeoProvider`
//!
//! One JSON object per line:
//! `{"lat": 10.9, "lng": 75.92, "delay_ms": 5000, "address": {"name": "...", "city": "..."}}`
//! `delay_ms` is the wait before that fix is emitted on a watch stream.
//! `address` feeds the native reverse geocoder for that fix.

use crate::domain::types::{Coordinates, Permission};
use crate::error::{GeoError, GeocodeError};
use crate::io::geo::{subscription, FixCallback, GeoProvider, NativeAddress, Subscription, WatchOptions};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Fixes closer than this to a recorded one reuse its address
const ADDRESS_MATCH_RADIUS_M: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayFix {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub address: Option<NativeAddress>,
}

impl ReplayFix {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng, delay_ms: 0, address: None }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

pub struct ReplayGeoProvider {
    fixes: Vec<ReplayFix>,
    permission: Permission,
    services_enabled: bool,
}

impl ReplayGeoProvider {
    pub fn new(fixes: Vec<ReplayFix>) -> Self {
        Self { fixes, permission: Permission::Granted, services_enabled: true }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file: {}", path.display()))?;
        let fixes = parse_trace(&content).with_context(|| format!("invalid replay file: {}", path.display()))?;
        info!(path = %path.display(), fixes = %fixes.len(), "replay_trace_loaded");
        Ok(Self::new(fixes))
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_services_enabled(mut self, enabled: bool) -> Self {
        self.services_enabled = enabled;
        self
    }
}

/// Parse a JSONL trace. Blank lines and `#` comments are skipped.
pub fn parse_trace(content: &str) -> anyhow::Result<Vec<ReplayFix>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| serde_json::from_str(line).with_context(|| format!("line {}", n + 1)))
        .collect()
}

#[async_trait]
impl GeoProvider for ReplayGeoProvider {
    async fn request_permission(&self) -> Permission {
        self.permission
    }

    async fn permission(&self) -> Permission {
        self.permission
    }

    async fn services_enabled(&self) -> bool {
        self.services_enabled
    }

    async fn current_fix(&self) -> Result<Coordinates, GeoError> {
        if !self.services_enabled {
            return Err(GeoError::ServicesDisabled);
        }
        self.fixes
            .first()
            .map(ReplayFix::coordinates)
            .ok_or_else(|| GeoError::Unavailable("replay trace is empty".into()))
    }

    async fn last_known_fix(&self) -> Option<Coordinates> {
        self.fixes.first().map(ReplayFix::coordinates)
    }

    async fn watch(&self, options: WatchOptions, on_update: FixCallback) -> Result<Subscription, GeoError> {
        if !self.permission.is_granted() {
            return Err(GeoError::PermissionDenied);
        }
        let (sub, emitter) = subscription(options, on_update);
        let fixes = self.fixes.clone();
        let task = tokio::spawn(async move {
            for fix in fixes {
                if fix.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(fix.delay_ms)).await;
                }
                if !emitter.is_active() {
                    break;
                }
                emitter.emit(fix.coordinates());
            }
            debug!("replay_trace_exhausted");
        });
        sub.on_cancel(move || task.abort());
        Ok(sub)
    }

    async fn reverse_geocode(&self, coords: Coordinates) -> Result<Vec<NativeAddress>, GeocodeError> {
        Ok(self
            .fixes
            .iter()
            .filter(|f| f.coordinates().distance_m(&coords) <= ADDRESS_MATCH_RADIUS_M)
            .filter_map(|f| f.address.clone())
            .take(1)
            .collect())
    }
}
