//! Location service boundary
//!
//! `GeoProvider` wraps the platform location service: permission state,
//! single-shot fixes, a rate-limited stream of updates and the device's own
//! reverse geocoder. Watch streams are handed out as a `Subscription`
//! (consumer side) paired with an `Emitter` (provider side).

use crate::domain::types::{Coordinates, Permission};
use crate::error::{GeoError, GeocodeError};
use crate::infra::config::Config;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Watch emission policy: both bounds must be exceeded before a new fix is
/// delivered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self { min_interval: Duration::from_secs(10), min_distance_m: 10.0 }
    }
}

impl WatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval: config.watch_min_interval(),
            min_distance_m: config.watch_min_distance_m(),
        }
    }
}

/// One result from the platform's own reverse geocoder
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NativeAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub subregion: Option<String>,
}

/// Called from the provider's callback context for each admitted fix.
/// Must not block.
pub type FixCallback = Arc<dyn Fn(Coordinates) + Send + Sync>;

#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Prompt for foreground permission
    async fn request_permission(&self) -> Permission;

    /// Current foreground permission, without prompting
    async fn permission(&self) -> Permission;

    async fn services_enabled(&self) -> bool;

    /// Fresh fix from the device
    async fn current_fix(&self) -> Result<Coordinates, GeoError>;

    /// Cached fix, if the device has one
    async fn last_known_fix(&self) -> Option<Coordinates>;

    /// Start a rate-limited stream of fixes
    async fn watch(&self, options: WatchOptions, on_update: FixCallback) -> Result<Subscription, GeoError>;

    /// Device reverse geocoding. Providers without one return no results.
    async fn reverse_geocode(&self, _coords: Coordinates) -> Result<Vec<NativeAddress>, GeocodeError> {
        Ok(Vec::new())
    }
}

/// Single-shot fix: requires granted permission, prefers a fresh fix and
/// falls back to the last-known one
pub async fn acquire_fix(provider: &dyn GeoProvider) -> Result<Coordinates, GeoError> {
    if !provider.permission().await.is_granted() {
        return Err(GeoError::PermissionDenied);
    }

    match provider.current_fix().await {
        Ok(coords) => Ok(coords),
        Err(GeoError::PermissionDenied) => Err(GeoError::PermissionDenied),
        Err(e) => {
            debug!(error = %e, "current_fix_failed_trying_last_known");
            provider.last_known_fix().await.ok_or(e)
        }
    }
}

/// Rate limiter for watch emissions
#[derive(Debug)]
pub struct FixFilter {
    options: WatchOptions,
    last: Option<(Instant, Coordinates)>,
}

impl FixFilter {
    pub fn new(options: WatchOptions) -> Self {
        Self { options, last: None }
    }

    /// Admit `coords` if it is the first fix, or if both the minimum interval
    /// and the minimum displacement since the last admitted fix are met
    pub fn admit(&mut self, coords: Coordinates, now: Instant) -> bool {
        let admit = match self.last {
            None => true,
            Some((at, prev)) => {
                now.saturating_duration_since(at) >= self.options.min_interval
                    && prev.distance_m(&coords) >= self.options.min_distance_m
            }
        };
        if admit {
            self.last = Some((now, coords));
        }
        admit
    }
}

struct SubscriptionShared {
    active: AtomicBool,
    on_cancel: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

/// Consumer handle for a watch stream.
///
/// `cancel` is idempotent: the first call stops delivery and runs cleanup,
/// later calls are no-ops.
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<SubscriptionShared>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.is_active()).finish()
    }
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Register provider-side cleanup. Runs immediately if already cancelled.
    pub fn on_cancel(&self, cleanup: impl FnOnce() + Send + 'static) {
        let mut hooks = self.shared.on_cancel.lock();
        if self.is_active() {
            hooks.push(Box::new(cleanup));
        } else {
            drop(hooks);
            cleanup();
        }
    }

    pub fn cancel(&self) {
        if self.shared.active.swap(false, Ordering::AcqRel) {
            let hooks = std::mem::take(&mut *self.shared.on_cancel.lock());
            for hook in hooks {
                hook();
            }
            debug!("location_subscription_cancelled");
        }
    }
}

/// Provider side of a watch stream
pub struct Emitter {
    shared: Arc<SubscriptionShared>,
    filter: Mutex<FixFilter>,
    on_update: FixCallback,
}

impl Emitter {
    /// Deliver a fix if the subscription is live and the rate limit admits it
    pub fn emit(&self, coords: Coordinates) -> bool {
        self.emit_at(coords, Instant::now())
    }

    pub fn emit_at(&self, coords: Coordinates, now: Instant) -> bool {
        if !self.shared.active.load(Ordering::Acquire) {
            return false;
        }
        if !self.filter.lock().admit(coords, now) {
            debug!(coords = %coords, "fix_rate_limited");
            return false;
        }
        (self.on_update)(coords);
        true
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }
}

/// Create a linked subscription/emitter pair
pub fn subscription(options: WatchOptions, on_update: FixCallback) -> (Subscription, Emitter) {
    let shared = Arc::new(SubscriptionShared {
        active: AtomicBool::new(true),
        on_cancel: Mutex::new(Vec::new()),
    });
    let emitter = Emitter { shared: shared.clone(), filter: Mutex::new(FixFilter::new(options)), on_update };
    (Subscription { shared }, emitter)
}
