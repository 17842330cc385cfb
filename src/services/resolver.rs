//! Location resolver - current coordinates and place name for the UI
//!
//! Mount spawns a worker that walks permission -> services -> initial fix ->
//! geocode, then follows the provider's watch stream, re-geocoding each
//! admitted fix. Snapshots are published on a `watch` channel.
//!
//! Every state write goes through `Inner::publish`, which checks the
//! lifecycle phase under the same lock that teardown takes. A geocode that
//! completes after teardown is dropped there and never reaches observers.

use crate::domain::types::{Coordinates, Permission, PlaceName};
use crate::error::GeoError;
use crate::infra::metrics::Metrics;
use crate::io::geo::{acquire_fix, FixCallback, GeoProvider, Subscription, WatchOptions};
use crate::services::geocoder::ReverseGeocoder;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why the resolver stopped trying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    PermissionDenied,
    ServicesDisabled,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolverState {
    #[default]
    Idle,
    /// A fix is being geocoded; the previous name stays visible meanwhile
    Resolving { last_known: Option<String> },
    Resolved(String),
    Failed(FailureReason),
}

impl ResolverState {
    /// Most recent resolved name, if any
    pub fn last_known(&self) -> Option<String> {
        match self {
            ResolverState::Resolved(name) => Some(name.clone()),
            ResolverState::Resolving { last_known } => last_known.clone(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolverState::Idle => "idle",
            ResolverState::Resolving { .. } => "resolving",
            ResolverState::Resolved(_) => "resolved",
            ResolverState::Failed(_) => "failed",
        }
    }
}

/// What observers see
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocationSnapshot {
    pub permission: Permission,
    pub coordinates: Option<Coordinates>,
    pub state: ResolverState,
}

impl LocationSnapshot {
    /// Display name: never blank between fixes
    pub fn place_name(&self) -> PlaceName {
        match &self.state {
            ResolverState::Resolved(name) => PlaceName::Named(name.clone()),
            ResolverState::Resolving { last_known: Some(name) } => PlaceName::Named(name.clone()),
            ResolverState::Resolving { last_known: None } | ResolverState::Idle => PlaceName::Resolving,
            ResolverState::Failed(FailureReason::PermissionDenied) => PlaceName::PermissionDenied,
            ResolverState::Failed(FailureReason::ServicesDisabled) => PlaceName::ServicesDisabled,
            ResolverState::Failed(FailureReason::Unavailable) => PlaceName::Unavailable,
        }
    }

    /// Name of the current fix, only once its cascade has finished
    pub fn resolved_name(&self) -> Option<&str> {
        match &self.state {
            ResolverState::Resolved(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Mounted,
    TornDown,
}

struct Lifecycle {
    phase: Phase,
    subscription: Option<Subscription>,
}

struct Inner {
    provider: Arc<dyn GeoProvider>,
    geocoder: Arc<ReverseGeocoder>,
    options: WatchOptions,
    metrics: Arc<Metrics>,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<LocationSnapshot>,
    shutdown_tx: watch::Sender<bool>,
}

impl Inner {
    /// Apply `update` only while mounted. Returns false once torn down.
    fn publish(&self, update: impl FnOnce(&mut LocationSnapshot)) -> bool {
        let lifecycle = self.lifecycle.lock();
        if lifecycle.phase != Phase::Mounted {
            drop(lifecycle);
            self.metrics.record_stale_write_discarded();
            debug!("stale_location_write_discarded");
            return false;
        }
        self.state_tx.send_modify(update);
        true
    }

    fn fail(&self, reason: FailureReason) -> bool {
        info!(reason = ?reason, "location_resolver_failed");
        self.publish(|s| s.state = ResolverState::Failed(reason))
    }

    /// A resolved name is stable for its fix
    fn already_resolved(&self, coords: Coordinates) -> bool {
        let current = self.state_tx.borrow();
        current.coordinates == Some(coords) && matches!(current.state, ResolverState::Resolved(_))
    }

    /// Geocode one fix. Returns false once torn down.
    async fn resolve_fix(&self, coords: Coordinates) -> bool {
        let started = self.publish(|s| {
            s.coordinates = Some(coords);
            s.state = ResolverState::Resolving { last_known: s.state.last_known() };
        });
        if !started {
            return false;
        }

        let name = self.geocoder.resolve(coords).await;
        debug!(coords = %coords, place = %name, "location_resolved");
        self.publish(|s| s.state = ResolverState::Resolved(name))
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("location_resolver_started");

        let permission = self.provider.request_permission().await;
        if !self.publish(|s| s.permission = permission) {
            return;
        }
        if !permission.is_granted() {
            self.fail(FailureReason::PermissionDenied);
            return;
        }
        if !self.provider.services_enabled().await {
            self.fail(FailureReason::ServicesDisabled);
            return;
        }

        match acquire_fix(self.provider.as_ref()).await {
            Ok(coords) => {
                self.metrics.record_fix_received();
                if !self.resolve_fix(coords).await {
                    return;
                }
            }
            Err(GeoError::PermissionDenied) => {
                self.fail(FailureReason::PermissionDenied);
                return;
            }
            Err(GeoError::ServicesDisabled) => {
                self.fail(FailureReason::ServicesDisabled);
                return;
            }
            Err(e) => {
                // keep watching; a later fix can still resolve
                warn!(error = %e, "initial_fix_unavailable");
                if !self.fail(FailureReason::Unavailable) {
                    return;
                }
            }
        }

        // Newest fix wins; fixes that arrive during a cascade coalesce
        let (fix_tx, mut fix_rx) = watch::channel(None::<Coordinates>);
        let metrics = self.metrics.clone();
        let on_update: FixCallback = Arc::new(move |coords: Coordinates| {
            metrics.record_fix_received();
            fix_tx.send_replace(Some(coords));
        });

        match self.provider.watch(self.options, on_update).await {
            Ok(subscription) => {
                let mut lifecycle = self.lifecycle.lock();
                if lifecycle.phase != Phase::Mounted {
                    drop(lifecycle);
                    subscription.cancel();
                    return;
                }
                lifecycle.subscription = Some(subscription);
            }
            Err(e) => {
                warn!(error = %e, "location_watch_failed");
                return;
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                changed = fix_rx.changed() => {
                    if changed.is_err() {
                        debug!("location_watch_closed");
                        break;
                    }
                    let next = *fix_rx.borrow_and_update();
                    if let Some(coords) = next {
                        if self.already_resolved(coords) {
                            debug!(coords = %coords, "fix_already_resolved");
                            continue;
                        }
                        if !self.resolve_fix(coords).await {
                            break;
                        }
                    }
                }
            }
        }

        info!("location_resolver_stopped");
    }
}

pub struct LocationResolver {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LocationResolver {
    pub fn new(
        provider: Arc<dyn GeoProvider>,
        geocoder: Arc<ReverseGeocoder>,
        options: WatchOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LocationSnapshot::default());
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                provider,
                geocoder,
                options,
                metrics,
                lifecycle: Mutex::new(Lifecycle { phase: Phase::Created, subscription: None }),
                state_tx,
                shutdown_tx,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationSnapshot> {
        self.inner.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> LocationSnapshot {
        self.inner.state_tx.borrow().clone()
    }

    /// Start resolving. A resolver mounts at most once.
    pub fn mount(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.phase != Phase::Created {
                debug!(phase = ?lifecycle.phase, "location_resolver_mount_ignored");
                return;
            }
            lifecycle.phase = Phase::Mounted;
        }
        let shutdown = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(self.inner.clone().run(shutdown));
        *self.worker.lock() = Some(handle);
    }

    /// Stop resolving and release the watch subscription. Idempotent; safe
    /// before mount.
    pub fn teardown(&self) {
        let subscription = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.phase == Phase::TornDown {
                return;
            }
            lifecycle.phase = Phase::TornDown;
            lifecycle.subscription.take()
        };
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        self.inner.shutdown_tx.send_replace(true);
        info!("location_resolver_torn_down");
    }

    /// Wait for the worker to exit
    pub async fn wait_stopped(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "location_resolver_worker_join_failed");
            }
        }
    }
}

impl Drop for LocationResolver {
    fn drop(&mut self) {
        self.teardown();
    }
}
