//! Sign-in overlay gate
//!
//! After a fixed splash delay the gate re-evaluates on every identity event:
//! a re-auth request forces the overlay until the next successful sign-in,
//! a missing identity shows it, otherwise it is hidden.

use crate::services::identity::{IdentityState, IdentityStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Branding splash shown before the gate starts evaluating
pub const SPLASH_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Splash,
    SignInRequired,
    Hidden,
}

impl OverlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayState::Splash => "splash",
            OverlayState::SignInRequired => "sign_in_required",
            OverlayState::Hidden => "hidden",
        }
    }
}

pub struct SessionGate {
    identity: Arc<IdentityStore>,
    overlay_tx: watch::Sender<OverlayState>,
}

/// Evaluation state carried between identity events
#[derive(Debug, Default)]
struct GateMemory {
    last_reauth_seq: u64,
    /// `signin_seq` at the time the overlay was forced
    forced_at: Option<u64>,
}

impl GateMemory {
    fn evaluate(&mut self, state: &IdentityState, flag_consumed: bool) -> OverlayState {
        let bumped = state.reauth_seq != self.last_reauth_seq;
        self.last_reauth_seq = state.reauth_seq;
        if flag_consumed || bumped {
            self.forced_at = Some(state.signin_seq);
        }
        if self.forced_at.is_some_and(|seq| state.signin_seq > seq) {
            self.forced_at = None;
        }

        if self.forced_at.is_some() || state.identity.is_none() {
            OverlayState::SignInRequired
        } else {
            OverlayState::Hidden
        }
    }
}

impl SessionGate {
    pub fn new(identity: Arc<IdentityStore>) -> Self {
        let (overlay_tx, _) = watch::channel(OverlayState::Splash);
        Self { identity, overlay_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<OverlayState> {
        self.overlay_tx.subscribe()
    }

    pub fn overlay(&self) -> OverlayState {
        *self.overlay_tx.borrow()
    }

    fn set_overlay(&self, next: OverlayState) {
        let changed = self.overlay_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!(overlay = %next.as_str(), "overlay_changed");
        }
    }

    /// Run until `shutdown` flips
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(splash_ms = %SPLASH_DELAY.as_millis(), "session_gate_started");

        tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(SPLASH_DELAY) => {}
        }

        let mut identity_rx = self.identity.subscribe();
        // the startup value is a real observation, pending re-auth included
        let mut memory = GateMemory::default();

        loop {
            let state = identity_rx.borrow_and_update().clone();
            let flag_consumed = self.identity.take_reauth_request();
            let next = memory.evaluate(&state, flag_consumed);
            debug!(
                signed_in = %state.identity.is_some(),
                flag_consumed = %flag_consumed,
                forced = %memory.forced_at.is_some(),
                "session_gate_evaluated"
            );
            self.set_overlay(next);

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                changed = identity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("session_gate_stopped");
    }
}
