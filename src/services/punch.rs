//! Punch session - duty status, shop/amount entry and punch submission
//!
//! `submit` validates against state already held (entered fields, the
//! latest location snapshot) and never waits on the network: the event is
//! handed to the submitter on a spawned task. Only one submission may be
//! pending at a time.

use crate::domain::party::Party;
use crate::domain::record::parse_number;
use crate::domain::types::{new_uuid_v7, Direction, PunchEvent, SessionIdentity};
use crate::error::{SubmitError, ValidationFailure};
use crate::infra::metrics::Metrics;
use crate::io::backend::PunchSubmitter;
use crate::io::kv_store::KeyValueStore;
use crate::services::identity::IdentityStore;
use crate::services::resolver::LocationSnapshot;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LAST_PUNCH_KEY: &str = "last_punch";

/// Clears the single-flight flag when dropped, also when the submitting task
/// panics
struct InFlightRelease(Arc<AtomicBool>);

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyStatus {
    OffDuty,
    OnDuty,
}

impl DutyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DutyStatus::OffDuty => "off_duty",
            DutyStatus::OnDuty => "on_duty",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    PunchedIn { at: DateTime<Utc> },
    PunchedOut(PunchEvent),
    /// No identity; the sign-in overlay was requested instead
    SignInRequired,
}

/// Dismissible user-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}

/// Summary of the most recent successful punch-in, kept in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPunch {
    pub shop_name: String,
    pub amount: f64,
    pub date: String,
    pub time: String,
    pub place: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
}

impl LastPunch {
    fn from_event(event: &PunchEvent) -> Self {
        let local = event.timestamp.with_timezone(&chrono::Local);
        Self {
            shop_name: event.shop_name.clone(),
            amount: event.amount,
            date: local.format("%Y-%m-%d").to_string(),
            time: local.format("%H:%M:%S").to_string(),
            place: event.place_name.clone(),
            employee_name: (!event.employee_name.is_empty()).then(|| event.employee_name.clone()),
        }
    }
}

#[derive(Debug)]
struct Entry {
    status: DutyStatus,
    shop: String,
    amount: String,
    entered_at: Option<DateTime<Utc>>,
}

pub struct PunchSession {
    identity: Arc<IdentityStore>,
    location: watch::Receiver<LocationSnapshot>,
    submitter: Arc<dyn PunchSubmitter>,
    store: Arc<dyn KeyValueStore>,
    metrics: Arc<Metrics>,
    company: Option<String>,
    entry: Mutex<Entry>,
    in_flight: Arc<AtomicBool>,
    notice: Arc<Mutex<Option<Notice>>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl PunchSession {
    pub fn new(
        identity: Arc<IdentityStore>,
        location: watch::Receiver<LocationSnapshot>,
        submitter: Arc<dyn PunchSubmitter>,
        store: Arc<dyn KeyValueStore>,
        metrics: Arc<Metrics>,
        company: Option<String>,
    ) -> Self {
        Self {
            identity,
            location,
            submitter,
            store,
            metrics,
            company,
            entry: Mutex::new(Entry {
                status: DutyStatus::OffDuty,
                shop: String::new(),
                amount: String::new(),
                entered_at: None,
            }),
            in_flight: Arc::new(AtomicBool::new(false)),
            notice: Arc::new(Mutex::new(None)),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn status(&self) -> DutyStatus {
        self.entry.lock().status
    }

    pub fn entered_at(&self) -> Option<DateTime<Utc>> {
        self.entry.lock().entered_at
    }

    pub fn shop(&self) -> String {
        self.entry.lock().shop.clone()
    }

    pub fn amount(&self) -> String {
        self.entry.lock().amount.clone()
    }

    pub fn set_shop(&self, shop: &str) {
        self.entry.lock().shop = shop.to_string();
    }

    pub fn set_amount(&self, amount: &str) {
        self.entry.lock().amount = amount.to_string();
    }

    /// Fill shop and amount from a suggested party
    pub fn pick_party(&self, party: &Party) {
        let mut entry = self.entry.lock();
        entry.shop = party.name.clone();
        entry.amount = party.suggested_amount().to_string();
        debug!(shop = %entry.shop, amount = %entry.amount, "party_picked");
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn location(&self) -> LocationSnapshot {
        self.location.borrow().clone()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.notice.lock().clone()
    }

    pub fn dismiss_notice(&self) {
        self.notice.lock().take();
    }

    pub fn last_punch(&self) -> Option<LastPunch> {
        let raw = self.store.get(LAST_PUNCH_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(last) => Some(last),
            Err(e) => {
                warn!(error = %e, "last_punch_undecodable");
                None
            }
        }
    }

    /// Flip duty status. Going on duty needs a signed-in employee; going off
    /// duty always succeeds and emits a punch-out event without validation.
    pub fn toggle(&self) -> ToggleOutcome {
        let mut entry = self.entry.lock();
        match entry.status {
            DutyStatus::OffDuty => {
                let Some(identity) = self.identity.current() else {
                    drop(entry);
                    info!("duty_start_requires_sign_in");
                    self.identity.request_reauth();
                    return ToggleOutcome::SignInRequired;
                };
                let at = Utc::now();
                entry.status = DutyStatus::OnDuty;
                entry.entered_at = Some(at);
                info!(employee = %identity.employee_name, "duty_started");
                ToggleOutcome::PunchedIn { at }
            }
            DutyStatus::OnDuty => {
                entry.status = DutyStatus::OffDuty;
                entry.entered_at = None;
                let amount = parse_number(&entry.amount).filter(|a| *a >= 0.0).unwrap_or(0.0);
                let snapshot = self.location();
                let event = self.build_event(
                    Direction::Out,
                    entry.shop.clone(),
                    amount,
                    &snapshot,
                    snapshot.place_name().to_string(),
                );
                drop(entry);
                info!(id = %event.id, shop = %event.shop_name, "duty_ended");
                match Handle::try_current() {
                    Ok(runtime) => self.dispatch(&runtime, event.clone(), None),
                    Err(e) => {
                        self.metrics.record_submission_failure();
                        warn!(id = %event.id, error = %e, "punch_out_not_dispatched");
                        *self.notice.lock() = Some(Notice { message: SubmitError::NoRuntime.to_string() });
                    }
                }
                ToggleOutcome::PunchedOut(event)
            }
        }
    }

    /// Validate the entered punch and dispatch it on the current tokio
    /// runtime
    pub fn submit(&self) -> Result<PunchEvent, SubmitError> {
        let runtime = Handle::try_current().map_err(|e| {
            warn!(error = %e, "punch_submit_outside_runtime");
            SubmitError::NoRuntime
        })?;

        if self.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            debug!("punch_submit_rejected_in_flight");
            return Err(SubmitError::InFlight);
        }
        let release = InFlightRelease(self.in_flight.clone());

        let event = match self.take_validated() {
            Ok(event) => event,
            Err(failure) => {
                self.metrics.record_punch_rejected();
                info!(code = %failure.code(), "punch_rejected");
                return Err(failure.into());
            }
        };

        self.remember(&event);
        self.dispatch(&runtime, event.clone(), Some(release));
        Ok(event)
    }

    /// Run the four checks in order; on success clear the entry fields and
    /// return the punch-in event
    fn take_validated(&self) -> Result<PunchEvent, ValidationFailure> {
        let mut entry = self.entry.lock();

        let shop = entry.shop.trim().to_string();
        if shop.is_empty() {
            return Err(ValidationFailure::MissingShop);
        }

        let amount = parse_number(&entry.amount)
            .filter(|a| *a > 0.0)
            .ok_or(ValidationFailure::MissingAmount)?;

        let snapshot = self.location();
        if !snapshot.permission.is_granted() {
            return Err(ValidationFailure::LocationPermissionRequired);
        }
        let place = snapshot.resolved_name().ok_or(ValidationFailure::LocationNotReady)?.to_string();

        let event = self.build_event(Direction::In, shop, amount, &snapshot, place);

        // cleared optimistically; a failed submission does not restore them
        entry.shop.clear();
        entry.amount.clear();
        Ok(event)
    }

    fn build_event(
        &self,
        direction: Direction,
        shop: String,
        amount: f64,
        snapshot: &LocationSnapshot,
        place: String,
    ) -> PunchEvent {
        let identity: Option<SessionIdentity> = self.identity.current();
        PunchEvent {
            id: new_uuid_v7(),
            direction,
            employee_id: identity
                .as_ref()
                .map(|i| i.employee_phone.clone())
                .filter(|p| !p.is_empty()),
            employee_name: identity.map(|i| i.employee_name).unwrap_or_default(),
            company_name: self.company.clone().unwrap_or_default(),
            shop_name: shop,
            amount,
            coordinates: snapshot.coordinates,
            place_name: place,
            timestamp: Utc::now(),
        }
    }

    fn remember(&self, event: &PunchEvent) {
        let last = LastPunch::from_event(event);
        let stored = serde_json::to_string(&last)
            .map_err(crate::error::StoreError::from)
            .and_then(|raw| self.store.set(LAST_PUNCH_KEY, &raw));
        if let Err(e) = stored {
            warn!(error = %e, "last_punch_persist_failed");
        }
    }

    fn dispatch(&self, runtime: &Handle, event: PunchEvent, release: Option<InFlightRelease>) {
        let submitter = self.submitter.clone();
        let metrics = self.metrics.clone();
        let notice = self.notice.clone();

        metrics.record_punch_dispatched();
        info!(
            id = %event.id,
            direction = %event.direction.as_str(),
            shop = %event.shop_name,
            amount = %event.amount,
            place = %event.place_name,
            "punch_submitted"
        );

        let handle = runtime.spawn(async move {
            let _release = release;
            if let Err(e) = submitter.submit_punch(&event).await {
                metrics.record_submission_failure();
                warn!(id = %event.id, error = %e, "punch_submission_failed");
                *notice.lock() = Some(Notice { message: e.to_string() });
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every dispatched submission to finish
    pub async fn wait_idle(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "punch_dispatch_join_failed");
            }
        }
    }
}
