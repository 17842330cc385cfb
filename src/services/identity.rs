//! Persisted employee identity and the re-auth command
//!
//! The store is the only writer of the identity keys. Changes are published
//! on a `watch` channel; sequence numbers let observers tell a fresh sign-in
//! or re-auth request apart from a repeated value.

use crate::domain::types::SessionIdentity;
use crate::error::StoreError;
use crate::io::kv_store::KeyValueStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

const PHONE_KEY: &str = "employee_phone";
const TOKEN_KEY: &str = "employee_token";
const NAME_KEY: &str = "employee_name";
const FORCE_SPLASH_KEY: &str = "force_splash";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityState {
    pub identity: Option<SessionIdentity>,
    /// Bumped on every successful sign-in
    pub signin_seq: u64,
    /// Bumped on every re-auth request
    pub reauth_seq: u64,
}

pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
    state_tx: watch::Sender<IdentityState>,
}

impl IdentityStore {
    /// Load the persisted identity. An identity exists iff a non-empty name
    /// is stored. A pending `force_splash` from an earlier run counts as a
    /// re-auth request.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let identity = read_identity(store.as_ref());
        let pending_reauth = store.get(FORCE_SPLASH_KEY).as_deref() == Some("1");
        info!(
            signed_in = %identity.is_some(),
            pending_reauth = %pending_reauth,
            "identity_store_opened"
        );
        let state = IdentityState { identity, signin_seq: 0, reauth_seq: u64::from(pending_reauth) };
        let (state_tx, _) = watch::channel(state);
        Self { store, state_tx }
    }

    pub fn current(&self) -> Option<SessionIdentity> {
        self.state_tx.borrow().identity.clone()
    }

    pub fn state(&self) -> IdentityState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state_tx.subscribe()
    }

    pub fn sign_in(&self, identity: SessionIdentity) -> Result<(), StoreError> {
        self.store.set(PHONE_KEY, &identity.employee_phone)?;
        self.store.set(TOKEN_KEY, &identity.token)?;
        self.store.set(NAME_KEY, &identity.employee_name)?;
        info!(employee = %identity.employee_name, "employee_signed_in");
        self.state_tx.send_modify(|s| {
            s.identity = Some(identity);
            s.signin_seq += 1;
        });
        Ok(())
    }

    pub fn sign_out(&self) -> Result<(), StoreError> {
        self.store.remove(TOKEN_KEY)?;
        self.store.remove(PHONE_KEY)?;
        self.store.remove(NAME_KEY)?;
        info!("employee_signed_out");
        self.state_tx.send_modify(|s| s.identity = None);
        Ok(())
    }

    /// Ask the session gate to show the sign-in overlay
    pub fn request_reauth(&self) {
        if let Err(e) = self.store.set(FORCE_SPLASH_KEY, "1") {
            // the in-memory request below still reaches the gate
            warn!(error = %e, "force_splash_persist_failed");
        }
        info!("reauth_requested");
        self.state_tx.send_modify(|s| s.reauth_seq += 1);
    }

    /// Consume the durable re-auth flag. True at most once per request.
    pub fn take_reauth_request(&self) -> bool {
        if self.store.get(FORCE_SPLASH_KEY).as_deref() != Some("1") {
            return false;
        }
        if let Err(e) = self.store.remove(FORCE_SPLASH_KEY) {
            warn!(error = %e, "force_splash_clear_failed");
        }
        true
    }
}

fn read_identity(store: &dyn KeyValueStore) -> Option<SessionIdentity> {
    let name = store.get(NAME_KEY).filter(|n| !n.trim().is_empty())?;
    Some(SessionIdentity {
        employee_name: name,
        employee_phone: store.get(PHONE_KEY).unwrap_or_default(),
        token: store.get(TOKEN_KEY).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::kv_store::{FileStore, MemoryStore};
    use tempfile::tempdir;

    fn asha() -> SessionIdentity {
        SessionIdentity {
            employee_name: "Asha".into(),
            employee_phone: "9876543210".into(),
            token: "tok-1".into(),
        }
    }

    #[test]
    fn test_sign_in_persists_and_publishes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = Arc::new(FileStore::open(&path).unwrap());
        let identity = IdentityStore::open(store);
        let rx = identity.subscribe();

        identity.sign_in(asha()).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().signin_seq, 1);

        let reopened = IdentityStore::open(Arc::new(FileStore::open(&path).unwrap()));
        assert_eq!(reopened.current(), Some(asha()));
    }

    #[test]
    fn test_identity_requires_name() {
        let store = Arc::new(MemoryStore::new());
        store.set("employee_phone", "9876543210").unwrap();
        store.set("employee_token", "tok").unwrap();
        store.set("employee_name", "  ").unwrap();
        assert_eq!(IdentityStore::open(store).current(), None);
    }

    #[test]
    fn test_sign_out_clears_keys() {
        let store = Arc::new(MemoryStore::new());
        let identity = IdentityStore::open(store.clone());
        identity.sign_in(asha()).unwrap();
        identity.sign_out().unwrap();

        assert_eq!(identity.current(), None);
        assert_eq!(store.get("employee_name"), None);
        assert_eq!(store.get("employee_token"), None);
    }

    #[test]
    fn test_reauth_flag_is_consumed_once() {
        let store = Arc::new(MemoryStore::new());
        let identity = IdentityStore::open(store.clone());

        identity.request_reauth();
        assert_eq!(identity.state().reauth_seq, 1);
        assert_eq!(store.get("force_splash").as_deref(), Some("1"));

        assert!(identity.take_reauth_request());
        assert!(!identity.take_reauth_request());
        assert_eq!(store.get("force_splash"), None);
    }

    #[test]
    fn test_pending_flag_from_previous_run() {
        let store = Arc::new(MemoryStore::new());
        store.set("force_splash", "1").unwrap();
        let identity = IdentityStore::open(store);
        assert_eq!(identity.state().reauth_seq, 1);
        assert!(identity.take_reauth_request());
    }
}
