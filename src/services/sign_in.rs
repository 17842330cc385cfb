//! Employee sign-in by name and phone number

use crate::domain::types::SessionIdentity;
use crate::error::SignInError;
use crate::io::backend::EmployeeAuth;
use crate::services::identity::IdentityStore;
use std::sync::Arc;
use tracing::{info, warn};

const PHONE_DIGITS: usize = 10;

/// Digits of `raw` if exactly ten remain after stripping everything else
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == PHONE_DIGITS).then_some(digits)
}

pub struct SignInFlow {
    auth: Arc<dyn EmployeeAuth>,
    identity: Arc<IdentityStore>,
}

impl SignInFlow {
    pub fn new(auth: Arc<dyn EmployeeAuth>, identity: Arc<IdentityStore>) -> Self {
        Self { auth, identity }
    }

    pub async fn sign_in(&self, name: &str, phone: &str) -> Result<SessionIdentity, SignInError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SignInError::MissingName);
        }
        let phone = normalize_phone(phone).ok_or(SignInError::InvalidPhone)?;

        let response = match self.auth.sign_in(&phone).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "employee_sign_in_failed");
                return Err(e.into());
            }
        };

        let identity = SessionIdentity {
            employee_name: response.employee_name().unwrap_or_else(|| name.to_string()),
            token: response.token().unwrap_or_else(|| phone.clone()),
            employee_phone: phone,
        };
        self.identity.sign_in(identity.clone())?;
        info!(employee = %identity.employee_name, "sign_in_completed");
        Ok(identity)
    }

    pub fn sign_out(&self) -> Result<(), SignInError> {
        self.identity.sign_out()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::io::backend::SignInResponse;
    use crate::io::kv_store::MemoryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct StubAuth {
        response: Option<serde_json::Value>,
        phones: Mutex<Vec<String>>,
    }

    impl StubAuth {
        fn replying(response: serde_json::Value) -> Arc<Self> {
            Arc::new(Self { response: Some(response), phones: Mutex::new(Vec::new()) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { response: None, phones: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl EmployeeAuth for StubAuth {
        async fn sign_in(&self, phone: &str) -> Result<SignInResponse, BackendError> {
            self.phones.lock().push(phone.to_string());
            match &self.response {
                Some(body) => Ok(serde_json::from_value(body.clone()).unwrap_or_default()),
                None => Err(BackendError::Status(401)),
            }
        }
    }

    fn identity() -> Arc<IdentityStore> {
        Arc::new(IdentityStore::open(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+91 98765-43210"), None);
        assert_eq!(normalize_phone("98765 43210").as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("(987) 654-3210").as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("12345"), None);
    }

    #[tokio::test]
    async fn test_validation_before_backend() {
        let auth = StubAuth::replying(json!({ "token": "t" }));
        let flow = SignInFlow::new(auth.clone(), identity());

        assert!(matches!(flow.sign_in("  ", "9876543210").await, Err(SignInError::MissingName)));
        assert!(matches!(flow.sign_in("Asha", "98765").await, Err(SignInError::InvalidPhone)));
        assert!(auth.phones.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_prefers_backend_name_and_token() {
        let auth = StubAuth::replying(json!({ "employee": { "name": "Asha K", "token": "emp-tok" } }));
        let store = identity();
        let flow = SignInFlow::new(auth.clone(), store.clone());

        let signed = flow.sign_in("asha", "98765 43210").await.unwrap();
        assert_eq!(signed.employee_name, "Asha K");
        assert_eq!(signed.token, "emp-tok");
        assert_eq!(signed.employee_phone, "9876543210");
        assert_eq!(store.current(), Some(signed));
        assert_eq!(auth.phones.lock().as_slice(), &["9876543210".to_string()]);
    }

    #[tokio::test]
    async fn test_sign_in_falls_back_to_entered_name_and_phone() {
        let flow = SignInFlow::new(StubAuth::replying(json!({})), identity());
        let signed = flow.sign_in("Asha", "9876543210").await.unwrap();
        assert_eq!(signed.employee_name, "Asha");
        assert_eq!(signed.token, "9876543210");
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_identity_untouched() {
        let store = identity();
        let flow = SignInFlow::new(StubAuth::failing(), store.clone());
        assert!(matches!(
            flow.sign_in("Asha", "9876543210").await,
            Err(SignInError::Backend(BackendError::Status(401)))
        ));
        assert_eq!(store.current(), None);

        flow.sign_out().unwrap();
    }
}
