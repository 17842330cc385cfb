//! Accounting/attendance backend over HTTP
//!
//! Three seams, one client:
//! - `PunchSubmitter` - attendance event submission (fire-and-forget from the
//!   punch session's point of view)
//! - `EmployeeAuth` - employee sign-in by phone number
//! - `AccountingSource` - company list and party/stock rows

use crate::domain::record::Record;
use crate::domain::types::PunchEvent;
use crate::error::{BackendError, SubmissionFailure};
use crate::infra::config::Config;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

#[async_trait]
pub trait PunchSubmitter: Send + Sync {
    async fn submit_punch(&self, event: &PunchEvent) -> Result<(), SubmissionFailure>;
}

#[async_trait]
pub trait EmployeeAuth: Send + Sync {
    async fn sign_in(&self, phone: &str) -> Result<SignInResponse, BackendError>;
}

#[async_trait]
pub trait AccountingSource: Send + Sync {
    async fn company_names(&self) -> Result<Vec<String>, BackendError>;
    async fn parties(&self, company: &str) -> Result<Vec<Record>, BackendError>;
    async fn stocks(&self, company: &str) -> Result<Vec<Record>, BackendError>;
}

/// Sign-in response. The backend has returned the token in several places
/// over time, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignInResponse {
    #[serde(default)]
    pub token: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub employee: Option<EmployeeInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeeInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub token: Option<Value>,
}

fn value_text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl SignInResponse {
    /// Token from `token`, then `employee.token`, then `id`
    pub fn token(&self) -> Option<String> {
        value_text(&self.token)
            .or_else(|| self.employee.as_ref().and_then(|e| value_text(&e.token)))
            .or_else(|| value_text(&self.id))
    }

    pub fn employee_name(&self) -> Option<String> {
        self.employee
            .as_ref()
            .and_then(|e| e.name.clone())
            .filter(|n| !n.trim().is_empty())
    }
}

/// Row-collection envelope: `{ "data": [ ... ] }`
#[derive(Debug, Deserialize)]
struct RowsEnvelope {
    #[serde(default)]
    data: Vec<Value>,
}

fn into_records(rows: Vec<Value>) -> Vec<Record> {
    rows.into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        Self::new(config.backend_url(), config.backend_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_rows(&self, path: &str) -> Result<Vec<Record>, BackendError> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        let envelope: RowsEnvelope = response.json().await?;
        debug!(path = %path, rows = %envelope.data.len(), "backend_rows_fetched");
        Ok(into_records(envelope.data))
    }
}

#[async_trait]
impl PunchSubmitter for BackendClient {
    async fn submit_punch(&self, event: &PunchEvent) -> Result<(), SubmissionFailure> {
        let response = self.http.post(self.url("/trader-activity")).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubmissionFailure(format!("backend returned status {}", status.as_u16())));
        }
        info!(id = %event.id, direction = %event.direction.as_str(), "punch_acknowledged");
        Ok(())
    }
}

#[async_trait]
impl EmployeeAuth for BackendClient {
    async fn sign_in(&self, phone: &str) -> Result<SignInResponse, BackendError> {
        let response = self
            .http
            .post(self.url("/employee/signin"))
            .json(&serde_json::json!({ "phone": phone }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AccountingSource for BackendClient {
    async fn company_names(&self) -> Result<Vec<String>, BackendError> {
        let rows = self.get_rows("/companies").await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("companyName").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn parties(&self, company: &str) -> Result<Vec<Record>, BackendError> {
        self.get_rows(&format!("/companies/{}/parties", urlencoding::encode(company))).await
    }

    async fn stocks(&self, company: &str) -> Result<Vec<Record>, BackendError> {
        self.get_rows(&format!("/companies/{}/stocks", urlencoding::encode(company))).await
    }
}
