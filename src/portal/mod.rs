//! Electric Ireland portal client
//!
//! Logs in through the account web UI the way a browser does, then reads
//! usage and bill projections from the internal MeterInsight JSON API.
//! Endpoints (relative to the portal root):
//! - / - login form (Source token + rvt cookie)
//! - /Accounts - account cards
//! - /Accounts/OnEvent - account selection, lands on the insights view
//! - /MeterInsight/{partner}/{contract}/{premise}/... - usage and billing JSON

mod auth;
pub mod html;
pub mod normalize;

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://youraccountonline.electricireland.ie";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Login details for one portal account
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Account number as printed on the account card
    pub account_number: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("account_number", &self.account_number)
            .finish()
    }
}

/// Identifiers that scope a session to one meter. All three are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterIds {
    premise: String,
    partner: String,
    contract: String,
}

impl MeterIds {
    pub fn new(
        premise: impl Into<String>,
        partner: impl Into<String>,
        contract: impl Into<String>,
    ) -> Option<Self> {
        let ids = Self {
            premise: premise.into(),
            partner: partner.into(),
            contract: contract.into(),
        };

        if ids.premise.is_empty() || ids.partner.is_empty() || ids.contract.is_empty() {
            None
        } else {
            Some(ids)
        }
    }

    pub fn premise(&self) -> &str {
        &self.premise
    }

    pub fn partner(&self) -> &str {
        &self.partner
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    fn endpoint_prefix(&self) -> String {
        format!(
            "/MeterInsight/{}/{}/{}",
            self.partner, self.contract, self.premise
        )
    }
}

/// One normalized usage reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDatapoint {
    #[serde(serialize_with = "serialize_whole_as_integer")]
    pub consumption: f64,
    #[serde(serialize_with = "serialize_whole_as_integer")]
    pub cost: f64,
    /// End of the interval, epoch seconds
    pub interval_end: i64,
}

/// `10.0` goes out as `10`, as the portal sent it
fn serialize_whole_as_integer<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    if value.fract() == 0.0 && value.abs() < MAX_EXACT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// An authenticated HTTP session plus the meter it is scoped to
pub struct PortalSession {
    client: reqwest::Client,
    ids: MeterIds,
}

impl PortalSession {
    pub fn ids(&self) -> &MeterIds {
        &self.ids
    }
}

pub struct ElectricIrelandScraper {
    credentials: Credentials,
    base_url: String,
    timeout: Duration,
    session: Option<PortalSession>,
}

impl ElectricIrelandScraper {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            session: None,
        }
    }

    /// Point the client at another portal root (a local mock in tests)
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, PortalError> {
        parse_base_url(base_url)?;
        self.base_url = base_url.to_string();
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn meter_ids(&self) -> Option<&MeterIds> {
        self.session.as_ref().map(PortalSession::ids)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Drop the current session; the next `ensure_authenticated` logs in again
    pub fn invalidate(&mut self) {
        self.session = None;
    }

    /// Run the full login handshake with a fresh cookie jar
    pub async fn authenticate(&self) -> Result<PortalSession, PortalError> {
        match auth::login(&self.base_url, &self.credentials, self.timeout).await {
            Ok(session) => Ok(session),
            Err(err) => {
                match &err {
                    PortalError::AccountNotFound => tracing::warn!(
                        "Failed to find target account {}; please verify it is the correct one",
                        self.credentials.account_number
                    ),
                    _ => tracing::error!("Portal login failed: {}", err),
                }
                Err(err)
            }
        }
    }

    /// Log in only when no session is held
    pub async fn ensure_authenticated(&mut self) -> Result<&MeterIds, PortalError> {
        if self.session.is_none() {
            let session = self.authenticate().await?;
            self.session = Some(session);
        }

        self.meter_ids().ok_or(PortalError::NotAuthenticated)
    }

    /// Replace the session with a fresh login, or clear it if the login fails
    pub async fn refresh_credentials(&mut self) {
        tracing::info!("Trying to refresh credentials...");
        self.session = self.authenticate().await.ok();
    }

    pub async fn fetch_usage(
        &self,
        target_date: NaiveDate,
        is_granular: bool,
    ) -> Result<Vec<UsageDatapoint>, PortalError> {
        let session = self.session.as_ref().ok_or(PortalError::NotAuthenticated)?;
        let date = target_date.format("%Y-%m-%d").to_string();
        let prefix = session.ids.endpoint_prefix();

        let request = if is_granular {
            let url = self.endpoint(&format!("{}/hourly-usage", prefix))?;
            session.client.get(url).query(&[("date", date.as_str())])
        } else {
            let url = self.endpoint(&format!("{}/usage-daily", prefix))?;
            session
                .client
                .get(url)
                .query(&[("start", date.as_str()), ("end", date.as_str())])
        };

        let response = request
            .send()
            .await
            .map_err(|e| PortalError::Http(e.to_string()))?;
        let response = ensure_success("usage", response)?;
        let payload = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| PortalError::Parse(format!("Usage response: {}", e)))?;

        let raw = normalize::extract_datapoints(payload)?;
        if raw.is_empty() {
            tracing::debug!("No data available for {}", date);
            return Ok(Vec::new());
        }

        let points: Vec<UsageDatapoint> = raw
            .iter()
            .filter_map(normalize::normalize_datapoint)
            .collect();
        tracing::debug!("Normalized {} datapoints for {}", points.len(), date);
        Ok(points)
    }

    /// Usage for one day; any failure is logged and yields an empty list
    pub async fn get_data(&self, target_date: NaiveDate, is_granular: bool) -> Vec<UsageDatapoint> {
        match self.fetch_usage(target_date, is_granular).await {
            Ok(points) => points,
            Err(PortalError::NotAuthenticated) => {
                tracing::error!("Session or meter parameters not initialized");
                Vec::new()
            }
            Err(err @ PortalError::UnexpectedFormat(_)) => {
                tracing::warn!("{}", err);
                Vec::new()
            }
            Err(err) => {
                tracing::error!("Failed to get data for {}: {}", target_date, err);
                Vec::new()
            }
        }
    }

    pub async fn fetch_bill_projection(&self) -> Result<serde_json::Value, PortalError> {
        let session = self.session.as_ref().ok_or(PortalError::NotAuthenticated)?;
        let url = self.endpoint(&format!("{}/bill-projection", session.ids.endpoint_prefix()))?;

        let response = session
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PortalError::Http(e.to_string()))?;
        let response = ensure_success("bill projection", response)?;
        let payload = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| PortalError::Parse(format!("Bill projection response: {}", e)))?;

        Ok(normalize::unwrap_bill_projection(payload))
    }

    /// Bill projection, or `None` on any failure
    pub async fn get_bill_projection(&self) -> Option<serde_json::Value> {
        match self.fetch_bill_projection().await {
            Ok(projection) => Some(projection),
            Err(PortalError::NotAuthenticated) => {
                tracing::error!("Session or meter parameters not initialized");
                None
            }
            Err(err) => {
                tracing::error!("Failed to get bill projection: {}", err);
                None
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, PortalError> {
        join_url(&self.base_url, path)
    }
}

/// Portal root; endpoint paths are absolute, so the base URL carries none
fn parse_base_url(base_url: &str) -> Result<Url, PortalError> {
    let url =
        Url::parse(base_url).map_err(|e| PortalError::InvalidUrl(format!("{}: {}", base_url, e)))?;
    if url.cannot_be_a_base() || url.path() != "/" {
        return Err(PortalError::InvalidUrl(format!(
            "{}: base URL must not have a path",
            base_url
        )));
    }
    Ok(url)
}

fn join_url(base_url: &str, path: &str) -> Result<Url, PortalError> {
    parse_base_url(base_url)?
        .join(path)
        .map_err(|e| PortalError::InvalidUrl(format!("{}: {}", path, e)))
}

fn ensure_success(
    step: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, PortalError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(PortalError::Status {
            step,
            status: status.as_u16(),
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    #[error("Portal request failed: {0}")]
    Http(String),
    #[error("Portal {step} request returned HTTP {status}")]
    Status { step: &'static str, status: u16 },
    #[error("Could not retrieve Source token from login page")]
    MissingSourceToken,
    #[error("Could not find rvt cookie")]
    MissingRvtCookie,
    #[error("Target account not found")]
    AccountNotFound,
    #[error("Account card has no insights event form")]
    MissingEventForm,
    #[error("Failed to find modelData div")]
    MissingModelData,
    #[error("Missing required parameters in modelData div")]
    MissingMeterIds,
    #[error("Session or meter parameters not initialized")]
    NotAuthenticated,
    #[error("Unexpected response format: {0}")]
    UnexpectedFormat(String),
    #[error("Failed to parse portal response: {0}")]
    Parse(String),
    #[error("Invalid portal URL {0}")]
    InvalidUrl(String),
}
