//! Browser-style login handshake
//!
//! Source token + rvt cookie, credential post, account selection, then the
//! insights view that carries the meter identifiers.

use std::sync::Arc;
use std::time::Duration;

use cookie::Cookie;
use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use super::{ensure_success, html, join_url, Credentials, MeterIds, PortalError, PortalSession};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const RVT_COOKIE: &str = "rvt";
const INSIGHTS_TRIGGER: (&str, &str) = ("triggers_event", "AccountSelection.ToInsights");

pub(super) async fn login(
    base_url: &str,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<PortalSession, PortalError> {
    let jar = Arc::new(Jar::default());
    let client = reqwest::Client::builder()
        .cookie_provider(jar.clone())
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| PortalError::Http(e.to_string()))?;

    let root = join_url(base_url, "/")?;

    tracing::debug!("Getting Source token...");
    let response = client
        .get(root.clone())
        .send()
        .await
        .map_err(|e| PortalError::Http(e.to_string()))?;
    let response = ensure_success("source token", response)?;
    let landing = response.url().clone();
    let login_page = response
        .text()
        .await
        .map_err(|e| PortalError::Http(e.to_string()))?;

    let source = html::extract_source_token(&login_page)?;
    // rvt may be scoped to the page the root redirected to
    let rvt = [&landing, &root]
        .into_iter()
        .find_map(|url| jar_cookie(&jar, url, RVT_COOKIE))
        .ok_or(PortalError::MissingRvtCookie)?;

    tracing::debug!("Performing login...");
    let response = client
        .post(root.clone())
        .form(&[
            ("LoginFormData.UserName", credentials.username.as_str()),
            ("LoginFormData.Password", credentials.password.as_str()),
            ("rvt", rvt.as_str()),
            ("Source", source.as_str()),
            ("PotText", ""),
            ("__EiTokPotText", ""),
            ("ReturnUrl", ""),
            ("AccountNumber", ""),
        ])
        .send()
        .await
        .map_err(|e| PortalError::Http(e.to_string()))?;
    let mut response = ensure_success("login", response)?;

    // Login redirects to /Accounts/Init, which does not list the accounts itself
    if response.url().as_str().contains("/Accounts/Init") {
        let response_accounts = client
            .get(join_url(base_url, "/Accounts")?)
            .send()
            .await
            .map_err(|e| PortalError::Http(e.to_string()))?;
        response = ensure_success("accounts", response_accounts)?;
    }

    let accounts_page = response
        .text()
        .await
        .map_err(|e| PortalError::Http(e.to_string()))?;
    let account = html::select_account(&accounts_page, &credentials.account_number)?;

    tracing::debug!("Navigating to Insights page...");
    let response = client
        .post(join_url(base_url, "/Accounts/OnEvent")?)
        .form(&insights_form(account.fields))
        .send()
        .await
        .map_err(|e| PortalError::Http(e.to_string()))?;
    let insights_page = ensure_success("insights navigation", response)?
        .text()
        .await
        .map_err(|e| PortalError::Http(e.to_string()))?;

    let ids: MeterIds = html::extract_meter_ids(&insights_page)?;
    tracing::debug!(
        "Extracted meter parameters: premise={}, partner={}, contract={}",
        ids.premise(),
        ids.partner(),
        ids.contract()
    );

    Ok(PortalSession { client, ids })
}

/// Insights trigger first, then the card's fields; a repeated name keeps
/// its first position and takes the later value
fn insights_form(fields: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut form = vec![(INSIGHTS_TRIGGER.0.to_string(), INSIGHTS_TRIGGER.1.to_string())];
    for (name, value) in fields {
        match form.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => form.push((name, value)),
        }
    }
    form
}

fn jar_cookie(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    cookie_value(header.to_str().ok()?, name)
}

/// Value of a named cookie in a `Cookie` request header
fn cookie_value(header: &str, name: &str) -> Option<String> {
    Cookie::split_parse(header)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
