//! Page scraping for the login handshake
//!
//! Everything here is a pure function over page markup, so the handshake
//! can be exercised against saved pages. Selectors follow the portal's
//! current markup.

use scraper::{ElementRef, Html, Selector};

use super::{MeterIds, PortalError};

const SOURCE_INPUT: &str = r#"input[name="Source"]"#;
const ACCOUNT_CARD: &str = "div.my-accounts__item";
const ACCOUNT_NUMBER: &str = "p.account-number";
const ELECTRICITY_MARKER: &str = "h2.account-electricity-icon";
const EVENT_FORM: &str = r#"form[action="/Accounts/OnEvent"]"#;
const MODEL_DATA: &str = "div#modelData";

/// The account card picked for the session, with its event form fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSelection {
    pub account_number: String,
    pub fields: Vec<(String, String)>,
}

/// Hidden `Source` token from the login form
pub fn extract_source_token(page: &str) -> Result<String, PortalError> {
    let document = Html::parse_document(page);
    let input_sel = selector(SOURCE_INPUT)?;

    let input = document
        .select(&input_sel)
        .next()
        .ok_or(PortalError::MissingSourceToken)?;

    input
        .value()
        .attr("value")
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(PortalError::MissingSourceToken)
}

/// Pick the electricity account card whose number matches `account_number`
///
/// A card must carry exactly one electricity marker. Zero and several
/// matching cards both end up as [`PortalError::AccountNotFound`].
pub fn select_account(page: &str, account_number: &str) -> Result<AccountSelection, PortalError> {
    let document = Html::parse_document(page);
    let card_sel = selector(ACCOUNT_CARD)?;
    let number_sel = selector(ACCOUNT_NUMBER)?;
    let marker_sel = selector(ELECTRICITY_MARKER)?;
    let form_sel = selector(EVENT_FORM)?;

    let target = account_number.trim();

    for card in document.select(&card_sel) {
        let Some(number) = card.select(&number_sel).next().map(|p| element_text(&p)) else {
            tracing::debug!("Skipping account card without an account number");
            continue;
        };

        if number != target {
            tracing::debug!("Skipping account {} as it is not target", number);
            continue;
        }

        let markers = card.select(&marker_sel).count();
        if markers != 1 {
            tracing::info!("Found account {} but is not Electricity", number);
            continue;
        }

        let form = card
            .select(&form_sel)
            .next()
            .ok_or(PortalError::MissingEventForm)?;

        return Ok(AccountSelection {
            account_number: number,
            fields: form_fields(&form)?,
        });
    }

    Err(PortalError::AccountNotFound)
}

/// Premise, partner and contract from the insights page's `modelData` div
pub fn extract_meter_ids(page: &str) -> Result<MeterIds, PortalError> {
    let document = Html::parse_document(page);
    let model_sel = selector(MODEL_DATA)?;

    let model = document
        .select(&model_sel)
        .next()
        .ok_or(PortalError::MissingModelData)?;
    let attr = |name: &str| model.value().attr(name).unwrap_or_default().to_string();

    MeterIds::new(attr("data-premise"), attr("data-partner"), attr("data-contract"))
        .ok_or(PortalError::MissingMeterIds)
}

fn form_fields(form: &ElementRef<'_>) -> Result<Vec<(String, String)>, PortalError> {
    let input_sel = selector("input")?;

    Ok(form
        .select(&input_sel)
        .filter_map(|input| {
            let name = input.value().attr("name").filter(|name| !name.is_empty())?;
            // Inputs without a value attribute are not submitted
            let value = input.value().attr("value")?;
            Some((name.to_string(), value.to_string()))
        })
        .collect())
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn selector(css: &str) -> Result<Selector, PortalError> {
    Selector::parse(css).map_err(|e| PortalError::Parse(format!("selector {}: {}", css, e)))
}
