// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use axum::{
    extract::{Path, Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;

use super::smart::SmartSession;
use super::{ApiError, HOSPITAL_ISSUER_ROUTER_PATH, PRESCRIPTIONS_PATH};
use crate::gateway::{views, AppState};
use crate::prescription::{create_prescription_offer, DEFAULT_VALIDITY_DAYS, MAX_VALIDITY_DAYS};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route(PRESCRIPTIONS_PATH, get(prescriptions))
        .route(&format!("{PRESCRIPTIONS_PATH}/{{id}}/offer"), get(offer))
}

fn prescriptions_path() -> String {
    format!("{HOSPITAL_ISSUER_ROUTER_PATH}{PRESCRIPTIONS_PATH}")
}

/// Leading integer of `raw`, the way HTML form values are read leniently
/// (`"7"` and `"7days"` are 7). Anything else is the default validity.
/// Values beyond [`MAX_VALIDITY_DAYS`] either way are refused.
pub fn parse_validity_days(raw: Option<&str>) -> Result<i64, ApiError> {
    let Some(raw) = raw.map(str::trim_start) else {
        return Ok(DEFAULT_VALIDITY_DAYS);
    };
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return Ok(DEFAULT_VALIDITY_DAYS);
    }
    match digits.parse::<i64>() {
        Ok(n) if n <= MAX_VALIDITY_DAYS => Ok(sign * n),
        _ => Err(ApiError::BadRequest(format!(
            "validityDays must be between -{MAX_VALIDITY_DAYS} and {MAX_VALIDITY_DAYS}"
        ))),
    }
}

async fn landing(_session: SmartSession) -> Html<String> {
    views::issuer_landing(&prescriptions_path())
}

async fn prescriptions(
    _session: SmartSession,
    State(state): State<AppState>,
) -> Result<Html<String>, ApiError> {
    let requests = state.prescriptions.medication_requests().await?;
    Ok(views::prescriptions(
        &requests,
        HOSPITAL_ISSUER_ROUTER_PATH,
        &prescriptions_path(),
    ))
}

#[derive(Debug, Deserialize)]
struct OfferQuery {
    #[serde(rename = "validityDays")]
    validity_days: Option<String>,
}

async fn offer(
    _session: SmartSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OfferQuery>,
) -> Result<Html<String>, ApiError> {
    if let Err(e) = state.prescriptions.medication_request(&id).await {
        tracing::error!("MedicationRequest with id {id} does not exist. Error: {e:#}");
        return Err(ApiError::NotFound(format!("MedicationRequest {id}")));
    }

    let validity_days = parse_validity_days(query.validity_days.as_deref())?;
    let offer = create_prescription_offer(&state.agent, &state.issuer_did, &id, validity_days)?;

    let qr = views::qr_data_url(&offer)
        .inspect_err(|e| tracing::error!("Unable to convert offer to QRCode. Cause: {e:#}"))
        .ok();
    Ok(views::offer(&offer, qr.as_deref(), &prescriptions_path()))
}
