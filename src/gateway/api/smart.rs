// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use anyhow::anyhow;
use axum::{
    extract::{FromRequestParts, Query, State},
    http::request::Parts,
    response::{Html, Redirect},
    routing::get,
    Router,
};
use serde::Deserialize;

use super::{ApiError, HOSPITAL_ISSUER_ROUTER_PATH, SMART_ROUTER_PATH};
use crate::fhir::SessionStatus;
use crate::gateway::{views, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/launch", get(launch))
        .route("/redirect", get(redirect))
        .route("/session_expired", get(session_expired))
}

/// Guard for pages that need the FHIR server: without a SMART session the
/// browser goes back to the portal, with an expired one to the
/// session-expired page.
pub struct SmartSession;

impl FromRequestParts<AppState> for SmartSession {
    type Rejection = ApiError;

    async fn from_request_parts(_parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match state.fhir.status().await {
            SessionStatus::Active => Ok(SmartSession),
            SessionStatus::Expired => Err(ApiError::Redirect(format!(
                "{SMART_ROUTER_PATH}/session_expired"
            ))),
            SessionStatus::Missing => {
                tracing::info!("No SMART session, redirecting to portal.");
                Err(ApiError::Redirect("/".into()))
            }
        }
    }
}

/// GET /smart/launch: start the authorization with the FHIR server.
async fn launch(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let launcher = state
        .smart
        .as_ref()
        .ok_or_else(|| anyhow!("No SMART server configured (set SMART_URL or [smart] url)"))?;
    let url = launcher.authorize_url().await?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
struct RedirectQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /smart/redirect: the authorization server's callback.
async fn redirect(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
) -> Result<Redirect, ApiError> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::warn!(%error, "SMART authorization failed: {description}");
        return Err(ApiError::BadRequest(format!(
            "SMART authorization failed: {error} {description}"
        )));
    }
    let (Some(code), Some(launch_state)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest("Missing code or state".into()));
    };
    let launcher = state
        .smart
        .as_ref()
        .ok_or_else(|| anyhow!("No SMART server configured"))?;

    let client = launcher
        .complete(&code, &launch_state)
        .await
        .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    state.fhir.set(client).await;
    Ok(Redirect::to(HOSPITAL_ISSUER_ROUTER_PATH))
}

async fn session_expired() -> Html<String> {
    views::session_expired()
}
