// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! OpenID4VCI endpoints, one set per issuer: `/oid4vci/{issuerId}/…`.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use serde_json::Value;

use crate::gateway::AppState;
use crate::oid4vc::issuer::{CredentialRequest, CredentialResponse, TokenRequest};
use crate::oid4vc::Error;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{issuer_id}/.well-known/openid-credential-issuer",
            get(issuer_metadata),
        )
        .route(
            "/{issuer_id}/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route("/{issuer_id}/offers/{id}", get(credential_offer))
        .route("/{issuer_id}/token", post(token))
        .route("/{issuer_id}/credential", post(credential))
}

async fn issuer_metadata(
    State(state): State<AppState>,
    Path(issuer_id): Path<String>,
) -> Result<Json<Value>, Error> {
    state.agent.issuer.issuer_metadata(&issuer_id).map(Json)
}

async fn authorization_server_metadata(
    State(state): State<AppState>,
    Path(issuer_id): Path<String>,
) -> Result<Json<Value>, Error> {
    state
        .agent
        .issuer
        .authorization_server_metadata(&issuer_id)
        .map(Json)
}

async fn credential_offer(
    State(state): State<AppState>,
    Path((issuer_id, id)): Path<(String, String)>,
) -> Result<Json<Value>, Error> {
    state
        .agent
        .issuer
        .get_credential_offer(&issuer_id, &id)
        .map(Json)
}

/// POST /token: pre-authorized code grant.
async fn token(
    State(state): State<AppState>,
    Path(issuer_id): Path<String>,
    Form(request): Form<TokenRequest>,
) -> Result<Response, Error> {
    let token = state.agent.issuer.create_access_token(&issuer_id, &request)?;
    let mut response = Json(token).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

/// POST /credential: bearer token plus holder proof.
async fn credential(
    State(state): State<AppState>,
    Path(issuer_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<CredentialResponse>, Error> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::InvalidToken("Missing Authorization header".into()))?;
    state
        .agent
        .issuer
        .create_credential_response(&issuer_id, authorization, &request)
        .await
        .map(Json)
}
