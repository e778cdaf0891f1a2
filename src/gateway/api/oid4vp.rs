// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Json},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::gateway::AppState;
use crate::oid4vc::verifier::{AuthorizationResponse, REQUEST_OBJECT_TYP};
use crate::oid4vc::Error;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{verifier_id}/authorize",
        get(authorization_request).post(authorization_response),
    )
}

#[derive(Debug, Deserialize)]
struct RequestQuery {
    id: String,
}

/// GET /oid4vp/{verifierId}/authorize?id=: the signed request object behind
/// a `request_uri`.
async fn authorization_request(
    State(state): State<AppState>,
    Path(verifier_id): Path<String>,
    Query(query): Query<RequestQuery>,
) -> Result<impl IntoResponse, Error> {
    let jwt = state
        .agent
        .verifier
        .get_authorization_request(&verifier_id, &query.id)?;
    Ok((
        [(header::CONTENT_TYPE, format!("application/{REQUEST_OBJECT_TYP}"))],
        jwt,
    ))
}

/// POST /oid4vp/{verifierId}/authorize: `direct_post` response from the wallet.
async fn authorization_response(
    State(state): State<AppState>,
    Path(verifier_id): Path<String>,
    Form(response): Form<AuthorizationResponse>,
) -> Result<Json<Value>, Error> {
    state
        .agent
        .verifier
        .verify_authorization_response(&verifier_id, &response)
        .await?;
    Ok(Json(json!({})))
}
