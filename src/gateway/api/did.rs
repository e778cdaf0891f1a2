// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;

use super::ApiError;
use crate::did::DidState;
use crate::gateway::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(create_did))
}

/// GET /did: a new DID endorsed by the backend, with the seed it was
/// derived from.
async fn create_did(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (result, seed) = state.agent.create_endorsed_did(&state.backend_did).await?;

    match result.did_state {
        DidState::Failed { reason, .. } => {
            tracing::warn!("DID creation failed: {reason}");
            Ok((StatusCode::INTERNAL_SERVER_ERROR, reason).into_response())
        }
        did_state => Ok(Json(json!({
            "didUrl": did_state.did(),
            "seed": seed,
        }))
        .into_response()),
    }
}
