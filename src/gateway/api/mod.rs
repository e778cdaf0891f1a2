// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

pub mod did;
pub mod issuer;
pub mod oid4vci;
pub mod oid4vp;
pub mod smart;
pub mod verifier;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    Router,
};

use crate::agent::{OID4VCI_ROUTER_PATH, OID4VP_ROUTER_PATH};
use crate::gateway::AppState;
use crate::oid4vc;

pub const DID_ROUTER_PATH: &str = "/did";
pub const SMART_ROUTER_PATH: &str = "/smart";
pub const HOSPITAL_ISSUER_ROUTER_PATH: &str = "/issuer/hospital";
pub const HOSPITAL_VERIFIER_ROUTER_PATH: &str = "/verifier/hospital";
pub const PRESCRIPTIONS_PATH: &str = "/prescriptions";

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest(DID_ROUTER_PATH, did::router())
        .nest(SMART_ROUTER_PATH, smart::router())
        .nest(HOSPITAL_ISSUER_ROUTER_PATH, issuer::router())
        .nest(HOSPITAL_VERIFIER_ROUTER_PATH, verifier::router())
        .nest(OID4VCI_ROUTER_PATH, oid4vci::router())
        .nest(OID4VP_ROUTER_PATH, oid4vp::router())
}

/// Failure of a page or helper handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    /// Send the browser elsewhere, e.g. when the SMART session is gone.
    #[error("redirect to {0}")]
    Redirect(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<oid4vc::Error> for ApiError {
    fn from(e: oid4vc::Error) -> Self {
        match e {
            oid4vc::Error::NotFound(msg) => Self::NotFound(msg),
            oid4vc::Error::Server(e) => Self::Internal(e),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(msg) => {
                tracing::debug!("Not found: {msg}");
                StatusCode::NOT_FOUND.into_response()
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            Self::Redirect(to) => Redirect::to(&to).into_response(),
            Self::Internal(e) => {
                tracing::error!("Request failed: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

impl IntoResponse for oid4vc::Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = if let Self::Server(e) = &self {
            tracing::error!("OpenID4VC request failed: {e:#}");
            serde_json::json!({"error": self.code()})
        } else {
            tracing::debug!(code = self.code(), "OpenID4VC request rejected: {self}");
            self.to_json()
        };

        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Bearer error="invalid_token""#),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn oauth_errors_become_json_with_status() {
        let response = oid4vc::Error::InvalidGrant("Invalid pre-authorized code".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn invalid_token_challenges_bearer() {
        let response = oid4vc::Error::InvalidToken("expired".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn server_errors_hide_details() {
        let response = oid4vc::Error::Server(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(!String::from_utf8_lossy(&body).contains("disk"));
    }

    #[test]
    fn api_error_statuses() {
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        let redirect = ApiError::Redirect("/".into()).into_response();
        assert_eq!(redirect.status(), StatusCode::SEE_OTHER);
        assert_eq!(redirect.headers()[header::LOCATION], "/");
        assert_eq!(
            ApiError::from(oid4vc::Error::NotFound("gone".into()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }
}
