// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Axum-based HTTP gateway: the hospital pages, the OpenID4VC protocol
//! endpoints and the static assets under `public/`.
//!
//! Every route shares the same middleware stack:
//! - request tracing
//! - request body size limits (64KB max)
//! - request timeouts (30s)
//! - security headers and restricted CORS

pub mod api;
pub mod views;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::Html,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::agent::Agent;
use crate::fhir::smart::SmartLauncher;
use crate::fhir::{FhirSession, MedicationRequestSource};
use api::{HOSPITAL_VERIFIER_ROUTER_PATH, SMART_ROUTER_PATH};

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s). Covers the time to the response head only, so
/// event streams stay open.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    /// `did:indy` of the backend; endorses DIDs handed out by `/did`.
    pub backend_did: Arc<str>,
    /// `did:sov` alias of the backend DID, used as issuer and verifier id.
    pub issuer_did: Arc<str>,
    /// The SMART session established through `/smart/redirect`.
    pub fhir: FhirSession,
    pub prescriptions: Arc<dyn MedicationRequestSource>,
    /// `None` when no FHIR server is configured.
    pub smart: Option<Arc<SmartLauncher>>,
    pub public_url: String,
}

/// GET / - portal page
async fn handle_index() -> Html<String> {
    views::index(
        &format!("{SMART_ROUTER_PATH}/launch"),
        HOSPITAL_VERIFIER_ROUTER_PATH,
    )
}

fn allowed_origins(public_url: &str) -> Vec<HeaderValue> {
    let mut origins = vec![HeaderValue::from_static("http://localhost:3000")];
    match public_url.trim_end_matches('/').parse::<HeaderValue>() {
        Ok(origin) => origins.push(origin),
        Err(e) => tracing::warn!("Public URL {public_url} is not a valid origin: {e}"),
    }
    origins
}

/// Assemble the application with its middleware. Unknown paths fall back to
/// the files in `public_dir`.
pub fn build_router(state: AppState, public_dir: &Path) -> Router {
    // ── Security Headers Middleware ───────────────────────────
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        // QR codes are inline data URLs
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(
                "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:; connect-src 'self';",
            ),
        ));

    // ── CORS (Restricted) ─────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins(&state.public_url)))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .merge(api::routes())
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .layer(CompressionLayer::new())
        .layer(security_headers)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP gateway until the process is stopped.
pub async fn run_gateway(host: &str, port: u16, state: AppState, public_dir: &Path) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();

    println!("🏥 Hospital backend listening on http://{host}:{actual_port}");
    println!("  Public URL:  {}", state.public_url);
    println!("  Issuer DID:  {}", state.issuer_did);
    if state.smart.is_none() {
        println!("  ⚠️  SMART launch: DISABLED (no FHIR server configured)");
    }
    println!("  Press Ctrl+C to stop.\n");
    tracing::info!(%addr, "Gateway started");

    let app = build_router(state, public_dir);
    axum::serve(listener, app).await?;

    Ok(())
}
