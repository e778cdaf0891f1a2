// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! SMART App Launch (standalone, authorization code with PKCE).

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::FhirClient;
use crate::config::SmartConfig;
use crate::util::random_token;

/// Lifetime of a pending launch.
pub const LAUNCH_STATE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Deserialize)]
pub struct SmartConfiguration {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    patient: Option<String>,
}

/// Pending launches keyed by their `state` parameter.
///
/// Each state carries the PKCE verifier of its launch, expires after the TTL
/// and is consumed on first validation.
#[derive(Debug)]
pub struct LaunchStateStore {
    ttl: Duration,
    states: Mutex<HashMap<String, (String, Instant)>>,
}

impl LaunchStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Store `code_verifier` under a fresh random state and return the state.
    pub fn generate(&self, code_verifier: &str) -> String {
        let token = random_token();
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let now = Instant::now();
        states.retain(|_, (_, ts)| now.duration_since(*ts) < self.ttl);
        states.insert(token.clone(), (code_verifier.to_owned(), now));
        token
    }

    /// Consume a state. Returns the launch's code verifier if it was valid.
    pub fn validate(&self, state: &str) -> Option<String> {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let now = Instant::now();
        states.retain(|_, (_, ts)| now.duration_since(*ts) < self.ttl);
        states.remove(state).map(|(verifier, _)| verifier)
    }
}

/// S256 code challenge of a PKCE verifier.
pub fn code_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

pub struct SmartLauncher {
    http: Client,
    iss: String,
    client_id: String,
    scope: String,
    redirect_uri: String,
    states: LaunchStateStore,
}

impl SmartLauncher {
    pub fn new(iss: &str, client_id: &str, scope: &str, redirect_uri: &str) -> Self {
        Self {
            http: Client::new(),
            iss: iss.trim_end_matches('/').to_owned(),
            client_id: client_id.to_owned(),
            scope: scope.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            states: LaunchStateStore::new(LAUNCH_STATE_TTL),
        }
    }

    /// `None` when no FHIR server is configured.
    pub fn from_config(config: &SmartConfig, redirect_uri: &str) -> Option<Self> {
        config
            .url
            .as_deref()
            .map(|iss| Self::new(iss, &config.client_id, &config.scope, redirect_uri))
    }

    pub fn iss(&self) -> &str {
        &self.iss
    }

    pub async fn discover(&self) -> Result<SmartConfiguration> {
        let url = format!("{}/.well-known/smart-configuration", self.iss);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Unable to reach SMART server at {url}"))?
            .error_for_status()
            .context("SMART configuration unavailable")?;
        response
            .json::<SmartConfiguration>()
            .await
            .context("Invalid SMART configuration")
    }

    /// Start a launch: the URL to send the browser to.
    pub async fn authorize_url(&self) -> Result<String> {
        let discovery = self.discover().await?;
        let code_verifier = random_token();
        let state = self.states.generate(&code_verifier);
        self.authorization_url(&discovery, &state, &code_challenge(&code_verifier))
    }

    pub fn authorization_url(
        &self,
        discovery: &SmartConfiguration,
        state: &str,
        challenge: &str,
    ) -> Result<String> {
        let mut url = Url::parse(&discovery.authorization_endpoint)
            .context("Invalid SMART authorization endpoint")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &self.scope)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("aud", &self.iss)
            .append_pair("state", state)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.to_string())
    }

    /// Finish a launch: validate `state` and exchange `code` for a client.
    pub async fn complete(&self, code: &str, state: &str) -> Result<FhirClient> {
        let code_verifier = self
            .states
            .validate(state)
            .context("Unknown or expired SMART launch state")?;
        let discovery = self.discover().await?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", code_verifier.as_str()),
        ];
        let token = self
            .http
            .post(&discovery.token_endpoint)
            .form(&params)
            .send()
            .await
            .context("SMART token request failed")?
            .error_for_status()
            .context("SMART server rejected the authorization code")?
            .json::<TokenResponse>()
            .await
            .context("Invalid SMART token response")?;

        let expires_at = token
            .expires_in
            .and_then(|secs| session_expiry(Utc::now(), secs));
        tracing::info!(
            server = %self.iss,
            patient = token.patient.as_deref().unwrap_or("-"),
            "SMART launch completed"
        );
        Ok(FhirClient::new(
            &self.iss,
            token.access_token,
            expires_at,
            token.patient,
        ))
    }
}

/// When a token issued at `now` with `expires_in` seconds runs out. `None`
/// when the instant is not representable, leaving the session unbounded.
fn session_expiry(now: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    let expiry = TimeDelta::try_seconds(expires_in).and_then(|ttl| now.checked_add_signed(ttl));
    if expiry.is_none() {
        tracing::warn!(expires_in, "Ignoring out-of-range SMART token lifetime");
    }
    expiry
}
