// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::{DidDocument, NymRequest};
use crate::config::LedgerConfig;

/// Access to the Indy network the backend is anchored on.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Indy namespace (`did:indy:<namespace>:…`).
    fn namespace(&self) -> &str;

    /// Web interface operators use to browse and write transactions.
    fn web_url(&self) -> String;

    /// Genesis transactions of the pool. Doubles as the connectivity check.
    async fn genesis(&self) -> Result<String>;

    /// Write a NYM transaction.
    async fn register_nym(&self, request: &NymRequest) -> Result<()>;

    /// Resolve a DID the backend does not own. `Ok(None)` when unknown.
    async fn resolve(&self, did: &str) -> Result<Option<DidDocument>>;
}

/// Ledger reached through the network's web server (genesis, register and
/// browse endpoints on port 9000) plus an optional universal resolver.
#[derive(Debug, Clone)]
pub struct VonNetworkLedger {
    client: Client,
    base_url: String,
    namespace: String,
    resolver_url: Option<String>,
}

impl VonNetworkLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url(),
            namespace: config.namespace.clone(),
            resolver_url: config
                .resolver_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_owned()),
        }
    }
}

#[async_trait]
impl Ledger for VonNetworkLedger {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn web_url(&self) -> String {
        self.base_url.clone()
    }

    async fn genesis(&self) -> Result<String> {
        let url = format!("{}/genesis", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Unable to connect to Indy network at {url}"))?;
        if response.status() != StatusCode::OK {
            bail!("Unable to connect to Indy network.");
        }
        let transactions = response.text().await?;
        if transactions.trim().is_empty() {
            bail!("Indy network returned empty genesis transactions");
        }
        Ok(transactions)
    }

    async fn register_nym(&self, request: &NymRequest) -> Result<()> {
        let url = format!("{}/register", self.base_url);
        let body = json!({
            "did": request.operation.dest,
            "verkey": request.operation.verkey,
            "role": request.operation.role,
            "alias": Value::Null,
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to submit NYM for {}", request.operation.dest))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ledger rejected NYM for {} ({status}): {text}", request.operation.dest);
        }
        tracing::debug!(dest = %request.operation.dest, endorser = %request.identifier, "NYM written");
        Ok(())
    }

    async fn resolve(&self, did: &str) -> Result<Option<DidDocument>> {
        let Some(resolver) = &self.resolver_url else {
            return Ok(None);
        };
        let url = format!("{resolver}/1.0/identifiers/{did}");
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("Resolver returned {} for {did}", response.status());
        }
        let body: Value = response.json().await?;
        let document = body.get("didDocument").cloned().unwrap_or(body);
        Ok(Some(serde_json::from_value(document).context("Invalid DID document")?))
    }
}
