// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! SMART-on-FHIR client for `MedicationRequest` resources.

pub mod smart;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

pub use smart::{LaunchStateStore, SmartConfiguration, SmartLauncher};

const FHIR_JSON: &str = "application/fhir+json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default)]
    pub coding: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// FHIR R4 `MedicationRequest`. Elements the backend does not read are kept
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRequest {
    #[serde(default)]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_codeable_concept: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authored_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MedicationRequest {
    /// Human-readable medication name: the concept text, else the first
    /// coding display.
    pub fn medication_name(&self) -> Option<&str> {
        let concept = self.medication_codeable_concept.as_ref()?;
        concept
            .text
            .as_deref()
            .or_else(|| concept.coding.iter().find_map(|c| c.display.as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<MedicationRequest>,
}

/// Search result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default)]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    pub fn into_resources(self) -> Vec<MedicationRequest> {
        self.entry.into_iter().filter_map(|e| e.resource).collect()
    }
}

/// Authorized access to one FHIR server, produced by a completed SMART launch.
#[derive(Debug, Clone)]
pub struct FhirClient {
    http: Client,
    pub server_url: String,
    access_token: String,
    /// `None` when the token response carried no lifetime.
    pub expires_at: Option<DateTime<Utc>>,
    /// Patient in context of the launch.
    pub patient: Option<String>,
}

impl FhirClient {
    pub fn new(
        server_url: &str,
        access_token: String,
        expires_at: Option<DateTime<Utc>>,
        patient: Option<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_owned(),
            access_token,
            expires_at,
            patient,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp < Utc::now())
    }

    async fn request<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{path}", self.server_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, FHIR_JSON)
            .send()
            .await
            .with_context(|| format!("FHIR request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("FHIR server answered {status} for {path}");
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid FHIR response for {path}"))
    }

    pub async fn get_medication_request(&self, id: &str) -> Result<MedicationRequest> {
        self.request(&format!("MedicationRequest/{id}")).await
    }

    pub async fn get_all_medication_requests(&self) -> Result<Bundle> {
        self.request("MedicationRequest").await
    }
}

/// Where prescriptions come from.
#[async_trait]
pub trait MedicationRequestSource: Send + Sync {
    async fn medication_request(&self, id: &str) -> Result<MedicationRequest>;

    async fn medication_requests(&self) -> Result<Vec<MedicationRequest>>;
}

/// State of the backend's SMART session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Missing,
    Expired,
    Active,
}

/// The single SMART session the backend works with. Cloning shares it.
#[derive(Clone, Default)]
pub struct FhirSession {
    client: Arc<RwLock<Option<FhirClient>>>,
}

impl FhirSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current client after a completed launch.
    pub async fn set(&self, client: FhirClient) {
        *self.client.write().await = Some(client);
    }

    pub async fn status(&self) -> SessionStatus {
        match self.client.read().await.as_ref() {
            None => SessionStatus::Missing,
            Some(c) if c.is_expired() => SessionStatus::Expired,
            Some(_) => SessionStatus::Active,
        }
    }

    async fn client(&self) -> Result<FhirClient> {
        self.client
            .read()
            .await
            .clone()
            .context("No SMART session established")
    }
}

#[async_trait]
impl MedicationRequestSource for FhirSession {
    async fn medication_request(&self, id: &str) -> Result<MedicationRequest> {
        self.client().await?.get_medication_request(id).await
    }

    async fn medication_requests(&self) -> Result<Vec<MedicationRequest>> {
        Ok(self
            .client()
            .await?
            .get_all_medication_requests()
            .await?
            .into_resources())
    }
}
