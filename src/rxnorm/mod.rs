// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Active-ingredient lookup against the RxNorm REST API (RxNav).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::RxNormConfig;

/// Term type of ingredients.
const INGREDIENT_TTY: &str = "IN";

/// Resolves an RxCUI to the name of its active ingredient.
#[async_trait]
pub trait IngredientLookup: Send + Sync {
    /// `None` when the ingredient cannot be determined.
    async fn active_ingredient(&self, rxcui: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllRelatedResponse {
    #[serde(default)]
    pub all_related_group: AllRelatedGroup,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllRelatedGroup {
    #[serde(default)]
    pub concept_group: Vec<ConceptGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptGroup {
    pub tty: String,
    #[serde(default)]
    pub concept_properties: Vec<ConceptProperty>,
}

#[derive(Debug, Deserialize)]
pub struct ConceptProperty {
    pub rxcui: String,
    pub name: String,
}

/// Name of the first ingredient concept. Most drugs list zero or one.
pub fn ingredient_name(response: &AllRelatedResponse) -> Option<String> {
    response
        .all_related_group
        .concept_group
        .iter()
        .filter(|group| group.tty == INGREDIENT_TTY)
        .find_map(|group| group.concept_properties.first())
        .map(|concept| concept.name.clone())
}

pub struct RxNormClient {
    http: Client,
    base_url: String,
}

impl RxNormClient {
    pub fn new(config: &RxNormConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub async fn all_related(&self, rxcui: &str) -> Result<AllRelatedResponse> {
        let url = format!("{}/REST/rxcui/{rxcui}/allrelated.json", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("RxNorm request to {url} failed"))?;
        if response.status() != StatusCode::OK {
            bail!("RxNorm answered {}", response.status());
        }
        response
            .json()
            .await
            .context("Invalid RxNorm allrelated response")
    }
}

#[async_trait]
impl IngredientLookup for RxNormClient {
    async fn active_ingredient(&self, rxcui: &str) -> Option<String> {
        match self.all_related(rxcui).await {
            Ok(response) => ingredient_name(&response),
            Err(e) => {
                tracing::error!(%rxcui, "Unable to get ingredient for RxCUI: {e:#}");
                None
            }
        }
    }
}
