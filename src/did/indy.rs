// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! `did:indy` identifiers.
//!
//! The namespace identifier is the base58 encoding of the first 16 bytes of
//! the Ed25519 verification key; the full key (`verkey`) is base58 as well.

use anyhow::{anyhow, Result};
use ed25519_dalek::SigningKey;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::LazyLock;

use super::{ed25519_jwk, DidDocument, SigningSeed, VerificationMethod};

/// NYM transaction type on an Indy ledger.
pub const NYM_TXN_TYPE: &str = "1";

static INDY_DID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^did:indy:((?:[a-z][_a-z0-9-]*)(?::[a-z][_a-z0-9-]*)?):([1-9A-HJ-NP-Za-km-z]{21,22})$")
        .expect("static regex")
});

pub struct IndyKeyPair {
    signing_key: SigningKey,
}

impl IndyKeyPair {
    pub fn from_seed(seed: &SigningSeed) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed.as_bytes()),
        }
    }

    pub fn verkey(&self) -> String {
        bs58::encode(self.signing_key.verifying_key().as_bytes()).into_string()
    }

    pub fn namespace_identifier(&self) -> String {
        bs58::encode(&self.signing_key.verifying_key().as_bytes()[..16]).into_string()
    }

    pub fn did(&self, namespace: &str) -> String {
        format!("did:indy:{namespace}:{}", self.namespace_identifier())
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// Split `did:indy:<namespace>:<id>` into `(namespace, id)`.
pub fn parse_indy_did(did: &str) -> Result<(String, String)> {
    let caps = INDY_DID
        .captures(did)
        .ok_or_else(|| anyhow!("{did} is not a valid did:indy identifier"))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// Legacy `did:sov` form of an indy DID.
pub fn sov_did_from_indy(did: &str) -> Result<String> {
    let (_, id) = parse_indy_did(did)?;
    Ok(format!("did:sov:{id}"))
}

/// DID document for a DID whose verkey the wallet holds.
pub fn owned_document(did: &str, verkey: &str) -> Result<DidDocument> {
    let raw = bs58::decode(verkey)
        .into_vec()
        .map_err(|e| anyhow!("Invalid verkey for {did}: {e}"))?;
    let key_id = format!("{did}#key-1");

    Ok(DidDocument {
        context: vec![
            "https://www.w3.org/ns/did/v1".into(),
            "https://w3id.org/security/suites/ed25519-2018/v1".into(),
        ],
        id: did.to_owned(),
        verification_method: vec![VerificationMethod {
            id: key_id.clone(),
            type_: "Ed25519VerificationKey2018".into(),
            controller: did.to_owned(),
            public_key_base58: Some(verkey.to_owned()),
            public_key_multibase: None,
            public_key_jwk: Some(ed25519_jwk(&raw)?),
        }],
        authentication: vec![json!(key_id)],
        assertion_method: vec![json!(key_id)],
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NymRequest {
    /// Namespace identifier of the endorser submitting the NYM.
    pub identifier: String,
    pub operation: NymOperation,
    pub protocol_version: u8,
    pub req_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NymOperation {
    #[serde(rename = "type")]
    pub type_: String,
    pub dest: String,
    pub verkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl NymRequest {
    pub fn new(endorser_id: &str, dest: &str, verkey: &str) -> Self {
        let req_id = chrono::Utc::now()
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or_default();
        Self {
            identifier: endorser_id.to_owned(),
            operation: NymOperation {
                type_: NYM_TXN_TYPE.into(),
                dest: dest.to_owned(),
                verkey: verkey.to_owned(),
                role: None,
            },
            protocol_version: 2,
            req_id,
        }
    }
}
