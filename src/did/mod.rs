// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Decentralized identifiers.
//!
//! The backend owns `did:indy` identifiers (and answers for their legacy
//! `did:sov` aliases). Holder identifiers presented by wallets are resolved
//! locally for `did:key` / `did:jwk` and through the ledger otherwise.

pub mod indy;
pub mod key;
pub mod ledger;
pub mod registry;

use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use indy::{parse_indy_did, sov_did_from_indy, IndyKeyPair, NymRequest};
pub use ledger::{Ledger, VonNetworkLedger};
pub use registry::{DidRecord, DidRegistry};

/// Multicodec prefix of an Ed25519 public key (`0xed 0x01`).
pub const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// 32-byte secret seed an Ed25519 key is derived from.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSeed([u8; 32]);

impl SigningSeed {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Seed from a 32-character string, used byte-for-byte.
    pub fn from_seed_str(seed: &str) -> Result<Self> {
        let bytes: [u8; 32] = seed
            .as_bytes()
            .try_into()
            .map_err(|_| anyhow!("Seed must be exactly 32 bytes, got {}", seed.len()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SigningSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSeed(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndorserMode {
    /// The backend writes the NYM itself, endorsed by one of its own DIDs.
    Internal,
    /// The NYM request is handed to an operator who writes it to the ledger.
    External,
}

#[derive(Debug, Clone)]
pub struct DidCreateOptions {
    pub endorser_did: String,
    pub endorser_mode: EndorserMode,
    pub seed: Option<SigningSeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DidState {
    Finished {
        did: String,
    },
    /// Waiting on an external party to write `nym_request` to the ledger.
    Action {
        did: String,
        action: String,
        #[serde(rename = "nymRequest")]
        nym_request: NymRequest,
    },
    Failed {
        did: Option<String>,
        reason: String,
    },
}

impl DidState {
    pub fn did(&self) -> Option<&str> {
        match self {
            Self::Finished { did } | Self::Action { did, .. } => Some(did),
            Self::Failed { did, .. } => did.as_deref(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCreateResult {
    pub did_state: DidState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context", default)]
    pub context: Vec<String>,
    pub id: String,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<Value>,
}

impl VerificationMethod {
    /// Public key of this method as a JWK.
    pub fn public_jwk(&self) -> Result<Value> {
        if let Some(jwk) = &self.public_key_jwk {
            return Ok(jwk.clone());
        }
        if let Some(b58) = &self.public_key_base58 {
            let raw = bs58::decode(b58)
                .into_vec()
                .map_err(|e| anyhow!("Invalid publicKeyBase58 in {}: {e}", self.id))?;
            return ed25519_jwk(&raw);
        }
        if let Some(multibase) = &self.public_key_multibase {
            let encoded = multibase
                .strip_prefix('z')
                .ok_or_else(|| anyhow!("Unsupported multibase encoding in {}", self.id))?;
            let raw = bs58::decode(encoded)
                .into_vec()
                .map_err(|e| anyhow!("Invalid publicKeyMultibase in {}: {e}", self.id))?;
            let key = raw.strip_prefix(&ED25519_MULTICODEC).unwrap_or(raw.as_slice());
            return ed25519_jwk(key);
        }
        bail!("Verification method {} carries no public key", self.id)
    }
}

impl DidDocument {
    /// Find the verification method a DID URL points to. Without a fragment
    /// the first assertion method (or first method) is used.
    pub fn find_method(&self, did_url: &str) -> Option<&VerificationMethod> {
        match did_url.split_once('#') {
            Some((_, fragment)) => self.verification_method.iter().find(|vm| {
                vm.id == did_url || vm.id.rsplit_once('#').is_some_and(|(_, f)| f == fragment)
            }),
            None => {
                let preferred = self.assertion_method.iter().find_map(|v| v.as_str());
                preferred
                    .and_then(|id| self.verification_method.iter().find(|vm| vm.id == id))
                    .or_else(|| self.verification_method.first())
            }
        }
    }
}

/// `did:method:id#fragment` → `did:method:id`.
pub fn did_from_url(did_url: &str) -> &str {
    let end = did_url.find(['#', '?', '/']).unwrap_or(did_url.len());
    &did_url[..end]
}

/// OKP JWK for a raw Ed25519 public key.
pub fn ed25519_jwk(public_key: &[u8]) -> Result<Value> {
    if public_key.len() != 32 {
        bail!("Ed25519 public key must be 32 bytes, got {}", public_key.len());
    }
    Ok(json!({
        "kty": "OKP",
        "crv": "Ed25519",
        "x": URL_SAFE_NO_PAD.encode(public_key),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(id: &str) -> VerificationMethod {
        VerificationMethod {
            id: id.into(),
            type_: "Ed25519VerificationKey2018".into(),
            controller: "did:sov:abc".into(),
            public_key_base58: Some(bs58::encode([7u8; 32]).into_string()),
            public_key_multibase: None,
            public_key_jwk: None,
        }
    }

    #[test]
    fn did_from_url_strips_fragment_query_and_path() {
        assert_eq!(did_from_url("did:sov:abc#key-1"), "did:sov:abc");
        assert_eq!(did_from_url("did:web:example.com?versionId=1"), "did:web:example.com");
        assert_eq!(did_from_url("did:key:z6Mk"), "did:key:z6Mk");
    }

    #[test]
    fn base58_key_converts_to_okp_jwk() {
        let jwk = method("did:sov:abc#key-1").public_jwk().unwrap();
        assert_eq!(jwk["kty"], "OKP");
        assert_eq!(jwk["crv"], "Ed25519");
        assert_eq!(jwk["x"], URL_SAFE_NO_PAD.encode([7u8; 32]));
    }

    #[test]
    fn multibase_key_strips_multicodec_prefix() {
        let mut bytes = ED25519_MULTICODEC.to_vec();
        bytes.extend_from_slice(&[9u8; 32]);
        let vm = VerificationMethod {
            public_key_base58: None,
            public_key_multibase: Some(format!("z{}", bs58::encode(bytes).into_string())),
            ..method("did:key:z#z")
        };
        let jwk = vm.public_jwk().unwrap();
        assert_eq!(jwk["x"], URL_SAFE_NO_PAD.encode([9u8; 32]));
    }

    #[test]
    fn find_method_by_fragment_or_default() {
        let doc = DidDocument {
            context: vec![],
            id: "did:sov:abc".into(),
            verification_method: vec![method("did:sov:abc#key-1"), method("did:sov:abc#key-2")],
            authentication: vec![],
            assertion_method: vec![json!("did:sov:abc#key-2")],
        };

        assert_eq!(doc.find_method("did:sov:abc#key-1").unwrap().id, "did:sov:abc#key-1");
        assert_eq!(doc.find_method("did:sov:abc").unwrap().id, "did:sov:abc#key-2");
        assert!(doc.find_method("did:sov:abc#key-9").is_none());
    }

    #[test]
    fn seed_from_str_requires_32_bytes() {
        assert!(SigningSeed::from_seed_str("short").is_err());
        let seed = SigningSeed::from_seed_str("abcdefghijklmnopqrstuvwxyzABCDEF").unwrap();
        assert_eq!(&seed.as_bytes()[..3], b"abc");
    }

    #[test]
    fn did_state_serializes_with_state_tag() {
        let state = DidState::Failed {
            did: None,
            reason: "ledger unreachable".into(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "ledger unreachable");
        assert!(state.is_failed());
    }
}
