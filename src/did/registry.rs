// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::indy::{self, IndyKeyPair, NymRequest};
use super::{
    did_from_url, key, DidCreateOptions, DidCreateResult, DidDocument, DidState, EndorserMode,
    Ledger, SigningSeed,
};
use crate::wallet::{tags, Tags, Wallet};

pub const DID_CATEGORY: &str = "did";
pub const KEY_CATEGORY: &str = "key";

/// A DID created by this agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidRecord {
    pub did: String,
    pub method: String,
    pub verkey: String,
    pub namespace_identifier: String,
    pub endorser: Option<String>,
    /// Whether the NYM is known to be on the ledger.
    pub registered: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyRecord {
    /// Hex-encoded Ed25519 seed.
    seed: String,
}

/// The agent's `dids` API: create, import, list and resolve.
pub struct DidRegistry {
    wallet: Arc<Wallet>,
    ledger: Arc<dyn Ledger>,
}

impl DidRegistry {
    pub fn new(wallet: Arc<Wallet>, ledger: Arc<dyn Ledger>) -> Self {
        Self { wallet, ledger }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Create a `did:indy` in the ledger's namespace.
    ///
    /// Ledger and endorser problems are reported through
    /// [`DidState::Failed`]; only local storage errors are returned as `Err`.
    pub async fn create(&self, options: DidCreateOptions) -> Result<DidCreateResult> {
        let seed = options
            .seed
            .clone()
            .unwrap_or_else(|| SigningSeed::from_bytes(rand::random()));
        let pair = IndyKeyPair::from_seed(&seed);
        let did = pair.did(self.ledger.namespace());
        let verkey = pair.verkey();
        let dest = pair.namespace_identifier();

        let endorser_id = match indy::parse_indy_did(&options.endorser_did) {
            Ok((_, id)) => id,
            Err(e) => return Ok(failed(Some(did), e.to_string())),
        };
        let nym_request = NymRequest::new(&endorser_id, &dest, &verkey);

        let mut record = DidRecord {
            did: did.clone(),
            method: "indy".into(),
            verkey: verkey.clone(),
            namespace_identifier: dest.clone(),
            endorser: Some(options.endorser_did.clone()),
            registered: false,
            created_at: Utc::now(),
        };

        let did_state = match options.endorser_mode {
            EndorserMode::External => {
                self.store(&record, &seed)?;
                DidState::Action {
                    did,
                    action: "signTransaction".into(),
                    nym_request,
                }
            }
            EndorserMode::Internal => {
                if self.owned(&options.endorser_did)?.is_none() {
                    return Ok(failed(
                        Some(did),
                        format!(
                            "Endorser DID {} is not controlled by this agent",
                            options.endorser_did
                        ),
                    ));
                }
                if let Err(e) = self.ledger.register_nym(&nym_request).await {
                    tracing::warn!(%did, "NYM registration failed: {e:#}");
                    return Ok(failed(Some(did), format!("{e:#}")));
                }
                record.registered = true;
                self.store(&record, &seed)?;
                DidState::Finished { did }
            }
        };

        Ok(DidCreateResult { did_state })
    }

    fn store(&self, record: &DidRecord, seed: &SigningSeed) -> Result<()> {
        let key = KeyRecord {
            seed: hex::encode(seed.as_bytes()),
        };
        self.wallet
            .replace(KEY_CATEGORY, &record.verkey, &key, &Tags::new())?;
        self.wallet.replace(
            DID_CATEGORY,
            &record.did,
            record,
            &tags([("method", record.method.as_str())]),
        )?;
        Ok(())
    }

    /// Mark a DID created with external endorsement as written to the ledger.
    pub fn import(&self, did: &str) -> Result<DidRecord> {
        let mut record = self
            .owned(did)?
            .ok_or_else(|| anyhow!("Cannot import {did}: no key for it in the wallet"))?;
        record.registered = true;
        self.wallet.replace(
            DID_CATEGORY,
            &record.did,
            &record,
            &tags([("method", record.method.as_str())]),
        )?;
        Ok(record)
    }

    /// DIDs created by this agent, optionally restricted to one method.
    pub fn created_dids(&self, method: Option<&str>) -> Result<Vec<DidRecord>> {
        let filter = method.map(|m| tags([("method", m)])).unwrap_or_default();
        Ok(self
            .wallet
            .fetch_all::<DidRecord>(DID_CATEGORY, &filter)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// The record for an owned DID. `did:sov:<id>` matches the indy DID with
    /// the same namespace identifier.
    pub fn owned(&self, did: &str) -> Result<Option<DidRecord>> {
        if let Some(id) = did.strip_prefix("did:sov:") {
            return Ok(self
                .created_dids(Some("indy"))?
                .into_iter()
                .find(|r| r.namespace_identifier == id));
        }
        Ok(self.wallet.fetch(DID_CATEGORY, did)?)
    }

    pub async fn resolve(&self, did: &str) -> Result<DidDocument> {
        if let Some(record) = self.owned(did)? {
            return indy::owned_document(did, &record.verkey);
        }
        if let Some(document) = key::resolve(did)? {
            return Ok(document);
        }
        self.ledger
            .resolve(did)
            .await?
            .ok_or_else(|| anyhow!("Unable to resolve DID {did}"))
    }

    /// Public JWK behind a DID URL.
    pub async fn resolve_key(&self, did_url: &str) -> Result<Value> {
        let document = self.resolve(did_from_url(did_url)).await?;
        document
            .find_method(did_url)
            .ok_or_else(|| anyhow!("No verification method {did_url}"))?
            .public_jwk()
    }

    /// Signing key of an owned DID (fragment ignored).
    pub fn signing_key(&self, did_url: &str) -> Result<SigningKey> {
        let did = did_from_url(did_url);
        let record = self
            .owned(did)?
            .ok_or_else(|| anyhow!("{did} is not controlled by this agent"))?;
        let key: KeyRecord = self
            .wallet
            .fetch(KEY_CATEGORY, &record.verkey)?
            .ok_or_else(|| anyhow!("Key for {did} missing from wallet"))?;

        let mut bytes = hex::decode(&key.seed).context("Corrupt key record")?;
        let seed: Result<[u8; 32], _> = bytes.as_slice().try_into();
        bytes.zeroize();
        let seed = seed.map_err(|_| anyhow!("Corrupt key record for {did}"))?;
        Ok(SigningKey::from_bytes(&seed))
    }
}

fn failed(did: Option<String>, reason: String) -> DidCreateResult {
    DidCreateResult {
        did_state: DidState::Failed { did, reason },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::did::indy::sov_did_from_indy;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory ledger recording written NYMs.
    #[derive(Default)]
    pub(crate) struct RecordingLedger {
        pub(crate) nyms: Mutex<Vec<NymRequest>>,
        pub(crate) reject: bool,
    }

    #[async_trait]
    impl Ledger for RecordingLedger {
        fn namespace(&self) -> &str {
            "local"
        }

        fn web_url(&self) -> String {
            "http://127.0.0.1:9000".into()
        }

        async fn genesis(&self) -> Result<String> {
            Ok("{}".into())
        }

        async fn register_nym(&self, request: &NymRequest) -> Result<()> {
            if self.reject {
                bail!("pool timeout");
            }
            self.nyms.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn resolve(&self, _did: &str) -> Result<Option<DidDocument>> {
            Ok(None)
        }
    }

    const TRUSTEE: &str = "did:indy:local:V4SGRU86Z58d6TV7PBUe6f";

    fn registry(ledger: RecordingLedger) -> (DidRegistry, Arc<RecordingLedger>) {
        let wallet = Arc::new(Wallet::open_in_memory("test").unwrap());
        let ledger = Arc::new(ledger);
        (DidRegistry::new(wallet, ledger.clone()), ledger)
    }

    async fn endorser(registry: &DidRegistry) -> String {
        let result = registry
            .create(DidCreateOptions {
                endorser_did: TRUSTEE.into(),
                endorser_mode: EndorserMode::External,
                seed: None,
            })
            .await
            .unwrap();
        let did = result.did_state.did().unwrap().to_string();
        registry.import(&did).unwrap();
        did
    }

    #[tokio::test]
    async fn external_endorsement_returns_nym_request() {
        let (registry, ledger) = registry(RecordingLedger::default());
        let result = registry
            .create(DidCreateOptions {
                endorser_did: TRUSTEE.into(),
                endorser_mode: EndorserMode::External,
                seed: Some(SigningSeed::from_seed_str("000000000000000000000000Steward1").unwrap()),
            })
            .await
            .unwrap();

        let DidState::Action { did, nym_request, .. } = result.did_state else {
            panic!("expected action state");
        };
        assert!(did.starts_with("did:indy:local:"));
        assert_eq!(nym_request.identifier, "V4SGRU86Z58d6TV7PBUe6f");
        assert!(did.ends_with(&nym_request.operation.dest));
        assert!(ledger.nyms.lock().unwrap().is_empty());

        let record = registry.owned(&did).unwrap().unwrap();
        assert!(!record.registered);
        assert!(registry.import(&did).unwrap().registered);
    }

    #[tokio::test]
    async fn internal_endorsement_writes_nym() {
        let (registry, ledger) = registry(RecordingLedger::default());
        let backend = endorser(&registry).await;

        let result = registry
            .create(DidCreateOptions {
                endorser_did: backend.clone(),
                endorser_mode: EndorserMode::Internal,
                seed: None,
            })
            .await
            .unwrap();

        let DidState::Finished { did } = result.did_state else {
            panic!("expected finished state");
        };
        let nyms = ledger.nyms.lock().unwrap();
        assert_eq!(nyms.len(), 1);
        assert!(backend.ends_with(&nyms[0].identifier));
        assert!(registry.owned(&did).unwrap().unwrap().registered);
        assert_eq!(registry.created_dids(Some("indy")).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn internal_endorsement_requires_owned_endorser() {
        let (registry, _) = registry(RecordingLedger::default());
        let result = registry
            .create(DidCreateOptions {
                endorser_did: TRUSTEE.into(),
                endorser_mode: EndorserMode::Internal,
                seed: None,
            })
            .await
            .unwrap();
        assert!(result.did_state.is_failed());
        assert!(registry.created_dids(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn ledger_rejection_is_reported_as_failed_state() {
        let (registry, _) = registry(RecordingLedger {
            reject: true,
            ..RecordingLedger::default()
        });
        let backend = endorser(&registry).await;
        let result = registry
            .create(DidCreateOptions {
                endorser_did: backend,
                endorser_mode: EndorserMode::Internal,
                seed: None,
            })
            .await
            .unwrap();

        let DidState::Failed { reason, .. } = result.did_state else {
            panic!("expected failed state");
        };
        assert!(reason.contains("pool timeout"));
    }

    #[tokio::test]
    async fn sov_alias_resolves_to_owned_key() {
        let (registry, _) = registry(RecordingLedger::default());
        let backend = endorser(&registry).await;
        let sov = sov_did_from_indy(&backend).unwrap();

        let doc = registry.resolve(&sov).await.unwrap();
        assert_eq!(doc.id, sov);

        let jwk = registry.resolve_key(&format!("{sov}#key-1")).await.unwrap();
        let signing = registry.signing_key(&format!("{sov}#key-1")).unwrap();
        use base64::Engine;
        let x = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(signing.verifying_key().as_bytes());
        assert_eq!(jwk["x"], x);
    }

    #[tokio::test]
    async fn unknown_did_fails_to_resolve() {
        let (registry, _) = registry(RecordingLedger::default());
        assert!(registry.resolve("did:sov:V4SGRU86Z58d6TV7PBUe6f").await.is_err());
        assert!(registry.signing_key("did:sov:V4SGRU86Z58d6TV7PBUe6f#key-1").is_err());
    }
}
