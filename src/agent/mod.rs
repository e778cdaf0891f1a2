// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! The identity agent: wallet, DIDs, OpenID4VC issuer and verifier sharing
//! one event bus.

pub mod events;
pub mod setup;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::did::{
    DidCreateOptions, DidCreateResult, DidRegistry, EndorserMode, Ledger, SigningSeed,
    VonNetworkLedger,
};
use crate::oid4vc::{CredentialMapper, Issuer, IssuerConfig, Verifier, VerifierConfig};
use crate::util::{backend_base_url, random_alphabetic};
use crate::wallet::Wallet;

pub use events::{AgentEvent, EventBus, Subscription};

pub const OID4VCI_ROUTER_PATH: &str = "/oid4vci";
pub const OID4VP_ROUTER_PATH: &str = "/oid4vp";
/// Length of the alphabetic seeds handed out with new DIDs.
pub const DID_SEED_LENGTH: usize = 32;

pub struct Agent {
    pub wallet: Arc<Wallet>,
    pub dids: Arc<DidRegistry>,
    pub issuer: Issuer,
    pub verifier: Verifier,
    pub events: EventBus,
}

impl Agent {
    /// Assemble an agent. `public_url` is the backend's externally reachable
    /// base URL; issuer and verifier endpoints are derived from it.
    pub fn new(
        wallet: Arc<Wallet>,
        ledger: Arc<dyn Ledger>,
        public_url: &str,
        mapper: Arc<dyn CredentialMapper>,
    ) -> Self {
        let events = EventBus::with_wallet(wallet.clone());
        let dids = Arc::new(DidRegistry::new(wallet.clone(), ledger));
        let issuer = Issuer::new(
            wallet.clone(),
            dids.clone(),
            events.clone(),
            IssuerConfig::new(format!("{public_url}{OID4VCI_ROUTER_PATH}")),
            mapper,
        );
        let verifier = Verifier::new(
            wallet.clone(),
            dids.clone(),
            events.clone(),
            VerifierConfig::new(format!("{public_url}{OID4VP_ROUTER_PATH}")),
        );
        Self {
            wallet,
            dids,
            issuer,
            verifier,
            events,
        }
    }

    /// Connect to the ledger and open the wallet.
    ///
    /// Fetching the genesis transactions doubles as the connectivity check;
    /// the agent is not built when the network is unreachable.
    pub async fn initialize(config: &Config, mapper: Arc<dyn CredentialMapper>) -> Result<Self> {
        let ledger = Arc::new(VonNetworkLedger::new(&config.ledger));
        let genesis = ledger.genesis().await?;
        tracing::debug!(bytes = genesis.len(), "Fetched genesis transactions");

        let key = config
            .wallet
            .key
            .as_deref()
            .filter(|k| !k.is_empty())
            .context("No wallet key configured (set BACKEND_WALLET_KEY or [wallet] key)")?;
        let path = config.wallet.resolved_path();
        let wallet = Wallet::open(&path, key)
            .with_context(|| format!("Failed to open wallet {} at {}", config.wallet.id, path.display()))?;
        tracing::info!(wallet = %config.wallet.id, path = %path.display(), "Wallet opened");

        Ok(Self::new(
            Arc::new(wallet),
            ledger,
            &backend_base_url(&config.server),
            mapper,
        ))
    }

    /// Create a DID endorsed and written to the ledger by `endorser_did`,
    /// from a fresh random alphabetic seed. Returns the result and the seed.
    pub async fn create_endorsed_did(&self, endorser_did: &str) -> Result<(DidCreateResult, String)> {
        let seed = random_alphabetic(DID_SEED_LENGTH);
        let result = self
            .dids
            .create(DidCreateOptions {
                endorser_did: endorser_did.to_owned(),
                endorser_mode: EndorserMode::Internal,
                seed: Some(SigningSeed::from_seed_str(&seed)?),
            })
            .await?;
        Ok((result, seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::did::registry::tests::RecordingLedger;
    use crate::did::DidState;
    use crate::oid4vc::issuer::tests::EchoMapper;

    fn agent(ledger: RecordingLedger) -> Agent {
        Agent::new(
            Arc::new(Wallet::open_in_memory("test").unwrap()),
            Arc::new(ledger),
            "http://127.0.0.1:3000",
            Arc::new(EchoMapper),
        )
    }

    async fn backend_did(agent: &Agent) -> String {
        let result = agent
            .dids
            .create(DidCreateOptions {
                endorser_did: "did:indy:local:V4SGRU86Z58d6TV7PBUe6f".into(),
                endorser_mode: EndorserMode::External,
                seed: None,
            })
            .await
            .unwrap();
        let did = result.did_state.did().unwrap().to_owned();
        agent.dids.import(&did).unwrap();
        did
    }

    #[tokio::test]
    async fn endorsed_did_is_written_with_returned_seed() {
        let agent = agent(RecordingLedger::default());
        let endorser = backend_did(&agent).await;

        let (result, seed) = agent.create_endorsed_did(&endorser).await.unwrap();
        assert_eq!(seed.len(), DID_SEED_LENGTH);
        assert!(seed.chars().all(|c| c.is_ascii_alphabetic()));
        let DidState::Finished { did } = result.did_state else {
            panic!("expected finished state, got {:?}", result.did_state);
        };

        let expected = crate::did::IndyKeyPair::from_seed(&SigningSeed::from_seed_str(&seed).unwrap());
        assert_eq!(did, expected.did("local"));
    }

    #[tokio::test]
    async fn ledger_rejection_is_reported_as_failed_state() {
        let agent = agent(RecordingLedger {
            reject: true,
            ..RecordingLedger::default()
        });
        let endorser = backend_did(&agent).await;

        let (result, _) = agent.create_endorsed_did(&endorser).await.unwrap();
        assert!(result.did_state.is_failed());
    }
}

