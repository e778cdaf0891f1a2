// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! First-run bootstrap: the backend's endorser DID, its issuer and its
//! verifier.

use anyhow::{bail, Context, Result};
use console::style;
use dialoguer::Input;

use super::Agent;
use crate::did::{DidCreateOptions, DidState, EndorserMode};
use crate::oid4vc::Error as Oid4vcError;
use crate::prescription::{hospital_display, supported_credentials};
use crate::wallet::Tags;

const SETTING_CATEGORY: &str = "setting";
/// Wallet setting holding the backend's `did:indy`.
pub const BACKEND_DID_SETTING: &str = "backend_did";

/// The person running the backend during bootstrap.
pub trait Operator {
    /// Show instructions.
    fn show(&self, message: &str);

    /// Ask for the NYM (namespace identifier) of a TRUSTEE transaction.
    fn endorser_nym(&self) -> Result<String>;

    /// Block until the operator has written the DID to the ledger.
    fn confirm_ledger_write(&self) -> Result<()>;
}

/// Operator on an interactive terminal.
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn show(&self, message: &str) {
        println!("{message}");
    }

    fn endorser_nym(&self) -> Result<String> {
        let nym: String = Input::new()
            .with_prompt("Please enter the NYM value of a transaction with the TRUSTEE role here")
            .interact_text()
            .context("Failed to read endorser NYM")?;
        Ok(nym.trim().to_owned())
    }

    fn confirm_ledger_write(&self) -> Result<()> {
        let _: String = Input::new()
            .with_prompt("After you are done following the instructions above, press enter to continue")
            .allow_empty(true)
            .interact_text()
            .context("Failed to read confirmation")?;
        Ok(())
    }
}

/// The backend DID, created on first run.
///
/// With no `did:indy` in the wallet, a DID endorsed externally by an
/// operator-supplied TRUSTEE is created and the operator is walked through
/// writing it via the ledger's web interface. Later runs read it back from
/// the wallet.
pub async fn setup_did(agent: &Agent, operator: &dyn Operator) -> Result<String> {
    if !agent.dids.created_dids(Some("indy"))?.is_empty() {
        let did: Option<String> = agent.wallet.fetch(SETTING_CATEGORY, BACKEND_DID_SETTING)?;
        let Some(did) = did else {
            bail!(
                "The wallet holds DIDs but no backend DID setting. \
                 Please delete the backend wallet and start again."
            );
        };
        tracing::info!(%did, "Using backend DID");
        return Ok(did);
    }

    let ledger = agent.dids.ledger();
    let web_url = ledger.web_url();
    tracing::info!(
        "Initializing backend for the first time. Please open the ledgers web interface here: {web_url}/browse/domain"
    );

    let nym = operator.endorser_nym()?;
    let result = agent
        .dids
        .create(DidCreateOptions {
            endorser_did: format!("did:indy:{}:{nym}", ledger.namespace()),
            endorser_mode: EndorserMode::External,
            seed: None,
        })
        .await?;

    let (did, verkey) = match result.did_state {
        DidState::Action { did, nym_request, .. } => (did, nym_request.operation.verkey),
        DidState::Finished { did } => {
            let verkey = agent
                .dids
                .owned(&did)?
                .map(|r| r.verkey)
                .unwrap_or_default();
            (did, verkey)
        }
        DidState::Failed { reason, .. } => {
            bail!("Unable to create an endorser DID for backend. Cause: {reason}")
        }
    };
    let did_short = did.rsplit(':').next().unwrap_or(&did);

    operator.show(&format!(
        "Please open the ledgers web interface here: {web_url}\n\
         To add a DID to the ledger, choose the \"Register from DID\" radio button under the \
         \"Authenticate a New DID\" section.\n\
         Fill out the mandatory fields with the values given below.\n\n\
         Add the following DID to the ledger: {}\n\n\
         This is the verkey of this DID: {}",
        style(did_short).bold().cyan(),
        style(&verkey).bold().cyan(),
    ));
    operator.confirm_ledger_write()?;

    agent.dids.import(&did)?;
    agent
        .wallet
        .replace(SETTING_CATEGORY, BACKEND_DID_SETTING, &did, &Tags::new())?;
    tracing::info!(%did, "Backend DID registered");
    Ok(did)
}

/// Create the hospital issuer, or refresh its metadata when it exists.
pub fn create_issuer(agent: &Agent, issuer_id: &str) -> Result<()> {
    match agent.issuer.get_issuer_by_issuer_id(issuer_id) {
        Ok(_) => {
            agent
                .issuer
                .update_issuer_metadata(issuer_id, hospital_display(), supported_credentials())?;
            tracing::info!("Updated issuer metadata");
        }
        Err(Oid4vcError::NotFound(_)) => {
            tracing::info!("No issuer record stored, creating new issuer.");
            agent
                .issuer
                .create_issuer(issuer_id, hospital_display(), supported_credentials())?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Create the hospital verifier unless it exists.
pub fn create_verifier(agent: &Agent, verifier_id: &str) -> Result<()> {
    match agent.verifier.get_verifier_by_verifier_id(verifier_id) {
        Ok(_) => Ok(()),
        Err(Oid4vcError::NotFound(_)) => {
            tracing::info!("No verifier record stored, creating new verifier.");
            agent.verifier.create_verifier(verifier_id)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
