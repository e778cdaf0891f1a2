// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Prescription credentials: claims from FHIR, the hospital issuer's
//! metadata, the credential mapper and the offer / verification request
//! helpers the web front end calls.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::did::did_from_url;
use crate::fhir::{MedicationRequest, MedicationRequestSource};
use crate::oid4vc::presentation::{Constraints, Field, Filter, InputDescriptor};
use crate::oid4vc::verifier::AuthorizationRequestOptions;
use crate::oid4vc::{
    CredentialConfiguration, CredentialDefinition, CredentialMapper, CredentialOfferOptions,
    CredentialToSign, IssuanceSessionState, IssuerDisplay, MapCredentialRequest,
    MappedCredential, PresentationDefinition, W3cCredential, W3cCredentialSubject, JWT_VC_JSON,
};
use crate::rxnorm::IngredientLookup;

pub const RXNORM_SYSTEM: &str = "http://www.nlm.nih.gov/research/umls/rxnorm";
pub const PRESCRIPTION_CONFIGURATION_ID: &str = "Prescription";
pub const DEFAULT_VALIDITY_DAYS: i64 = 1;
/// Largest validity, in either direction, an offer may carry.
pub const MAX_VALIDITY_DAYS: i64 = 36_500;

/// How long an offer listener waits for the wallet before giving up.
const OFFER_LISTENER_LIFETIME: std::time::Duration = std::time::Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authored_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_ingredient: Option<String>,
}

impl PrescriptionClaims {
    pub fn into_map(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Map a `MedicationRequest` to credential claims.
///
/// Every RxNorm coding triggers an ingredient lookup; the last one decides
/// `activeIngredient`, including when its lookup fails.
pub async fn prescription_claims(
    request: &MedicationRequest,
    lookup: &dyn IngredientLookup,
) -> PrescriptionClaims {
    let mut claims = PrescriptionClaims::default();
    if let Some(concept) = &request.medication_codeable_concept {
        for coding in &concept.coding {
            if coding.system.as_deref() != Some(RXNORM_SYSTEM) {
                continue;
            }
            claims.active_ingredient = match coding.code.as_deref() {
                Some(code) => lookup.active_ingredient(code).await,
                None => None,
            };
        }
        claims.name = concept.text.clone();
    }
    claims.authored_on = request.authored_on.clone();
    claims
}

pub fn hospital_display() -> Vec<IssuerDisplay> {
    vec![IssuerDisplay {
        name: "Hospital".into(),
        description: Some("A hospital".into()),
        text_color: Some("#ABCDEF".into()),
        background_color: Some("#FFFF00".into()),
        locale: None,
    }]
}

/// Credential configurations the hospital issuer offers.
pub fn supported_credentials() -> BTreeMap<String, CredentialConfiguration> {
    let mut subject = Map::new();
    for claim in ["name", "authoredOn", "activeIngredient"] {
        subject.insert(claim.into(), json!({}));
    }
    BTreeMap::from([(
        PRESCRIPTION_CONFIGURATION_ID.to_owned(),
        CredentialConfiguration {
            format: JWT_VC_JSON.into(),
            vct: Some("Prescription".into()),
            scope: Some("openid4vc:credential:Prescription".into()),
            cryptographic_binding_methods_supported: vec![
                "did:indy".into(),
                "did:key".into(),
                "did:jwk".into(),
            ],
            credential_signing_alg_values_supported: vec!["EdDSA".into()],
            credential_definition: CredentialDefinition {
                types: vec!["VerifiableCredential".into(), "Prescription".into()],
                credential_subject: subject,
            },
        },
    )])
}

pub fn prescription_presentation_definition() -> PresentationDefinition {
    PresentationDefinition {
        id: "hospital_prescription_verification".into(),
        name: Some("Hospital Prescription Verification".into()),
        purpose: Some("We need to verify your prescriptions to dispense medications.".into()),
        input_descriptors: vec![InputDescriptor {
            id: "PrescriptionDescriptor".into(),
            name: Some("Prescription".into()),
            purpose: None,
            constraints: Constraints {
                fields: vec![Field {
                    path: vec!["$.type".into(), "$.vc.type.*".into(), "$.vct".into()],
                    filter: Some(Filter {
                        type_: Some("string".into()),
                        pattern: Some("Prescription".into()),
                        const_: None,
                    }),
                    optional: false,
                }],
            },
        }],
    }
}

/// Issues prescriptions from the FHIR record named in the offer's metadata.
pub struct PrescriptionCredentialMapper {
    source: Arc<dyn MedicationRequestSource>,
    lookup: Arc<dyn IngredientLookup>,
}

impl PrescriptionCredentialMapper {
    pub fn new(source: Arc<dyn MedicationRequestSource>, lookup: Arc<dyn IngredientLookup>) -> Self {
        Self { source, lookup }
    }
}

#[async_trait]
impl CredentialMapper for PrescriptionCredentialMapper {
    async fn map(&self, request: MapCredentialRequest<'_>) -> Result<MappedCredential> {
        let configuration_id = request
            .credential_configuration_ids
            .first()
            .ok_or_else(|| anyhow!("No credential configuration requested"))?;
        let configuration = request
            .credential_configurations_supported
            .get(configuration_id)
            .ok_or_else(|| anyhow!("Unknown credential configuration {configuration_id}"))?;
        if configuration.format != JWT_VC_JSON {
            bail!("Invalid credential request.");
        }

        let session = request.session;
        let prescription_id = session
            .issuance_metadata
            .get("prescriptionId")
            .and_then(Value::as_str)
            .context("Issuance session carries no prescriptionId")?;
        let validity_days = session
            .issuance_metadata
            .get("validityDays")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_VALIDITY_DAYS);

        let medication_request = self
            .source
            .medication_request(prescription_id)
            .await
            .with_context(|| format!("Unable to fetch MedicationRequest {prescription_id}"))?;
        let claims = prescription_claims(&medication_request, self.lookup.as_ref())
            .await
            .into_map();

        let issuance_date = Utc::now();
        let expiration_date = TimeDelta::try_days(validity_days)
            .and_then(|validity| issuance_date.checked_add_signed(validity))
            .ok_or_else(|| anyhow!("Validity of {validity_days} days is out of range"))?;

        let credentials = request
            .holder_bindings
            .iter()
            .map(|binding| {
                let did_url = binding
                    .did_url()
                    .ok_or_else(|| anyhow!("Did not receive only DID holder bindings."))?;
                Ok(CredentialToSign {
                    credential: W3cCredential::new(
                        configuration.credential_definition.types.clone(),
                        &session.issuer_id,
                        W3cCredentialSubject {
                            id: Some(did_from_url(did_url).to_owned()),
                            claims: claims.clone(),
                        },
                        issuance_date,
                        Some(expiration_date),
                    ),
                    verification_method: format!("{}#key-1", session.issuer_id),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MappedCredential {
            credential_configuration_id: configuration_id.clone(),
            format: configuration.format.clone(),
            credentials,
        })
    }
}

/// Offer a prescription credential. Returns the credential offer URI.
///
/// A background task logs the session's state changes until it completes,
/// fails or the listener lifetime runs out.
pub fn create_prescription_offer(
    agent: &Agent,
    issuer_id: &str,
    prescription_id: &str,
    validity_days: i64,
) -> Result<String> {
    let mut metadata = Map::new();
    metadata.insert("prescriptionId".into(), json!(prescription_id));
    metadata.insert("validityDays".into(), json!(validity_days));

    let mut events = agent.events.subscribe();
    let (offer, session) = agent.issuer.create_credential_offer(CredentialOfferOptions {
        issuer_id: issuer_id.to_owned(),
        offered_credentials: vec![PRESCRIPTION_CONFIGURATION_ID.to_owned()],
        user_pin_required: false,
        issuance_metadata: metadata,
    })?;

    let id = session.id;
    tokio::spawn(async move {
        let listen = async {
            while let Some(session) = events.next_issuance(&id).await {
                tracing::info!(session = %id, state = %session.state, "Issuance session state changed");
                if matches!(
                    session.state,
                    IssuanceSessionState::Completed | IssuanceSessionState::Error
                ) {
                    tracing::info!("Removing listener from issuanceSession with id: {id}");
                    break;
                }
            }
        };
        if tokio::time::timeout(OFFER_LISTENER_LIFETIME, listen).await.is_err() {
            tracing::debug!(session = %id, "Issuance listener expired");
        }
    });

    Ok(offer)
}

/// Create a signed authorization request for a prescription presentation.
/// Returns the `openid4vp://` URI and the verification session id.
pub fn create_prescription_verification_request(
    agent: &Agent,
    verifier_id: &str,
) -> Result<(String, String)> {
    let (request, session) =
        agent
            .verifier
            .create_authorization_request(AuthorizationRequestOptions {
                verifier_id: verifier_id.to_owned(),
                request_signer: format!("{verifier_id}#key-1"),
                presentation_definition: prescription_presentation_definition(),
            })?;
    Ok((request, session.id))
}
