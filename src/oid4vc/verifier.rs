// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! OpenID4VP verifier: signed by-reference authorization requests and
//! `direct_post` response verification.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::credential::W3cCredential;
use super::jwt::{self, Header};
use super::presentation::{PresentationDefinition, PresentationSubmission};
use super::session::{SessionStore, VerificationSession, VerificationSessionState};
use super::{Error, Result};
use crate::agent::events::{AgentEvent, EventBus};
use crate::did::{did_from_url, DidRegistry};
use crate::util::random_token;
use crate::wallet::{tags, Wallet};

pub const REQUEST_OBJECT_TYP: &str = "oauth-authz-req+jwt";
const SELF_ISSUED_AUDIENCE: &str = "https://self-issued.me/v2";
const VERIFIER_CATEGORY: &str = "oid4vc-verifier";
/// States a verification session accepts a response in.
const OPEN_STATES: &[VerificationSessionState] = &[
    VerificationSessionState::RequestCreated,
    VerificationSessionState::RequestUriRetrieved,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierRecord {
    pub verifier_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Public URL the verifier routes are mounted under (`…/oid4vp`).
    pub base_url: String,
    pub request_expires_in: Duration,
}

impl VerifierConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            request_expires_in: Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationRequestOptions {
    pub verifier_id: String,
    /// DID URL of the key signing the request object.
    pub request_signer: String,
    pub presentation_definition: PresentationDefinition,
}

/// Form body of a `direct_post` authorization response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationResponse {
    #[serde(default)]
    pub vp_token: Option<String>,
    /// JSON-encoded presentation submission.
    #[serde(default)]
    pub presentation_submission: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor_id: Option<String>,
    pub issuer: String,
    pub types: Vec<String>,
    pub credential_subject: Map<String, Value>,
    pub issuance_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAuthorizationResponse {
    /// DID that signed the presentation.
    pub holder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<PresentationSubmission>,
    pub credentials: Vec<VerifiedCredential>,
}

pub struct Verifier {
    wallet: Arc<Wallet>,
    dids: Arc<DidRegistry>,
    events: EventBus,
    config: VerifierConfig,
    sessions: SessionStore<VerificationSession>,
}

impl Verifier {
    pub fn new(
        wallet: Arc<Wallet>,
        dids: Arc<DidRegistry>,
        events: EventBus,
        config: VerifierConfig,
    ) -> Self {
        Self {
            sessions: SessionStore::new(wallet.clone()),
            wallet,
            dids,
            events,
            config,
        }
    }

    pub fn verifier_url(&self, verifier_id: &str) -> String {
        format!("{}/{verifier_id}", self.config.base_url)
    }

    pub fn create_verifier(&self, verifier_id: &str) -> Result<VerifierRecord> {
        let record = VerifierRecord {
            verifier_id: verifier_id.to_owned(),
            created_at: Utc::now(),
        };
        self.wallet.insert(
            VERIFIER_CATEGORY,
            verifier_id,
            &record,
            &tags([("verifierId", verifier_id)]),
        )?;
        tracing::info!(%verifier_id, "Created OpenID4VP verifier");
        Ok(record)
    }

    pub fn get_verifier_by_verifier_id(&self, verifier_id: &str) -> Result<VerifierRecord> {
        self.wallet
            .fetch(VERIFIER_CATEGORY, verifier_id)?
            .ok_or_else(|| Error::NotFound(format!("No verifier with id {verifier_id}")))
    }

    pub fn get_verification_session_by_id(&self, id: &str) -> Result<VerificationSession> {
        self.sessions
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("No verification session with id {id}")))
    }

    /// The verified presentation of a session in `ResponseVerified`.
    pub fn get_verified_authorization_response(
        &self,
        id: &str,
    ) -> Result<VerifiedAuthorizationResponse> {
        let session = self.get_verification_session_by_id(id)?;
        match (session.state, session.authorization_response) {
            (VerificationSessionState::ResponseVerified, Some(response)) => Ok(response),
            (state, _) => Err(Error::InvalidRequest(format!(
                "Verification session {id} is in state {state}, not ResponseVerified"
            ))),
        }
    }

    /// Move `session` to `state` if the stored session is still in one of
    /// `from`.
    fn transition(
        &self,
        session: &mut VerificationSession,
        from: &[VerificationSessionState],
        state: VerificationSessionState,
    ) -> Result<()> {
        let previous = session.state;
        session.state = state;
        if !self.sessions.update(session, from)? {
            session.state = previous;
            return Err(Error::InvalidRequest(format!(
                "Verification session {} was changed by a concurrent request",
                session.id
            )));
        }
        tracing::debug!(session = %session.id, from = %previous, to = %state, "Verification session transition");
        self.events.emit(AgentEvent::VerificationSessionStateChanged {
            session: session.clone(),
            previous_state: Some(previous),
        });
        Ok(())
    }

    /// Create a signed request object. Returns the `openid4vp://` URI and the
    /// new session.
    pub fn create_authorization_request(
        &self,
        options: AuthorizationRequestOptions,
    ) -> Result<(String, VerificationSession)> {
        self.get_verifier_by_verifier_id(&options.verifier_id)?;
        let client_id = did_from_url(&options.request_signer).to_owned();
        let key = self.dids.signing_key(&options.request_signer)?;

        let id = uuid::Uuid::new_v4().to_string();
        let nonce = random_token();
        let now = Utc::now();
        let expires_at = now + self.config.request_expires_in;
        let url = self.verifier_url(&options.verifier_id);

        let claims = json!({
            "iss": client_id,
            "aud": SELF_ISSUED_AUDIENCE,
            "iat": now.timestamp(),
            "exp": expires_at.timestamp(),
            "client_id": client_id,
            "client_id_scheme": "did",
            "response_type": "vp_token",
            "response_mode": "direct_post",
            "response_uri": format!("{url}/authorize"),
            "nonce": nonce,
            "state": id,
            "presentation_definition": options.presentation_definition,
            "client_metadata": {
                "vp_formats": {
                    "jwt_vp_json": {"alg": ["EdDSA", "ES256"]},
                    "jwt_vc_json": {"alg": ["EdDSA", "ES256"]},
                },
            },
        });
        let request_object = jwt::sign(
            &Header::eddsa(REQUEST_OBJECT_TYP, &options.request_signer),
            &claims,
            &key,
        )?;

        let request_uri = format!("{url}/authorize?id={id}");
        let query = serde_urlencoded::to_string([
            ("client_id", client_id.as_str()),
            ("request_uri", request_uri.as_str()),
        ])
        .map_err(anyhow::Error::from)?;
        let authorization_request_uri = format!("openid4vp://?{query}");

        let session = VerificationSession {
            id,
            verifier_id: options.verifier_id,
            state: VerificationSessionState::RequestCreated,
            authorization_request_uri: authorization_request_uri.clone(),
            authorization_request_jwt: request_object,
            nonce,
            presentation_definition: options.presentation_definition,
            authorization_response: None,
            error_message: None,
            created_at: now,
            expires_at,
        };
        self.sessions.create(&session)?;
        self.events.emit(AgentEvent::VerificationSessionStateChanged {
            session: session.clone(),
            previous_state: None,
        });
        Ok((authorization_request_uri, session))
    }

    /// Serve the request object behind a `request_uri`.
    pub fn get_authorization_request(&self, verifier_id: &str, session_id: &str) -> Result<String> {
        let mut session = self.get_verification_session_by_id(session_id)?;
        if session.verifier_id != verifier_id {
            return Err(Error::NotFound(format!(
                "No verification session with id {session_id}"
            )));
        }
        if session.is_expired() {
            return Err(Error::InvalidRequest("Authorization request has expired".into()));
        }
        if session.state == VerificationSessionState::RequestCreated {
            self.transition(
                &mut session,
                &[VerificationSessionState::RequestCreated],
                VerificationSessionState::RequestUriRetrieved,
            )?;
        }
        Ok(session.authorization_request_jwt)
    }

    /// Verify a `direct_post` response. Verification failures move the
    /// session to `Error` with the reason.
    pub async fn verify_authorization_response(
        &self,
        verifier_id: &str,
        response: &AuthorizationResponse,
    ) -> Result<VerificationSession> {
        let state = response
            .state
            .as_deref()
            .ok_or_else(|| Error::InvalidRequest("Missing state".into()))?;
        let mut session = self
            .sessions
            .get(state)?
            .filter(|s| s.verifier_id == verifier_id)
            .ok_or_else(|| Error::InvalidRequest(format!("Unknown state {state}")))?;
        if session.state.is_terminal() {
            return Err(Error::InvalidRequest(format!(
                "Verification session is in state {}",
                session.state
            )));
        }

        match self.verify(&session, response).await {
            Ok(verified) => {
                tracing::info!(session = %session.id, holder = %verified.holder, "Presentation verified");
                session.authorization_response = Some(verified);
                self.transition(&mut session, OPEN_STATES, VerificationSessionState::ResponseVerified)?;
                Ok(session)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(session = %session.id, "Presentation rejected: {reason}");
                session.error_message = Some(reason.clone());
                self.transition(&mut session, OPEN_STATES, VerificationSessionState::Error)?;
                Err(Error::InvalidRequest(reason))
            }
        }
    }

    async fn verify(
        &self,
        session: &VerificationSession,
        response: &AuthorizationResponse,
    ) -> anyhow::Result<VerifiedAuthorizationResponse> {
        if session.is_expired() {
            anyhow::bail!("Authorization request has expired");
        }
        let vp_token = response
            .vp_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Missing vp_token"))?;

        let (header, _) = jwt::decode_unverified(vp_token)?;
        let kid = header
            .kid
            .ok_or_else(|| anyhow::anyhow!("Presentation has no kid"))?;
        let holder = did_from_url(&kid).to_owned();
        let holder_key = self.dids.resolve_key(&kid).await?;
        let claims = jwt::verify(vp_token, &holder_key)?;

        if claims["nonce"].as_str() != Some(session.nonce.as_str()) {
            anyhow::bail!("Presentation nonce does not match the request");
        }
        let client_id = did_from_url(&session.verifier_id);
        if !jwt::audience_contains(&claims, client_id) {
            anyhow::bail!("Presentation audience is not this verifier");
        }
        if let Some(iss) = claims["iss"].as_str() {
            if iss != holder {
                anyhow::bail!("Presentation issuer {iss} does not match signing key {kid}");
            }
        }

        let embedded = match &claims["vp"]["verifiableCredential"] {
            Value::Array(items) => items.clone(),
            Value::String(single) => vec![Value::String(single.clone())],
            _ => anyhow::bail!("Presentation carries no credentials"),
        };

        let mut payloads = Vec::with_capacity(embedded.len());
        let mut credentials = Vec::with_capacity(embedded.len());
        for item in embedded {
            let token = item
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Only JWT credentials are supported"))?;
            let (payload, credential) = self.verify_credential(token, &holder).await?;
            payloads.push(payload);
            credentials.push(credential);
        }

        let submission = match response.presentation_submission.as_deref() {
            Some(raw) => {
                let submission: PresentationSubmission = serde_json::from_str(raw)
                    .map_err(|e| anyhow::anyhow!("Invalid presentation_submission: {e}"))?;
                session.presentation_definition.check_submission(&submission)?;
                Some(submission)
            }
            None => None,
        };

        for matched in session.presentation_definition.evaluate(&payloads)? {
            credentials[matched.credential_index].descriptor_id = Some(matched.descriptor_id);
        }

        Ok(VerifiedAuthorizationResponse {
            holder,
            presentation_submission: submission,
            credentials,
        })
    }

    async fn verify_credential(
        &self,
        token: &str,
        holder: &str,
    ) -> anyhow::Result<(Value, VerifiedCredential)> {
        let (header, unverified) = jwt::decode_unverified(token)?;
        let kid = credential_key_id(header.kid.as_deref(), unverified["iss"].as_str())?;
        let issuer_key = self.dids.resolve_key(&kid).await?;
        let payload = jwt::verify(token, &issuer_key)?;

        if let Some(sub) = payload["sub"].as_str() {
            if sub != holder {
                anyhow::bail!("Credential subject {sub} is not the presenting holder {holder}");
            }
        }
        let credential = W3cCredential::from_jwt_claims(&payload)?;
        if credential.issuer.id != did_from_url(&kid) {
            anyhow::bail!(
                "Credential issuer {} did not sign it ({kid})",
                credential.issuer.id
            );
        }

        let verified = VerifiedCredential {
            descriptor_id: None,
            issuer: credential.issuer.id,
            types: credential.types,
            credential_subject: credential.credential_subject.claims,
            issuance_date: credential.issuance_date,
            expiration_date: credential.expiration_date,
        };
        Ok((payload, verified))
    }
}

/// DID URL of the key that signed a credential: the header `kid` when it is
/// a DID URL, else that key id resolved against the `iss` DID.
fn credential_key_id(kid: Option<&str>, iss: Option<&str>) -> anyhow::Result<String> {
    match (kid, iss) {
        (Some(kid), _) if kid.starts_with("did:") => Ok(kid.to_owned()),
        (Some(fragment), Some(iss)) if fragment.starts_with('#') => Ok(format!("{iss}{fragment}")),
        (Some(fragment), Some(iss)) => Ok(format!("{iss}#{fragment}")),
        (None, Some(iss)) => Ok(iss.to_owned()),
        (_, None) => anyhow::bail!("Credential names no issuer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::did::key::ed25519_did_key;
    use crate::oid4vc::issuer::tests::registry_with_backend_did;
    use crate::oid4vc::W3cCredentialSubject;
    use ed25519_dalek::SigningKey;

    fn definition() -> PresentationDefinition {
        serde_json::from_value(json!({
            "id": "hospital_prescription_verification",
            "input_descriptors": [{
                "id": "PrescriptionDescriptor",
                "constraints": {"fields": [{
                    "path": ["$.type", "$.vc.type.*", "$.vct"],
                    "filter": {"type": "string", "pattern": "Prescription"}
                }]}
            }]
        }))
        .unwrap()
    }

    struct Fixture {
        verifier: Verifier,
        dids: Arc<DidRegistry>,
        verifier_id: String,
        holder_key: SigningKey,
        holder_did: String,
    }

    impl Fixture {
        async fn new() -> Self {
            let (wallet, dids, verifier_id) = registry_with_backend_did().await;
            let verifier = Verifier::new(
                wallet,
                dids.clone(),
                EventBus::new(),
                VerifierConfig::new("http://127.0.0.1:3000/oid4vp"),
            );
            verifier.create_verifier(&verifier_id).unwrap();
            let holder_key = SigningKey::from_bytes(&[4u8; 32]);
            let holder_did = ed25519_did_key(holder_key.verifying_key().as_bytes());
            Self {
                verifier,
                dids,
                verifier_id,
                holder_key,
                holder_did,
            }
        }

        fn request(&self) -> (String, VerificationSession) {
            self.verifier
                .create_authorization_request(AuthorizationRequestOptions {
                    verifier_id: self.verifier_id.clone(),
                    request_signer: format!("{}#key-1", self.verifier_id),
                    presentation_definition: definition(),
                })
                .unwrap()
        }

        fn credential(&self, types: &[&str]) -> String {
            let mut claims = Map::new();
            claims.insert("activeIngredient".into(), json!("Ibuprofen"));
            let credential = W3cCredential::new(
                types.iter().map(|t| t.to_string()).collect(),
                &self.verifier_id,
                W3cCredentialSubject {
                    id: Some(self.holder_did.clone()),
                    claims,
                },
                Utc::now(),
                Some(Utc::now() + Duration::days(1)),
            );
            let vm = format!("{}#key-1", self.verifier_id);
            let key = self.dids.signing_key(&vm).unwrap();
            credential.sign_jwt(&vm, &key).unwrap()
        }

        fn response(&self, session: &VerificationSession, vc: String, nonce: &str) -> AuthorizationResponse {
            let kid = format!(
                "{}#{}",
                self.holder_did,
                self.holder_did.trim_start_matches("did:key:")
            );
            let vp = jwt::sign(
                &Header::eddsa("JWT", &kid),
                &json!({
                    "iss": self.holder_did,
                    "aud": self.verifier_id,
                    "nonce": nonce,
                    "vp": {
                        "@context": ["https://www.w3.org/2018/credentials/v1"],
                        "type": ["VerifiablePresentation"],
                        "verifiableCredential": [vc],
                    },
                }),
                &self.holder_key,
            )
            .unwrap();
            AuthorizationResponse {
                vp_token: Some(vp),
                presentation_submission: Some(
                    json!({
                        "id": "submission",
                        "definition_id": "hospital_prescription_verification",
                        "descriptor_map": [{
                            "id": "PrescriptionDescriptor",
                            "format": "jwt_vp_json",
                            "path": "$",
                            "path_nested": {"id": "PrescriptionDescriptor", "format": "jwt_vc_json", "path": "$.vp.verifiableCredential[0]"}
                        }]
                    })
                    .to_string(),
                ),
                state: Some(session.id.clone()),
            }
        }
    }

    #[tokio::test]
    async fn request_object_is_signed_by_verifier_did() {
        let f = Fixture::new().await;
        let (uri, session) = f.request();
        assert!(uri.starts_with("openid4vp://?client_id=did%3Asov%3A"));
        assert!(uri.contains("request_uri="));

        let jwt = f
            .verifier
            .get_authorization_request(&f.verifier_id, &session.id)
            .unwrap();
        let key = f.dids.resolve_key(&format!("{}#key-1", f.verifier_id)).await.unwrap();
        let claims = jwt::verify(&jwt, &key).unwrap();
        assert_eq!(claims["client_id_scheme"], "did");
        assert_eq!(claims["response_mode"], "direct_post");
        assert_eq!(claims["state"], session.id);
        assert_eq!(claims["presentation_definition"]["id"], "hospital_prescription_verification");
        let (header, _) = jwt::decode_unverified(&jwt).unwrap();
        assert_eq!(header.typ.as_deref(), Some(REQUEST_OBJECT_TYP));

        assert_eq!(
            f.verifier.get_verification_session_by_id(&session.id).unwrap().state,
            VerificationSessionState::RequestUriRetrieved
        );
    }

    #[tokio::test]
    async fn valid_presentation_is_verified() {
        let f = Fixture::new().await;
        let mut events = f.verifier.events.subscribe();
        let (_, session) = f.request();
        f.verifier
            .get_authorization_request(&f.verifier_id, &session.id)
            .unwrap();

        let vc = f.credential(&["VerifiableCredential", "Prescription"]);
        let response = f.response(&session, vc, &session.nonce);
        let verified = f
            .verifier
            .verify_authorization_response(&f.verifier_id, &response)
            .await
            .unwrap();
        assert_eq!(verified.state, VerificationSessionState::ResponseVerified);

        let result = f
            .verifier
            .get_verified_authorization_response(&session.id)
            .unwrap();
        assert_eq!(result.holder, f.holder_did);
        assert_eq!(result.credentials[0].credential_subject["activeIngredient"], "Ibuprofen");
        assert_eq!(
            result.credentials[0].descriptor_id.as_deref(),
            Some("PrescriptionDescriptor")
        );

        let mut states = Vec::new();
        for _ in 0..3 {
            states.push(events.next_verification(&session.id).await.unwrap().state);
        }
        assert_eq!(
            states,
            vec![
                VerificationSessionState::RequestCreated,
                VerificationSessionState::RequestUriRetrieved,
                VerificationSessionState::ResponseVerified,
            ]
        );
    }

    #[tokio::test]
    async fn wrong_nonce_moves_session_to_error() {
        let f = Fixture::new().await;
        let (_, session) = f.request();
        let vc = f.credential(&["VerifiableCredential", "Prescription"]);
        let response = f.response(&session, vc, "replayed");

        let err = f
            .verifier
            .verify_authorization_response(&f.verifier_id, &response)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nonce"));

        let stored = f.verifier.get_verification_session_by_id(&session.id).unwrap();
        assert_eq!(stored.state, VerificationSessionState::Error);
        assert!(stored.error_message.unwrap().contains("nonce"));
        assert!(f.verifier.get_verified_authorization_response(&session.id).is_err());
    }

    #[tokio::test]
    async fn credential_not_matching_definition_is_rejected() {
        let f = Fixture::new().await;
        let (_, session) = f.request();
        let vc = f.credential(&["VerifiableCredential", "DriversLicense"]);
        let response = f.response(&session, vc, &session.nonce);

        let err = f
            .verifier
            .verify_authorization_response(&f.verifier_id, &response)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PrescriptionDescriptor"));
    }

    #[tokio::test]
    async fn unknown_state_is_rejected_without_session() {
        let f = Fixture::new().await;
        let response = AuthorizationResponse {
            state: Some("nope".into()),
            ..AuthorizationResponse::default()
        };
        let err = f
            .verifier
            .verify_authorization_response(&f.verifier_id, &response)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(
            f.verifier.get_verification_session_by_id("nope").unwrap_err().code(),
            "not_found"
        );
    }

    #[tokio::test]
    async fn concurrent_responses_verify_once() {
        let f = Fixture::new().await;
        let (_, session) = f.request();
        let vc = f.credential(&["VerifiableCredential", "Prescription"]);
        let response = f.response(&session, vc, &session.nonce);

        let (a, b) = futures::join!(
            f.verifier.verify_authorization_response(&f.verifier_id, &response),
            f.verifier.verify_authorization_response(&f.verifier_id, &response),
        );
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        assert_eq!(
            f.verifier.get_verification_session_by_id(&session.id).unwrap().state,
            VerificationSessionState::ResponseVerified
        );
    }

    #[tokio::test]
    async fn finished_session_is_not_overwritten_by_stale_copy() {
        let f = Fixture::new().await;
        let (_, session) = f.request();
        let mut stale = f.verifier.get_verification_session_by_id(&session.id).unwrap();

        let vc = f.credential(&["VerifiableCredential", "Prescription"]);
        let response = f.response(&session, vc, &session.nonce);
        f.verifier
            .verify_authorization_response(&f.verifier_id, &response)
            .await
            .unwrap();

        let err = f
            .verifier
            .transition(&mut stale, OPEN_STATES, VerificationSessionState::Error)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(
            f.verifier.get_verification_session_by_id(&session.id).unwrap().state,
            VerificationSessionState::ResponseVerified
        );
    }

    #[test]
    fn credential_key_id_joins_relative_kids_onto_issuer() {
        let iss = Some("did:sov:V4SGRU86Z58d6TV7PBUe6f");
        assert_eq!(
            credential_key_id(Some("did:key:z6Mk#z6Mk"), None).unwrap(),
            "did:key:z6Mk#z6Mk"
        );
        assert_eq!(
            credential_key_id(Some("#key-1"), iss).unwrap(),
            "did:sov:V4SGRU86Z58d6TV7PBUe6f#key-1"
        );
        assert_eq!(
            credential_key_id(Some("key-1"), iss).unwrap(),
            "did:sov:V4SGRU86Z58d6TV7PBUe6f#key-1"
        );
        assert_eq!(credential_key_id(None, iss).unwrap(), "did:sov:V4SGRU86Z58d6TV7PBUe6f");
        assert!(credential_key_id(Some("key-1"), None).is_err());
        assert!(credential_key_id(None, None).is_err());
    }
}
