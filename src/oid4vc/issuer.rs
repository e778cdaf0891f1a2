// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! OpenID4VCI issuer: metadata, pre-authorized code offers, the token
//! endpoint and the credential endpoint.
//!
//! Every session transition is persisted and published on the
//! [`EventBus`]. Issuer-specific credential contents come from a
//! [`CredentialMapper`].

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::credential::W3cCredential;
use super::jwt::{self, Header};
use super::session::{IssuanceSession, IssuanceSessionState, SessionStore};
use super::{Error, Result, JWT_VC_JSON};
use crate::agent::events::{AgentEvent, EventBus};
use crate::did::{did_from_url, ed25519_jwk, DidRegistry};
use crate::util::{random_digits, random_token};
use crate::wallet::{tags, Wallet};

pub const PRE_AUTHORIZED_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";
pub const PROOF_JWT_TYP: &str = "openid4vci-proof+jwt";
const ACCESS_TOKEN_TYP: &str = "at+jwt";
const ISSUER_CATEGORY: &str = "oid4vc-issuer";
const USER_PIN_LENGTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerDisplay {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialDefinition {
    #[serde(rename = "type")]
    pub types: Vec<String>,
    #[serde(
        rename = "credentialSubject",
        default,
        skip_serializing_if = "Map::is_empty"
    )]
    pub credential_subject: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfiguration {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cryptographic_binding_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credential_signing_alg_values_supported: Vec<String>,
    pub credential_definition: CredentialDefinition,
}

impl CredentialConfiguration {
    /// Whether a holder DID may be bound to credentials of this kind.
    /// `did` in the supported methods accepts any DID.
    pub fn supports_did(&self, did: &str) -> bool {
        let methods = &self.cryptographic_binding_methods_supported;
        methods.is_empty()
            || methods
                .iter()
                .any(|m| m == "did" || m == did || did.starts_with(&format!("{m}:")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRecord {
    pub issuer_id: String,
    pub display: Vec<IssuerDisplay>,
    pub credential_configurations_supported: BTreeMap<String, CredentialConfiguration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key a credential is bound to, taken from the proof of possession.
#[derive(Debug, Clone, PartialEq)]
pub enum HolderBinding {
    Did { did_url: String },
    Jwk { jwk: Value },
}

impl HolderBinding {
    pub fn did_url(&self) -> Option<&str> {
        match self {
            Self::Did { did_url } => Some(did_url),
            Self::Jwk { .. } => None,
        }
    }
}

/// Input handed to a [`CredentialMapper`].
pub struct MapCredentialRequest<'a> {
    pub session: &'a IssuanceSession,
    pub holder_bindings: &'a [HolderBinding],
    pub credential_configuration_ids: &'a [String],
    pub credential_configurations_supported: &'a BTreeMap<String, CredentialConfiguration>,
}

#[derive(Debug, Clone)]
pub struct CredentialToSign {
    pub credential: W3cCredential,
    /// Issuer DID URL whose key signs the credential.
    pub verification_method: String,
}

#[derive(Debug, Clone)]
pub struct MappedCredential {
    pub credential_configuration_id: String,
    pub format: String,
    pub credentials: Vec<CredentialToSign>,
}

/// Turns an accepted credential request into unsigned credentials.
#[async_trait]
pub trait CredentialMapper: Send + Sync {
    async fn map(&self, request: MapCredentialRequest<'_>) -> anyhow::Result<MappedCredential>;
}

#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Public URL the issuer routes are mounted under (`…/oid4vci`).
    pub base_url: String,
    pub offer_expires_in: Duration,
    pub access_token_expires_in: Duration,
    pub c_nonce_expires_in: Duration,
}

impl IssuerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            offer_expires_in: Duration::minutes(10),
            access_token_expires_in: Duration::minutes(3),
            c_nonce_expires_in: Duration::minutes(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialOfferOptions {
    pub issuer_id: String,
    pub offered_credentials: Vec<String>,
    pub user_pin_required: bool,
    pub issuance_metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(rename = "pre-authorized_code", default)]
    pub pre_authorized_code: Option<String>,
    #[serde(default)]
    pub user_pin: Option<String>,
    #[serde(default)]
    pub tx_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub c_nonce: String,
    pub c_nonce_expires_in: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialRequest {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub credential_configuration_id: Option<String>,
    #[serde(default)]
    pub credential_definition: Option<RequestedDefinition>,
    #[serde(default)]
    pub proof: Option<Proof>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestedDefinition {
    #[serde(rename = "type", default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Proof {
    pub proof_type: String,
    #[serde(default)]
    pub jwt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialResponse {
    pub format: String,
    pub credential: String,
    pub c_nonce: String,
    pub c_nonce_expires_in: i64,
}

pub struct Issuer {
    wallet: Arc<Wallet>,
    dids: Arc<DidRegistry>,
    events: EventBus,
    config: IssuerConfig,
    mapper: Arc<dyn CredentialMapper>,
    sessions: SessionStore<IssuanceSession>,
}

impl Issuer {
    pub fn new(
        wallet: Arc<Wallet>,
        dids: Arc<DidRegistry>,
        events: EventBus,
        config: IssuerConfig,
        mapper: Arc<dyn CredentialMapper>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(wallet.clone()),
            wallet,
            dids,
            events,
            config,
            mapper,
        }
    }

    /// `credential_issuer` identifier of an issuer.
    pub fn issuer_url(&self, issuer_id: &str) -> String {
        format!("{}/{issuer_id}", self.config.base_url)
    }

    // ── Issuer records ────────────────────────────────────────

    pub fn create_issuer(
        &self,
        issuer_id: &str,
        display: Vec<IssuerDisplay>,
        credential_configurations_supported: BTreeMap<String, CredentialConfiguration>,
    ) -> Result<IssuerRecord> {
        let now = Utc::now();
        let record = IssuerRecord {
            issuer_id: issuer_id.to_owned(),
            display,
            credential_configurations_supported,
            created_at: now,
            updated_at: now,
        };
        self.wallet
            .insert(ISSUER_CATEGORY, issuer_id, &record, &tags([("issuerId", issuer_id)]))?;
        tracing::info!(%issuer_id, "Created OpenID4VCI issuer");
        Ok(record)
    }

    pub fn get_issuer_by_issuer_id(&self, issuer_id: &str) -> Result<IssuerRecord> {
        self.wallet
            .fetch(ISSUER_CATEGORY, issuer_id)?
            .ok_or_else(|| Error::NotFound(format!("No issuer with id {issuer_id}")))
    }

    pub fn update_issuer_metadata(
        &self,
        issuer_id: &str,
        display: Vec<IssuerDisplay>,
        credential_configurations_supported: BTreeMap<String, CredentialConfiguration>,
    ) -> Result<IssuerRecord> {
        let mut record = self.get_issuer_by_issuer_id(issuer_id)?;
        record.display = display;
        record.credential_configurations_supported = credential_configurations_supported;
        record.updated_at = Utc::now();
        self.wallet
            .replace(ISSUER_CATEGORY, issuer_id, &record, &tags([("issuerId", issuer_id)]))?;
        Ok(record)
    }

    /// `/.well-known/openid-credential-issuer`
    pub fn issuer_metadata(&self, issuer_id: &str) -> Result<Value> {
        let record = self.get_issuer_by_issuer_id(issuer_id)?;
        let url = self.issuer_url(issuer_id);

        let mut configurations = Map::new();
        for (id, configuration) in &record.credential_configurations_supported {
            let mut value = serde_json::to_value(configuration).map_err(anyhow::Error::from)?;
            value["proof_types_supported"] = json!({
                "jwt": {"proof_signing_alg_values_supported": ["EdDSA", "ES256"]}
            });
            configurations.insert(id.clone(), value);
        }

        Ok(json!({
            "credential_issuer": url,
            "token_endpoint": format!("{url}/token"),
            "credential_endpoint": format!("{url}/credential"),
            "display": record.display,
            "credential_configurations_supported": configurations,
        }))
    }

    /// `/.well-known/oauth-authorization-server`
    pub fn authorization_server_metadata(&self, issuer_id: &str) -> Result<Value> {
        self.get_issuer_by_issuer_id(issuer_id)?;
        let url = self.issuer_url(issuer_id);
        Ok(json!({
            "issuer": url,
            "token_endpoint": format!("{url}/token"),
            "grant_types_supported": [PRE_AUTHORIZED_CODE_GRANT],
            "pre-authorized_grant_anonymous_access_supported": true,
            "token_endpoint_auth_methods_supported": ["none"],
        }))
    }

    // ── Sessions ──────────────────────────────────────────────

    pub fn get_issuance_session_by_id(&self, id: &str) -> Result<IssuanceSession> {
        self.sessions
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("No issuance session with id {id}")))
    }

    /// Move `session` to `state`, provided no other request moved the stored
    /// session away from its current state in the meantime.
    fn transition(&self, session: &mut IssuanceSession, state: IssuanceSessionState) -> Result<()> {
        let previous = session.state;
        session.state = state;
        if !self.sessions.update(session, &[previous])? {
            session.state = previous;
            return Err(Error::InvalidRequest(format!(
                "Issuance session {} was changed by a concurrent request",
                session.id
            )));
        }
        tracing::debug!(session = %session.id, from = %previous, to = %state, "Issuance session transition");
        self.events.emit(AgentEvent::IssuanceSessionStateChanged {
            session: session.clone(),
            previous_state: Some(previous),
        });
        Ok(())
    }

    fn fail(&self, session: &mut IssuanceSession, error: Error) -> Error {
        session.error_message = Some(error.to_string());
        if let Err(e) = self.transition(session, IssuanceSessionState::Error) {
            tracing::error!(session = %session.id, "Unable to record issuance failure: {e}");
        }
        error
    }

    /// Create a pre-authorized code offer. Returns the
    /// `openid-credential-offer://` URI and the new session.
    pub fn create_credential_offer(
        &self,
        options: CredentialOfferOptions,
    ) -> Result<(String, IssuanceSession)> {
        let issuer = self.get_issuer_by_issuer_id(&options.issuer_id)?;
        if options.offered_credentials.is_empty() {
            return Err(Error::InvalidRequest("No credentials offered".into()));
        }
        for id in &options.offered_credentials {
            if !issuer.credential_configurations_supported.contains_key(id) {
                return Err(Error::InvalidRequest(format!(
                    "Issuer {} does not support credential configuration {id}",
                    options.issuer_id
                )));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let url = self.issuer_url(&options.issuer_id);
        let pre_authorized_code = random_token();
        let user_pin = options
            .user_pin_required
            .then(|| random_digits(USER_PIN_LENGTH));

        let mut grant = json!({ "pre-authorized_code": pre_authorized_code });
        if user_pin.is_some() {
            grant["tx_code"] = json!({"input_mode": "numeric", "length": USER_PIN_LENGTH});
        }
        let credential_offer = json!({
            "credential_issuer": url,
            "credential_configuration_ids": options.offered_credentials,
            "grants": { PRE_AUTHORIZED_CODE_GRANT: grant },
        });

        let credential_offer_uri = format!("{url}/offers/{id}");
        let now = Utc::now();
        let session = IssuanceSession {
            id,
            issuer_id: options.issuer_id,
            state: IssuanceSessionState::OfferCreated,
            credential_offer_uri: credential_offer_uri.clone(),
            credential_offer,
            pre_authorized_code,
            user_pin,
            c_nonce: None,
            c_nonce_expires_at: None,
            issuance_metadata: options.issuance_metadata,
            offered_credentials: options.offered_credentials,
            issued_credentials: Vec::new(),
            error_message: None,
            created_at: now,
            expires_at: now + self.config.offer_expires_in,
        };
        self.sessions.create(&session)?;
        self.events.emit(AgentEvent::IssuanceSessionStateChanged {
            session: session.clone(),
            previous_state: None,
        });

        let query = serde_urlencoded::to_string([("credential_offer_uri", &credential_offer_uri)])
            .map_err(anyhow::Error::from)?;
        Ok((format!("openid-credential-offer://?{query}"), session))
    }

    /// Serve the offer object behind a `credential_offer_uri`.
    pub fn get_credential_offer(&self, issuer_id: &str, session_id: &str) -> Result<Value> {
        let mut session = self.get_issuance_session_by_id(session_id)?;
        if session.issuer_id != issuer_id {
            return Err(Error::NotFound(format!("No issuance session with id {session_id}")));
        }
        if session.is_expired() {
            return Err(Error::InvalidRequest("Credential offer has expired".into()));
        }
        if session.state == IssuanceSessionState::OfferCreated {
            self.transition(&mut session, IssuanceSessionState::OfferUriRetrieved)?;
        }
        Ok(session.credential_offer)
    }

    /// Token endpoint for the pre-authorized code grant.
    pub fn create_access_token(
        &self,
        issuer_id: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse> {
        if request.grant_type != PRE_AUTHORIZED_CODE_GRANT {
            return Err(Error::UnsupportedGrantType(format!(
                "Grant type {} is not supported",
                request.grant_type
            )));
        }
        let code = request
            .pre_authorized_code
            .as_deref()
            .ok_or_else(|| Error::InvalidRequest("Missing pre-authorized_code".into()))?;

        let mut session = self
            .sessions
            .find_by_tag("preAuthorizedCode", code)?
            .filter(|s| s.issuer_id == issuer_id)
            .ok_or_else(|| Error::InvalidGrant("Invalid pre-authorized code".into()))?;

        if !matches!(
            session.state,
            IssuanceSessionState::OfferCreated | IssuanceSessionState::OfferUriRetrieved
        ) {
            return Err(Error::InvalidGrant(
                "Pre-authorized code has already been used".into(),
            ));
        }
        if session.is_expired() {
            return Err(Error::InvalidGrant("Pre-authorized code has expired".into()));
        }

        self.transition(&mut session, IssuanceSessionState::AccessTokenRequested)?;

        if let Some(expected) = session.user_pin.clone() {
            let provided = request.tx_code.as_deref().or(request.user_pin.as_deref());
            if provided != Some(expected.as_str()) {
                let err = Error::InvalidGrant("Invalid transaction code".into());
                return Err(self.fail(&mut session, err));
            }
        }

        let now = Utc::now();
        let url = self.issuer_url(issuer_id);
        let claims = json!({
            "iss": url,
            "aud": url,
            "sub": session.id,
            "iat": now.timestamp(),
            "exp": (now + self.config.access_token_expires_in).timestamp(),
            "token_type": "Bearer",
            "pre-authorized_code": session.pre_authorized_code,
        });
        let key = self.dids.signing_key(issuer_id)?;
        let access_token = jwt::sign(
            &Header::eddsa(ACCESS_TOKEN_TYP, &format!("{issuer_id}#key-1")),
            &claims,
            &key,
        )?;

        let c_nonce = self.refresh_c_nonce(&mut session, now);
        self.transition(&mut session, IssuanceSessionState::AccessTokenCreated)?;

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".into(),
            expires_in: self.config.access_token_expires_in.num_seconds(),
            c_nonce,
            c_nonce_expires_in: self.config.c_nonce_expires_in.num_seconds(),
        })
    }

    fn refresh_c_nonce(&self, session: &mut IssuanceSession, now: DateTime<Utc>) -> String {
        let c_nonce = random_token();
        session.c_nonce = Some(c_nonce.clone());
        session.c_nonce_expires_at = Some(now + self.config.c_nonce_expires_in);
        c_nonce
    }

    /// Session an access token was issued for.
    fn authorize(&self, issuer_id: &str, authorization: &str) -> Result<IssuanceSession> {
        let token = authorization
            .strip_prefix("Bearer ")
            .or_else(|| authorization.strip_prefix("bearer "))
            .or_else(|| authorization.strip_prefix("DPoP "))
            .ok_or_else(|| Error::InvalidToken("Missing bearer access token".into()))?
            .trim();

        let key = self.dids.signing_key(issuer_id)?;
        let jwk = ed25519_jwk(key.verifying_key().as_bytes())?;
        let claims = jwt::verify(token, &jwk).map_err(|e| Error::InvalidToken(format!("{e:#}")))?;
        if claims["iss"] != self.issuer_url(issuer_id) {
            return Err(Error::InvalidToken("Access token issued by another issuer".into()));
        }
        let code = claims["pre-authorized_code"]
            .as_str()
            .ok_or_else(|| Error::InvalidToken("Access token carries no grant".into()))?;

        self.sessions
            .find_by_tag("preAuthorizedCode", code)?
            .ok_or_else(|| Error::InvalidToken("Access token refers to an unknown session".into()))
    }

    /// Credential endpoint. `authorization` is the raw `Authorization`
    /// header value.
    pub async fn create_credential_response(
        &self,
        issuer_id: &str,
        authorization: &str,
        request: &CredentialRequest,
    ) -> Result<CredentialResponse> {
        let issuer = self.get_issuer_by_issuer_id(issuer_id)?;
        let mut session = self.authorize(issuer_id, authorization)?;
        if !matches!(
            session.state,
            IssuanceSessionState::AccessTokenCreated
                | IssuanceSessionState::CredentialsPartiallyIssued
        ) {
            return Err(Error::InvalidRequest(format!(
                "Issuance session is in state {}",
                session.state
            )));
        }

        let configuration_id = self.select_configuration(&issuer, &session, request)?;
        let configuration = &issuer.credential_configurations_supported[&configuration_id];
        let binding = self.verify_proof(issuer_id, &session, configuration, request).await?;

        self.transition(&mut session, IssuanceSessionState::CredentialRequestReceived)?;

        let mapped = self
            .mapper
            .map(MapCredentialRequest {
                session: &session,
                holder_bindings: std::slice::from_ref(&binding),
                credential_configuration_ids: std::slice::from_ref(&configuration_id),
                credential_configurations_supported: &issuer.credential_configurations_supported,
            })
            .await;
        let mapped = match mapped {
            Ok(mapped) => mapped,
            Err(e) => {
                let err = Error::InvalidCredentialRequest(format!("{e:#}"));
                return Err(self.fail(&mut session, err));
            }
        };

        let credential = match self.sign_first(&mapped) {
            Ok(credential) => credential,
            Err(e) => return Err(self.fail(&mut session, e)),
        };

        if !session.issued_credentials.contains(&mapped.credential_configuration_id) {
            session
                .issued_credentials
                .push(mapped.credential_configuration_id.clone());
        }
        let c_nonce = self.refresh_c_nonce(&mut session, Utc::now());
        let all_issued = session
            .offered_credentials
            .iter()
            .all(|id| session.issued_credentials.contains(id));
        let next = if all_issued {
            IssuanceSessionState::Completed
        } else {
            IssuanceSessionState::CredentialsPartiallyIssued
        };
        self.transition(&mut session, next)?;

        Ok(CredentialResponse {
            format: mapped.format,
            credential,
            c_nonce,
            c_nonce_expires_in: self.config.c_nonce_expires_in.num_seconds(),
        })
    }

    fn select_configuration(
        &self,
        issuer: &IssuerRecord,
        session: &IssuanceSession,
        request: &CredentialRequest,
    ) -> Result<String> {
        if let Some(id) = &request.credential_configuration_id {
            if session.offered_credentials.contains(id)
                && issuer.credential_configurations_supported.contains_key(id)
            {
                return Ok(id.clone());
            }
            return Err(Error::InvalidCredentialRequest(format!(
                "Credential configuration {id} was not offered"
            )));
        }

        let format = request
            .format
            .as_deref()
            .ok_or_else(|| Error::InvalidCredentialRequest("Invalid credential request.".into()))?;
        let requested_types = request
            .credential_definition
            .as_ref()
            .map(|d| d.types.as_slice())
            .unwrap_or_default();

        let candidates: Vec<&String> = session
            .offered_credentials
            .iter()
            .filter(|id| {
                issuer
                    .credential_configurations_supported
                    .get(*id)
                    .is_some_and(|c| c.format == format)
            })
            .collect();
        if candidates.is_empty() {
            return Err(Error::UnsupportedCredentialFormat(format!(
                "Credential format {format} was not offered"
            )));
        }

        candidates
            .into_iter()
            .find(|id| {
                let defined = &issuer.credential_configurations_supported[*id]
                    .credential_definition
                    .types;
                requested_types.iter().all(|t| defined.contains(t))
            })
            .cloned()
            .ok_or_else(|| Error::InvalidCredentialRequest("Invalid credential request.".into()))
    }

    async fn verify_proof(
        &self,
        issuer_id: &str,
        session: &IssuanceSession,
        configuration: &CredentialConfiguration,
        request: &CredentialRequest,
    ) -> Result<HolderBinding> {
        let proof = request
            .proof
            .as_ref()
            .ok_or_else(|| Error::InvalidProof("Missing proof of possession".into()))?;
        if proof.proof_type != "jwt" {
            return Err(Error::InvalidProof(format!(
                "Proof type {} is not supported",
                proof.proof_type
            )));
        }
        let token = proof
            .jwt
            .as_deref()
            .ok_or_else(|| Error::InvalidProof("Missing proof jwt".into()))?;

        let (header, _) =
            jwt::decode_unverified(token).map_err(|e| Error::InvalidProof(format!("{e:#}")))?;
        if header.typ.as_deref() != Some(PROOF_JWT_TYP) {
            return Err(Error::InvalidProof(format!(
                "Proof typ must be {PROOF_JWT_TYP}"
            )));
        }

        let (binding, public_jwk) = match (&header.kid, &header.jwk) {
            (Some(kid), _) if kid.starts_with("did:") => {
                if !configuration.supports_did(did_from_url(kid)) {
                    return Err(Error::InvalidProof(format!(
                        "Holder binding {kid} is not supported for this credential"
                    )));
                }
                let jwk = self
                    .dids
                    .resolve_key(kid)
                    .await
                    .map_err(|e| Error::InvalidProof(format!("{e:#}")))?;
                (HolderBinding::Did { did_url: kid.clone() }, jwk)
            }
            (_, Some(jwk)) => (HolderBinding::Jwk { jwk: jwk.clone() }, jwk.clone()),
            _ => {
                return Err(Error::InvalidProof(
                    "Proof carries neither a DID kid nor a jwk".into(),
                ))
            }
        };

        let claims =
            jwt::verify(token, &public_jwk).map_err(|e| Error::InvalidProof(format!("{e:#}")))?;
        if !jwt::audience_contains(&claims, &self.issuer_url(issuer_id)) {
            return Err(Error::InvalidProof("Proof audience is not this issuer".into()));
        }
        let nonce_valid = session.c_nonce.is_some()
            && claims["nonce"].as_str() == session.c_nonce.as_deref()
            && session.c_nonce_expires_at.is_some_and(|exp| exp > Utc::now());
        if !nonce_valid {
            return Err(Error::InvalidProof("Invalid or expired c_nonce".into()));
        }
        Ok(binding)
    }

    fn sign_first(&self, mapped: &MappedCredential) -> Result<String> {
        if mapped.format != JWT_VC_JSON {
            return Err(Error::UnsupportedCredentialFormat(format!(
                "Cannot sign credentials in format {}",
                mapped.format
            )));
        }
        let to_sign = mapped
            .credentials
            .first()
            .ok_or_else(|| anyhow!("Credential mapper returned no credentials"))?;
        let key = self
            .dids
            .signing_key(&to_sign.verification_method)
            .context("Issuer key unavailable")?;
        Ok(to_sign
            .credential
            .sign_jwt(&to_sign.verification_method, &key)?)
    }
}
