// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Issuance and verification session records, persisted in the wallet.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::presentation::PresentationDefinition;
use super::verifier::VerifiedAuthorizationResponse;
use crate::wallet::{tags, Tags, Wallet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum IssuanceSessionState {
    OfferCreated,
    OfferUriRetrieved,
    AccessTokenRequested,
    AccessTokenCreated,
    CredentialRequestReceived,
    CredentialsPartiallyIssued,
    Completed,
    Error,
}

impl IssuanceSessionState {
    /// No further transitions happen from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for IssuanceSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VerificationSessionState {
    RequestCreated,
    RequestUriRetrieved,
    ResponseVerified,
    Error,
}

impl VerificationSessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ResponseVerified | Self::Error)
    }
}

impl fmt::Display for VerificationSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceSession {
    pub id: String,
    pub issuer_id: String,
    pub state: IssuanceSessionState,
    pub credential_offer_uri: String,
    /// The credential offer object served at `credential_offer_uri`.
    pub credential_offer: Value,
    pub pre_authorized_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_at: Option<DateTime<Utc>>,
    /// Application data attached when the offer was created.
    #[serde(default)]
    pub issuance_metadata: Map<String, Value>,
    /// Configuration ids offered in this session.
    pub offered_credentials: Vec<String>,
    /// Configuration ids already issued.
    #[serde(default)]
    pub issued_credentials: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IssuanceSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSession {
    pub id: String,
    pub verifier_id: String,
    pub state: VerificationSessionState,
    /// `openid4vp://` URI handed to the wallet.
    pub authorization_request_uri: String,
    /// Signed request object served at the `request_uri`.
    pub authorization_request_jwt: String,
    pub nonce: String,
    pub presentation_definition: PresentationDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_response: Option<VerifiedAuthorizationResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// How long a session record outlives its `expires_at` before it is purged.
/// Covers token and credential requests finishing after the offer expired
/// and result pages read after the verification.
pub const SESSION_RETENTION: Duration = Duration::minutes(30);

/// A session type stored under its own wallet category.
pub trait SessionRecord: Serialize + DeserializeOwned {
    const CATEGORY: &'static str;
    type State: fmt::Display + Copy;

    fn id(&self) -> &str;
    fn state(&self) -> Self::State;
    fn expires_at(&self) -> DateTime<Utc>;

    /// Tags the record can be looked up by, besides its state.
    fn lookup_tags(&self) -> Tags {
        Tags::new()
    }
}

impl SessionRecord for IssuanceSession {
    const CATEGORY: &'static str = "oid4vc-issuance-session";
    type State = IssuanceSessionState;

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> IssuanceSessionState {
        self.state
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn lookup_tags(&self) -> Tags {
        tags([
            ("issuerId", self.issuer_id.as_str()),
            ("preAuthorizedCode", self.pre_authorized_code.as_str()),
        ])
    }
}

impl SessionRecord for VerificationSession {
    const CATEGORY: &'static str = "oid4vc-verification-session";
    type State = VerificationSessionState;

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> VerificationSessionState {
        self.state
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn lookup_tags(&self) -> Tags {
        tags([
            ("verifierId", self.verifier_id.as_str()),
            ("nonce", self.nonce.as_str()),
        ])
    }
}

fn record_tags<T: SessionRecord>(session: &T) -> Tags {
    let mut tags = session.lookup_tags();
    tags.insert("state".into(), session.state().to_string());
    tags
}

/// Typed view on the wallet for one session kind.
pub struct SessionStore<T> {
    wallet: Arc<Wallet>,
    _record: PhantomData<fn() -> T>,
}

impl<T: SessionRecord> SessionStore<T> {
    pub fn new(wallet: Arc<Wallet>) -> Self {
        Self {
            wallet,
            _record: PhantomData,
        }
    }

    /// Store a new session, dropping sessions past their retention first.
    pub fn create(&self, session: &T) -> Result<()> {
        let purged = self.wallet.purge_expired(T::CATEGORY, Utc::now())?;
        if purged > 0 {
            tracing::debug!(category = T::CATEGORY, purged, "Purged expired sessions");
        }
        self.wallet.replace_expiring(
            T::CATEGORY,
            session.id(),
            session,
            &record_tags(session),
            session.expires_at() + SESSION_RETENTION,
        )?;
        Ok(())
    }

    /// Store `session` if the stored copy is still in one of `from`.
    /// `false` means another request moved the session first.
    pub fn update(&self, session: &T, from: &[T::State]) -> Result<bool> {
        let from: Vec<String> = from.iter().map(ToString::to_string).collect();
        let from: Vec<&str> = from.iter().map(String::as_str).collect();
        Ok(self.wallet.replace_if_tag(
            T::CATEGORY,
            session.id(),
            session,
            &record_tags(session),
            Some(session.expires_at() + SESSION_RETENTION),
            "state",
            &from,
        )?)
    }

    pub fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.wallet.fetch(T::CATEGORY, id)?)
    }

    pub fn find_by_tag(&self, name: &str, value: &str) -> Result<Option<T>> {
        Ok(self.wallet.find(T::CATEGORY, &tags([(name, value)]))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(id: &str, code: &str) -> IssuanceSession {
        IssuanceSession {
            id: id.into(),
            issuer_id: "did:sov:issuer".into(),
            state: IssuanceSessionState::OfferCreated,
            credential_offer_uri: format!("http://localhost/offers/{id}"),
            credential_offer: json!({}),
            pre_authorized_code: code.into(),
            user_pin: None,
            c_nonce: None,
            c_nonce_expires_at: None,
            issuance_metadata: Map::new(),
            offered_credentials: vec!["Prescription".into()],
            issued_credentials: vec![],
            error_message: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::minutes(10),
        }
    }

    #[test]
    fn states_serialize_in_pascal_case() {
        assert_eq!(
            serde_json::to_value(IssuanceSessionState::OfferUriRetrieved).unwrap(),
            "OfferUriRetrieved"
        );
        assert_eq!(VerificationSessionState::ResponseVerified.to_string(), "ResponseVerified");
        assert!(IssuanceSessionState::Error.is_terminal());
        assert!(!VerificationSessionState::RequestUriRetrieved.is_terminal());
    }

    fn store() -> SessionStore<IssuanceSession> {
        SessionStore::new(Arc::new(Wallet::open_in_memory("k").unwrap()))
    }

    #[test]
    fn store_finds_sessions_by_tag() {
        let store = store();
        store.create(&session("a", "code-a")).unwrap();
        store.create(&session("b", "code-b")).unwrap();

        let found = store.find_by_tag("preAuthorizedCode", "code-b").unwrap().unwrap();
        assert_eq!(found.id, "b");
        assert!(store.find_by_tag("preAuthorizedCode", "nope").unwrap().is_none());
        assert_eq!(store.find_by_tag("state", "OfferCreated").unwrap().unwrap().id, "a");

        let mut updated = found;
        updated.state = IssuanceSessionState::Completed;
        assert!(store.update(&updated, &[IssuanceSessionState::OfferCreated]).unwrap());
        assert_eq!(
            store.get("b").unwrap().unwrap().state,
            IssuanceSessionState::Completed
        );
    }

    #[test]
    fn update_from_a_stale_state_is_refused() {
        let store = store();
        let created = session("a", "code-a");
        store.create(&created).unwrap();

        let mut first = created.clone();
        first.state = IssuanceSessionState::AccessTokenRequested;
        let mut second = created;
        second.state = IssuanceSessionState::Error;

        assert!(store.update(&first, &[IssuanceSessionState::OfferCreated]).unwrap());
        assert!(!store.update(&second, &[IssuanceSessionState::OfferCreated]).unwrap());
        assert_eq!(
            store.get("a").unwrap().unwrap().state,
            IssuanceSessionState::AccessTokenRequested
        );
    }

    #[test]
    fn creating_a_session_purges_those_past_retention() {
        let store = store();
        let mut stale = session("old", "code-old");
        stale.expires_at = Utc::now() - SESSION_RETENTION - Duration::minutes(1);
        store.create(&stale).unwrap();
        let mut recent = session("recent", "code-recent");
        recent.expires_at = Utc::now() - Duration::minutes(1);
        store.create(&recent).unwrap();

        store.create(&session("new", "code-new")).unwrap();
        assert!(store.get("old").unwrap().is_none());
        assert!(store.find_by_tag("preAuthorizedCode", "code-old").unwrap().is_none());
        assert!(store.get("recent").unwrap().is_some());
        assert!(store.get("new").unwrap().is_some());
    }
}
