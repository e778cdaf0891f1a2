// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Session state-change events.
//!
//! Listeners hold a [`Subscription`]; dropping it unregisters the listener.
//! A listener that falls behind the bus catches up from the wallet: the
//! session it waits for is re-read and handed out in its current state.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::oid4vc::session::{SessionRecord, SessionStore};
use crate::oid4vc::{
    IssuanceSession, IssuanceSessionState, VerificationSession, VerificationSessionState,
};
use crate::wallet::Wallet;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum AgentEvent {
    IssuanceSessionStateChanged {
        session: IssuanceSession,
        previous_state: Option<IssuanceSessionState>,
    },
    VerificationSessionStateChanged {
        session: VerificationSession,
        previous_state: Option<VerificationSessionState>,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
    /// Where lagging subscribers re-read sessions from.
    wallet: Option<Arc<Wallet>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx, wallet: None }
    }

    /// A bus whose subscribers recover from lag using the sessions in `wallet`.
    pub fn with_wallet(wallet: Arc<Wallet>) -> Self {
        Self {
            wallet: Some(wallet),
            ..Self::new()
        }
    }

    /// Deliver to every live subscription. No subscribers is not an error.
    pub fn emit(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            wallet: self.wallet.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

enum Received {
    Event(AgentEvent),
    Lagged,
}

pub struct Subscription {
    rx: broadcast::Receiver<AgentEvent>,
    wallet: Option<Arc<Wallet>>,
}

impl Subscription {
    async fn receive(&mut self) -> Option<Received> {
        match self.rx.recv().await {
            Ok(event) => Some(Received::Event(event)),
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Event subscriber lagged behind");
                Some(Received::Lagged)
            }
            Err(RecvError::Closed) => None,
        }
    }

    /// Next event, skipping over any the subscriber fell behind on.
    /// `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        loop {
            if let Received::Event(event) = self.receive().await? {
                return Some(event);
            }
        }
    }

    fn stored<T: SessionRecord>(&self, id: &str) -> Option<T> {
        let wallet = self.wallet.clone()?;
        SessionStore::<T>::new(wallet)
            .get(id)
            .inspect_err(|e| tracing::error!(session = %id, "Unable to re-read session: {e:#}"))
            .ok()
            .flatten()
    }

    /// Next state of the issuance session `id`.
    pub async fn next_issuance(&mut self, id: &str) -> Option<IssuanceSession> {
        loop {
            match self.receive().await? {
                Received::Event(AgentEvent::IssuanceSessionStateChanged { session, .. })
                    if session.id == id =>
                {
                    return Some(session);
                }
                Received::Event(_) => {}
                Received::Lagged => {
                    if let Some(session) = self.stored(id) {
                        return Some(session);
                    }
                }
            }
        }
    }

    /// Next state of the verification session `id`.
    pub async fn next_verification(&mut self, id: &str) -> Option<VerificationSession> {
        loop {
            match self.receive().await? {
                Received::Event(AgentEvent::VerificationSessionStateChanged { session, .. })
                    if session.id == id =>
                {
                    return Some(session);
                }
                Received::Event(_) => {}
                Received::Lagged => {
                    if let Some(session) = self.stored(id) {
                        return Some(session);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid4vc::presentation::PresentationDefinition;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn verification(id: &str, state: VerificationSessionState) -> VerificationSession {
        let definition: PresentationDefinition =
            serde_json::from_value(json!({"id": "d", "input_descriptors": []})).unwrap();
        VerificationSession {
            id: id.into(),
            verifier_id: "did:sov:verifier".into(),
            state,
            authorization_request_uri: "openid4vp://?client_id=x".into(),
            authorization_request_jwt: "jwt".into(),
            nonce: format!("nonce-{id}"),
            presentation_definition: definition,
            authorization_response: None,
            error_message: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(10),
        }
    }

    fn flood(bus: &EventBus) {
        for i in 0..EVENT_CAPACITY + 50 {
            bus.emit(AgentEvent::VerificationSessionStateChanged {
                session: verification(&format!("other-{i}"), VerificationSessionState::RequestCreated),
                previous_state: None,
            });
        }
    }

    #[tokio::test]
    async fn events_for_other_sessions_are_skipped() {
        let bus = EventBus::new();
        let mut subscription = bus.subscribe();
        bus.emit(AgentEvent::VerificationSessionStateChanged {
            session: verification("other", VerificationSessionState::RequestCreated),
            previous_state: None,
        });
        bus.emit(AgentEvent::VerificationSessionStateChanged {
            session: verification("mine", VerificationSessionState::RequestUriRetrieved),
            previous_state: Some(VerificationSessionState::RequestCreated),
        });

        let next = subscription.next_verification("mine").await.unwrap();
        assert_eq!(next.state, VerificationSessionState::RequestUriRetrieved);
    }

    #[tokio::test]
    async fn lagging_subscriber_catches_up_from_wallet() {
        let wallet = Arc::new(Wallet::open_in_memory("k").unwrap());
        let store = SessionStore::<VerificationSession>::new(wallet.clone());
        store
            .create(&verification("mine", VerificationSessionState::ResponseVerified))
            .unwrap();

        let bus = EventBus::with_wallet(wallet);
        let mut subscription = bus.subscribe();
        flood(&bus);

        let next = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            subscription.next_verification("mine"),
        )
        .await
        .expect("lagging subscriber never finished")
        .unwrap();
        assert_eq!(next.state, VerificationSessionState::ResponseVerified);
    }

    #[tokio::test]
    async fn subscription_ends_with_the_bus() {
        let bus = EventBus::new();
        let mut subscription = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(bus);
        assert!(subscription.recv().await.is_none());
        assert!(subscription.next_issuance("any").await.is_none());
    }
}
