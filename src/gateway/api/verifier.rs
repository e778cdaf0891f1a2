// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use std::collections::VecDeque;
use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    routing::get,
    Router,
};
use futures::Stream;

use super::{ApiError, HOSPITAL_VERIFIER_ROUTER_PATH, PRESCRIPTIONS_PATH};
use crate::agent::events::Subscription;
use crate::gateway::{views, AppState};
use crate::oid4vc::{VerificationSession, VerificationSessionState};
use crate::prescription::create_prescription_verification_request;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route(PRESCRIPTIONS_PATH, get(verification_request))
        .route("/verificationEvents/{id}", get(verification_events))
}

async fn landing() -> Html<String> {
    views::verifier_landing(&format!(
        "{HOSPITAL_VERIFIER_ROUTER_PATH}{PRESCRIPTIONS_PATH}"
    ))
}

async fn verification_request(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let (request, session_id) =
        create_prescription_verification_request(&state.agent, &state.issuer_did)?;

    let qr = views::qr_data_url(&request)
        .inspect_err(|e| tracing::error!("Unable to convert request to QRCode. Cause: {e:#}"))
        .ok();
    Ok(views::verification(
        &request,
        qr.as_deref(),
        HOSPITAL_VERIFIER_ROUTER_PATH,
        &format!("{HOSPITAL_VERIFIER_ROUTER_PATH}/verificationEvents/{session_id}"),
    ))
}

/// Logs when the client goes away and the stream is dropped.
struct StreamClosed(String);

impl Drop for StreamClosed {
    fn drop(&mut self) {
        tracing::info!("Closed event stream for verification session with id {}", self.0);
    }
}

struct VerificationStream {
    id: String,
    /// `None` once the session reached a terminal state.
    events: Option<Subscription>,
    pending: VecDeque<Event>,
    _closed: StreamClosed,
}

/// SSE data must not carry carriage returns.
fn sse_data(text: &str) -> String {
    text.replace('\r', "")
}

/// Events describing one state of a verification session: the state itself,
/// followed by the result when the session ended.
fn session_events(session: &VerificationSession) -> Vec<Event> {
    let mut events = vec![Event::default()
        .event("state")
        .data(session.state.to_string())];
    match session.state {
        VerificationSessionState::ResponseVerified => {
            match Event::default()
                .event("verified")
                .json_data(&session.authorization_response)
            {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::error!(session = %session.id, "Unable to encode verified presentation: {e}");
                    events.push(
                        Event::default()
                            .event("error")
                            .data("Unable to encode verified presentation"),
                    );
                }
            }
        }
        VerificationSessionState::Error => {
            let reason = session
                .error_message
                .as_deref()
                .unwrap_or("Verification failed");
            events.push(Event::default().event("error").data(sse_data(reason)));
        }
        _ => {}
    }
    events
}

fn verification_stream(
    session: VerificationSession,
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let id = session.id.clone();
    let mut pending = VecDeque::from([Event::default().data(format!(
        "Connected to event stream for verification session with id {id}"
    ))]);
    let events = if session.state.is_terminal() {
        pending.extend(session_events(&session));
        None
    } else {
        Some(subscription)
    };

    let stream = VerificationStream {
        _closed: StreamClosed(id.clone()),
        id,
        events,
        pending,
    };
    futures::stream::unfold(stream, |mut stream| async move {
        loop {
            if let Some(event) = stream.pending.pop_front() {
                return Some((Ok(event), stream));
            }
            let subscription = stream.events.as_mut()?;
            let session = subscription.next_verification(&stream.id).await?;
            tracing::debug!(session = %session.id, state = %session.state, "Relaying verification state");
            stream.pending.extend(session_events(&session));
            if session.state.is_terminal() {
                stream.events = None;
            }
        }
    })
}

/// GET /verifier/hospital/verificationEvents/{id}: live state of a
/// verification session as server-sent events.
async fn verification_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before reading the session so no transition is missed.
    let subscription = state.agent.events.subscribe();
    let session = state.agent.verifier.get_verification_session_by_id(&id)?;
    tracing::info!("Opened event stream for verification session with id {id}");

    Ok(Sse::new(verification_stream(session, subscription)).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::{AgentEvent, EventBus};
    use crate::oid4vc::VerifiedAuthorizationResponse;
    use crate::prescription::prescription_presentation_definition;
    use chrono::{Duration, Utc};
    use futures::StreamExt;

    fn session(state: VerificationSessionState) -> VerificationSession {
        VerificationSession {
            id: "session-1".into(),
            verifier_id: "did:sov:verifier".into(),
            state,
            authorization_request_uri: "openid4vp://?client_id=x".into(),
            authorization_request_jwt: "jwt".into(),
            nonce: "nonce".into(),
            presentation_definition: prescription_presentation_definition(),
            authorization_response: None,
            error_message: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(10),
        }
    }

    #[tokio::test]
    async fn stream_relays_states_until_verified() {
        let bus = EventBus::new();
        let stream = verification_stream(
            session(VerificationSessionState::RequestCreated),
            bus.subscribe(),
        );
        futures::pin_mut!(stream);

        assert!(stream.next().await.is_some());

        let mut retrieved = session(VerificationSessionState::RequestUriRetrieved);
        bus.emit(AgentEvent::VerificationSessionStateChanged {
            session: retrieved.clone(),
            previous_state: Some(VerificationSessionState::RequestCreated),
        });
        retrieved.id = "other".into();
        bus.emit(AgentEvent::VerificationSessionStateChanged {
            session: retrieved,
            previous_state: None,
        });
        let mut verified = session(VerificationSessionState::ResponseVerified);
        verified.authorization_response = Some(VerifiedAuthorizationResponse {
            holder: "did:key:holder".into(),
            presentation_submission: None,
            credentials: vec![],
        });
        bus.emit(AgentEvent::VerificationSessionStateChanged {
            session: verified,
            previous_state: Some(VerificationSessionState::RequestUriRetrieved),
        });

        let rest: Vec<_> = stream.collect().await;
        // state RequestUriRetrieved, state ResponseVerified, verified
        assert_eq!(rest.len(), 3);
    }

    #[tokio::test]
    async fn terminal_session_is_reported_immediately() {
        let bus = EventBus::new();
        let mut failed = session(VerificationSessionState::Error);
        failed.error_message = Some("nonce mismatch\r\n".into());
        let events: Vec<_> = verification_stream(failed, bus.subscribe()).collect().await;
        // connected, state, error
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn carriage_returns_are_stripped() {
        assert_eq!(sse_data("a\r\nb"), "a\nb");
    }
}
