// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Minimal OpenID for Verifiable Credentials.
//!
//! Covers what the hospital flows need: pre-authorized code offers for
//! `jwt_vc_json` credentials (OpenID4VCI) and signed, by-reference
//! authorization requests answered with `direct_post` (OpenID4VP) carrying a
//! Presentation Exchange definition.

pub mod credential;
pub mod issuer;
pub mod jwt;
pub mod presentation;
pub mod session;
pub mod verifier;

pub use credential::{W3cCredential, W3cCredentialSubject, W3cIssuer};
pub use issuer::{
    CredentialConfiguration, CredentialDefinition, CredentialMapper, CredentialOfferOptions,
    CredentialToSign, HolderBinding, Issuer, IssuerConfig, IssuerDisplay, IssuerRecord,
    MapCredentialRequest, MappedCredential,
};
pub use presentation::PresentationDefinition;
pub use session::{
    IssuanceSession, IssuanceSessionState, VerificationSession, VerificationSessionState,
};
pub use verifier::{Verifier, VerifiedAuthorizationResponse, VerifierConfig};

/// Credential format identifier for W3C credentials secured as JWTs.
pub const JWT_VC_JSON: &str = "jwt_vc_json";

/// OAuth 2.0 / OpenID error with its registered error code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    InvalidGrant(String),
    #[error("{0}")]
    UnsupportedGrantType(String),
    #[error("{0}")]
    InvalidToken(String),
    #[error("{0}")]
    InvalidProof(String),
    #[error("{0}")]
    UnsupportedCredentialFormat(String),
    #[error("{0}")]
    InvalidCredentialRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidToken(_) => "invalid_token",
            Self::InvalidProof(_) => "invalid_proof",
            Self::UnsupportedCredentialFormat(_) => "unsupported_credential_format",
            Self::InvalidCredentialRequest(_) => "invalid_credential_request",
            Self::NotFound(_) => "not_found",
            Self::Server(_) => "server_error",
        }
    }

    /// `{"error", "error_description"}` body.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code(),
            "error_description": format!("{self:#}"),
        })
    }
}

impl From<crate::wallet::WalletError> for Error {
    fn from(e: crate::wallet::WalletError) -> Self {
        Self::Server(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_json_carries_oauth_code() {
        let json = Error::InvalidGrant("Pre-authorized code already used".into()).to_json();
        assert_eq!(json["error"], "invalid_grant");
        assert_eq!(json["error_description"], "Pre-authorized code already used");
    }

    #[test]
    fn anyhow_errors_become_server_errors() {
        let err: Error = anyhow::anyhow!("disk full").into();
        assert_eq!(err.code(), "server_error");
    }
}
