// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! W3C Verifiable Credentials (data model 1.1) and their JWT encoding.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::jwt::{self, Header};

pub const CREDENTIALS_CONTEXT_V1: &str = "https://www.w3.org/2018/credentials/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct W3cCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub issuer: W3cIssuer,
    pub issuance_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    pub credential_subject: W3cCredentialSubject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct W3cIssuer {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct W3cCredentialSubject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// `2024-05-01T10:00:00Z`
pub fn w3c_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_w3c_date(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid credential date {value}"))?
        .with_timezone(&Utc))
}

impl W3cCredential {
    pub fn new(
        types: Vec<String>,
        issuer: &str,
        subject: W3cCredentialSubject,
        issuance_date: DateTime<Utc>,
        expiration_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            context: vec![CREDENTIALS_CONTEXT_V1.into()],
            id: None,
            types,
            issuer: W3cIssuer { id: issuer.into() },
            issuance_date: w3c_date(issuance_date),
            expiration_date: expiration_date.map(w3c_date),
            credential_subject: subject,
        }
    }

    /// Encode as a `jwt_vc_json` credential signed by `verification_method`.
    ///
    /// Registered claims mirror the credential (`iss`, `sub`, `nbf`, `exp`,
    /// `jti`); the credential itself travels in `vc`.
    pub fn sign_jwt(&self, verification_method: &str, key: &SigningKey) -> Result<String> {
        let nbf = parse_w3c_date(&self.issuance_date)?.timestamp();
        let mut claims = json!({
            "vc": self,
            "iss": self.issuer.id,
            "nbf": nbf,
            "jti": self
                .id
                .clone()
                .unwrap_or_else(|| format!("urn:uuid:{}", uuid::Uuid::new_v4())),
        });
        if let Some(sub) = &self.credential_subject.id {
            claims["sub"] = json!(sub);
        }
        if let Some(expiration) = &self.expiration_date {
            claims["exp"] = json!(parse_w3c_date(expiration)?.timestamp());
        }
        jwt::sign(&Header::eddsa("JWT", verification_method), &claims, key)
    }

    /// The `vc` claim of a verified JWT credential payload.
    pub fn from_jwt_claims(claims: &Value) -> Result<Self> {
        let vc = claims
            .get("vc")
            .cloned()
            .ok_or_else(|| anyhow!("JWT credential has no vc claim"))?;
        serde_json::from_value(vc).context("Invalid vc claim")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::did::ed25519_jwk;
    use chrono::TimeZone;

    fn credential() -> W3cCredential {
        let mut claims = Map::new();
        claims.insert("name".into(), json!("Ibuprofen 200 MG Oral Tablet"));
        W3cCredential::new(
            vec!["VerifiableCredential".into(), "Prescription".into()],
            "did:sov:issuer",
            W3cCredentialSubject {
                id: Some("did:key:holder".into()),
                claims,
            },
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            Some(Utc.with_ymd_and_hms(2999, 5, 2, 10, 0, 0).unwrap()),
        )
    }

    #[test]
    fn credential_serializes_with_w3c_names() {
        let json = serde_json::to_value(credential()).unwrap();
        assert_eq!(json["@context"][0], CREDENTIALS_CONTEXT_V1);
        assert_eq!(json["type"][1], "Prescription");
        assert_eq!(json["issuer"]["id"], "did:sov:issuer");
        assert_eq!(json["issuanceDate"], "2024-05-01T10:00:00Z");
        assert_eq!(json["credentialSubject"]["id"], "did:key:holder");
        assert_eq!(json["credentialSubject"]["name"], "Ibuprofen 200 MG Oral Tablet");
    }

    #[test]
    fn jwt_claims_mirror_the_credential() {
        let key = SigningKey::from_bytes(&[5u8; 32]);
        let token = credential().sign_jwt("did:sov:issuer#key-1", &key).unwrap();

        let jwk = ed25519_jwk(key.verifying_key().as_bytes()).unwrap();
        let claims = jwt::verify(&token, &jwk).unwrap();
        assert_eq!(claims["iss"], "did:sov:issuer");
        assert_eq!(claims["sub"], "did:key:holder");
        assert_eq!(claims["nbf"], 1_714_557_600);
        assert!(claims["jti"].as_str().unwrap().starts_with("urn:uuid:"));
        assert_eq!(W3cCredential::from_jwt_claims(&claims).unwrap(), credential());

        let (header, _) = jwt::decode_unverified(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("did:sov:issuer#key-1"));
    }
}
