// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Compact JWS.
//!
//! Tokens the backend issues are signed with its Ed25519 DID key (`EdDSA`).
//! Tokens from wallets are verified with `jsonwebtoken` against the JWK
//! resolved from the holder's DID or embedded in the header.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// JOSE header fields this crate reads or writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Value>,
}

impl Header {
    pub fn eddsa(typ: &str, kid: &str) -> Self {
        Self {
            alg: "EdDSA".into(),
            typ: Some(typ.into()),
            kid: Some(kid.into()),
            jwk: None,
        }
    }
}

/// Sign `claims` with an Ed25519 key.
pub fn sign(header: &Header, claims: &impl Serialize, key: &SigningKey) -> Result<String> {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?);
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{claims}");
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Header and claims without checking the signature.
pub fn decode_unverified(token: &str) -> Result<(Header, Value)> {
    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        bail!("Malformed JWT: expected three segments");
    };
    let header: Header = serde_json::from_slice(
        &URL_SAFE_NO_PAD
            .decode(header)
            .context("Malformed JWT header encoding")?,
    )
    .context("Malformed JWT header")?;
    let claims: Value = serde_json::from_slice(
        &URL_SAFE_NO_PAD
            .decode(claims)
            .context("Malformed JWT payload encoding")?,
    )
    .context("Malformed JWT payload")?;
    Ok((header, claims))
}

/// Verify the signature (and `exp` when present) against a public JWK and
/// return the claims. Audience is left to the caller.
pub fn verify(token: &str, public_jwk: &Value) -> Result<Value> {
    let jwk: Jwk = serde_json::from_value(public_jwk.clone()).context("Unsupported JWK")?;
    let key = DecodingKey::from_jwk(&jwk).context("Unusable JWK")?;
    let header = jsonwebtoken::decode_header(token).context("Malformed JWT header")?;

    let mut validation = Validation::new(header.alg);
    validation.required_spec_claims = HashSet::new();
    validation.validate_aud = false;

    let data = decode::<Value>(token, &key, &validation)
        .map_err(|e| anyhow!("JWT verification failed: {e}"))?;
    Ok(data.claims)
}

/// `aud` may be a string or an array of strings.
pub fn audience_contains(claims: &Value, expected: &str) -> bool {
    match claims.get("aud") {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(expected)),
        _ => false,
    }
}
