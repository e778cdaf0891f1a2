// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Self-describing holder DIDs: `did:key` (Ed25519) and `did:jwk`.

use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};

use super::{DidDocument, VerificationMethod, ED25519_MULTICODEC};

/// Resolve a `did:key` or `did:jwk`; `Ok(None)` for any other method.
pub fn resolve(did: &str) -> Result<Option<DidDocument>> {
    if let Some(multikey) = did.strip_prefix("did:key:") {
        return resolve_key(did, multikey).map(Some);
    }
    if let Some(encoded) = did.strip_prefix("did:jwk:") {
        return resolve_jwk(did, encoded).map(Some);
    }
    Ok(None)
}

fn resolve_key(did: &str, multikey: &str) -> Result<DidDocument> {
    let encoded = multikey
        .strip_prefix('z')
        .ok_or_else(|| anyhow!("{did}: only base58btc multikeys are supported"))?;
    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| anyhow!("{did}: invalid multikey: {e}"))?;
    if !raw.starts_with(&ED25519_MULTICODEC) || raw.len() != 34 {
        bail!("{did}: only Ed25519 did:key identifiers are supported");
    }

    let id = format!("{did}#{multikey}");
    Ok(document(
        did,
        VerificationMethod {
            id,
            type_: "Ed25519VerificationKey2020".into(),
            controller: did.to_owned(),
            public_key_base58: None,
            public_key_multibase: Some(multikey.to_owned()),
            public_key_jwk: None,
        },
    ))
}

fn resolve_jwk(did: &str, encoded: &str) -> Result<DidDocument> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| anyhow!("{did}: invalid base64url: {e}"))?;
    let jwk: Value = serde_json::from_slice(&bytes).map_err(|e| anyhow!("{did}: invalid JWK: {e}"))?;
    if jwk.get("kty").and_then(Value::as_str).is_none() {
        bail!("{did}: JWK has no kty");
    }

    Ok(document(
        did,
        VerificationMethod {
            id: format!("{did}#0"),
            type_: "JsonWebKey2020".into(),
            controller: did.to_owned(),
            public_key_base58: None,
            public_key_multibase: None,
            public_key_jwk: Some(jwk),
        },
    ))
}

fn document(did: &str, method: VerificationMethod) -> DidDocument {
    let id = method.id.clone();
    DidDocument {
        context: vec!["https://www.w3.org/ns/did/v1".into()],
        id: did.to_owned(),
        verification_method: vec![method],
        authentication: vec![json!(id)],
        assertion_method: vec![json!(id)],
    }
}

/// `did:key` for an Ed25519 public key.
pub fn ed25519_did_key(public_key: &[u8; 32]) -> String {
    let mut bytes = ED25519_MULTICODEC.to_vec();
    bytes.extend_from_slice(public_key);
    format!("did:key:z{}", bs58::encode(bytes).into_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_key_round_trips_public_key() {
        let did = ed25519_did_key(&[3u8; 32]);
        assert!(did.starts_with("did:key:z6Mk"));

        let doc = resolve(&did).unwrap().unwrap();
        let vm = doc.find_method(&did).unwrap();
        assert_eq!(vm.public_jwk().unwrap()["x"], URL_SAFE_NO_PAD.encode([3u8; 32]));
        assert!(doc.find_method(&vm.id).is_some());
    }

    #[test]
    fn did_jwk_exposes_key_as_0() {
        let jwk = json!({"kty": "EC", "crv": "P-256", "x": "abc", "y": "def"});
        let did = format!("did:jwk:{}", URL_SAFE_NO_PAD.encode(jwk.to_string()));

        let doc = resolve(&did).unwrap().unwrap();
        let vm = doc.find_method(&format!("{did}#0")).unwrap();
        assert_eq!(vm.public_jwk().unwrap(), jwk);
    }

    #[test]
    fn other_methods_are_not_handled_here() {
        assert!(resolve("did:sov:V4SGRU86Z58d6TV7PBUe6f").unwrap().is_none());
    }

    #[test]
    fn secp256k1_did_key_is_rejected() {
        // z + base58(0xe7 0x01 || 33 bytes)
        let mut bytes = vec![0xe7, 0x01];
        bytes.extend_from_slice(&[2u8; 33]);
        let did = format!("did:key:z{}", bs58::encode(bytes).into_string());
        assert!(resolve(&did).is_err());
    }
}
