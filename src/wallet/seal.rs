// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{AeadCore, ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::WalletError;

/// ChaCha20-Poly1305 nonce length (96 bits).
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Argon2id cost parameters, stored next to the salt so a wallet keeps
/// opening after the defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// Plaintext sealed into the metadata table to detect a wrong key on open.
pub(super) const CHECK_VALUE: &[u8] = b"hospital-vc wallet";

pub(super) fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub(super) struct Sealer {
    cipher: ChaCha20Poly1305,
}

impl Sealer {
    /// Derive the wallet key from `passphrase` with Argon2id.
    pub(super) fn derive(
        passphrase: &str,
        salt: &[u8],
        kdf: &KdfParams,
    ) -> Result<Self, WalletError> {
        let params = Params::new(kdf.m_cost, kdf.t_cost, kdf.p_cost, Some(KEY_LEN))
            .map_err(|e| WalletError::Sealing(format!("invalid Argon2 params: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| WalletError::Sealing(format!("key derivation failed: {e}")))?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        key.zeroize();
        Ok(Self { cipher })
    }

    pub(super) fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, WalletError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| WalletError::Sealing(format!("encryption failed: {e}")))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    pub(super) fn open(&self, blob: &[u8]) -> Result<Vec<u8>, WalletError> {
        if blob.len() <= NONCE_LEN {
            return Err(WalletError::Sealing("sealed value too short (missing nonce)".into()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| WalletError::Sealing("decryption failed: wrong key or tampered data".into()))
    }
}
