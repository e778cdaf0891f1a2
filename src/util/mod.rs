// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use crate::config::ServerConfig;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;

/// Public base URL of the backend as seen by wallets.
pub fn backend_base_url(server: &ServerConfig) -> String {
    format!("http://{}:{}", server.ip, server.port)
}

/// Random string of ASCII letters (both cases).
pub fn random_alphabetic(len: usize) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// 32 random bytes, base64url without padding. Used for nonces, codes and tokens.
pub fn random_token() -> String {
    let buf: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(buf)
}

/// Numeric one-time code, e.g. a transaction PIN.
pub fn random_digits(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
