// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Hospital prescription credentials.
//!
//! Issues prescriptions held in a SMART-on-FHIR server as W3C Verifiable
//! Credentials over OpenID4VCI and verifies them over OpenID4VP. Identities
//! are Indy DIDs anchored on a local ledger; keys live in an encrypted
//! SQLite wallet.

pub mod agent;
pub mod config;
pub mod did;
pub mod fhir;
pub mod gateway;
pub mod oid4vc;
pub mod prescription;
pub mod rxnorm;
pub mod util;
pub mod wallet;

pub use agent::Agent;
pub use config::Config;
