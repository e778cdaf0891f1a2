// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Port the backend listens on unless overridden.
pub const DEFAULT_BACKEND_PORT: u16 = 3000;
/// Port of the ledger web server (genesis file, registration, browser).
pub const DEFAULT_LEDGER_PORT: u16 = 9000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub wallet: WalletConfig,
    pub smart: SmartConfig,
    pub rxnorm: RxNormConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IPv4 address advertised to wallets (`BACKEND_IP`).
    pub ip: String,
    /// Port advertised to wallets and bound by the gateway (`BACKEND_PORT`).
    pub port: u16,
    /// Interface the listener binds to.
    pub bind_host: String,
    /// Directory served as static files.
    pub public_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".into(),
            port: DEFAULT_BACKEND_PORT,
            bind_host: "0.0.0.0".into(),
            public_dir: PathBuf::from("public"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Host of the Indy network web server (`BACKEND_INDY_NETWORK_IP`).
    pub network_ip: String,
    pub port: u16,
    /// Indy namespace used in `did:indy:<namespace>:<id>`.
    pub namespace: String,
    /// Optional universal resolver for DIDs the backend does not own.
    pub resolver_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network_ip: "127.0.0.1".into(),
            port: DEFAULT_LEDGER_PORT,
            namespace: "local".into(),
            resolver_url: None,
        }
    }
}

impl LedgerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.network_ip, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub id: String,
    pub path: String,
    /// Wallet passphrase (`BACKEND_WALLET_KEY`).
    pub key: Option<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            id: "backend".into(),
            path: "~/.hospital-vc/wallet/backend.sqlite".into(),
            key: None,
        }
    }
}

impl WalletConfig {
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartConfig {
    /// FHIR server base URL used as the SMART `iss` (`SMART_URL`).
    pub url: Option<String>,
    pub client_id: String,
    pub scope: String,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            url: None,
            client_id: "my-client-id".into(),
            scope: "launch/patient patient/*.read openid fhirUser".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RxNormConfig {
    pub base_url: String,
}

impl Default for RxNormConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rxnav.nlm.nih.gov".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Config {
    /// Default location: `<config dir>/hospital-vc/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "mymolt", "hospital-vc")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path` (missing file means defaults), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)
                    .with_context(|| format!("Cannot read config at {}", p.display()))?;
                Self::from_toml(&raw).with_context(|| format!("Invalid config at {}", p.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Overlay deployment variables. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(ip) = non_empty("BACKEND_IP") {
            self.server.ip = ip;
        }
        if let Some(port) = non_empty("BACKEND_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(ip) = non_empty("BACKEND_INDY_NETWORK_IP") {
            self.ledger.network_ip = ip;
        }
        if let Some(key) = non_empty("BACKEND_WALLET_KEY") {
            self.wallet.key = Some(key);
        }
        if let Some(url) = non_empty("SMART_URL") {
            self.smart.url = Some(url);
        }
        if let Some(client_id) = non_empty("SMART_CLIENT_ID") {
            self.smart.client_id = client_id;
        }
    }
}
