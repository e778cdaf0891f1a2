// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

pub mod schema;

pub use schema::{Config, LedgerConfig, RxNormConfig, ServerConfig, SmartConfig, WalletConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_matches_local_deployment() {
        let config = Config::default();

        assert_eq!(config.server.ip, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.ledger.port, 9000);
        assert_eq!(config.ledger.namespace, "local");
        assert_eq!(config.wallet.id, "backend");
        assert!(config.wallet.key.is_none());
        assert_eq!(config.smart.client_id, "my-client-id");
    }

    #[test]
    fn partial_toml_keeps_section_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            ip = "10.0.0.5"

            [smart]
            url = "https://launch.smarthealthit.org/v/r4/fhir"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.ip, "10.0.0.5");
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.smart.url.as_deref(),
            Some("https://launch.smarthealthit.org/v/r4/fhir")
        );
        assert_eq!(config.rxnorm.base_url, "https://rxnav.nlm.nih.gov");
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("BACKEND_IP", "192.168.1.20"),
            ("BACKEND_PORT", "3100"),
            ("BACKEND_INDY_NETWORK_IP", "192.168.1.30"),
            ("BACKEND_WALLET_KEY", "secret"),
            ("SMART_URL", "http://fhir.local/r4"),
        ]);

        config.apply_env_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.server.ip, "192.168.1.20");
        assert_eq!(config.server.port, 3100);
        assert_eq!(config.ledger.base_url(), "http://192.168.1.30:9000");
        assert_eq!(config.wallet.key.as_deref(), Some("secret"));
        assert_eq!(config.smart.url.as_deref(), Some("http://fhir.local/r4"));
    }

    #[test]
    fn blank_or_invalid_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            "BACKEND_IP" => Some("   ".into()),
            "BACKEND_PORT" => Some("not-a-port".into()),
            _ => None,
        });

        assert_eq!(config.server.ip, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn wallet_path_expands_home() {
        let wallet = WalletConfig {
            path: "~/wallet.sqlite".into(),
            ..WalletConfig::default()
        };
        assert!(!wallet.resolved_path().to_string_lossy().starts_with('~'));
    }
}
