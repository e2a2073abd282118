//! # Node Configuration
//!
//! All runtime parameters come from the environment:
//!
//! | Variable        | Meaning                                         | Default |
//! |-----------------|--------------------------------------------------|---------|
//! | `MASTER`        | Bootstrap a fresh network instead of joining one | `false` |
//! | `PORT`          | HTTP/WebSocket listen port                       | `3000`  |
//! | `DB`            | Chain document path                              | `data/chain-<port>.json` |
//! | `TIMEOUT`       | Consensus round watchdog, milliseconds           | `2000`  |
//! | `MINE_INTERVAL` | Block proposal interval, milliseconds            | `3000`  |
//! | `DEMURRAGE_DEN` | Demurrage denominator (0 disables decay)         | `1000`  |
//! | `CRYPTO_SECRET` | Secret the node identity is derived from         | unset   |
//! | `PEERS`         | Comma-separated bootstrap WebSocket URLs         | empty   |
//!
//! With `CRYPTO_SECRET` set, the Ed25519 identity is derived from it with a
//! keyed digest so the node keeps its public key across restarts; otherwise
//! a fresh identity is generated per run.

use ql_consensus::PeerConfig;
use shared_crypto::{keyed_digest, CryptoError, Identity};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("identity derivation failed: {0}")]
    Identity(#[from] CryptoError),
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub master: bool,
    pub port: u16,
    pub db_path: PathBuf,
    pub timeout: Duration,
    pub mine_interval: Duration,
    pub demurrage_den: u64,
    pub crypto_secret: Option<String>,
    pub peers: Vec<String>,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Tests pass closures instead of
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let master = flag(&lookup, "MASTER")?;
        let port = parsed(&lookup, "PORT", 3000u16)?;
        let db_path = lookup("DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("data/chain-{port}.json")));
        let timeout = Duration::from_millis(parsed(&lookup, "TIMEOUT", 2000u64)?);
        let mine_interval = Duration::from_millis(parsed(&lookup, "MINE_INTERVAL", 3000u64)?);
        let demurrage_den = parsed(&lookup, "DEMURRAGE_DEN", 1000u64)?;
        let crypto_secret = lookup("CRYPTO_SECRET").filter(|s| !s.is_empty());
        let peers = lookup("PEERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            master,
            port,
            db_path,
            timeout,
            mine_interval,
            demurrage_den,
            crypto_secret,
            peers,
        })
    }

    /// The node identity: derived from `CRYPTO_SECRET` when set, ephemeral
    /// otherwise.
    pub fn identity(&self) -> Result<Identity, ConfigError> {
        match &self.crypto_secret {
            Some(secret) => {
                let seed = keyed_digest(secret.as_bytes(), b"quorumledger-node-identity")?;
                Ok(Identity::from_seed(seed))
            }
            None => Ok(Identity::generate()),
        }
    }

    /// The engine's share of the configuration.
    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            timeout: self.timeout,
            mine_interval: self.mine_interval,
            // A view change gets twice the round budget before the replica
            // gives up on itself.
            view_change_timeout: self.timeout * 2,
            demurrage_den: self.demurrage_den,
            ..PeerConfig::default()
        }
    }
}

fn flag(lookup: impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match lookup(var).as_deref() {
        None | Some("") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            var,
            value: other.to_string(),
        }),
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var,
            value: raw.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |var| map.get(var).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::from_lookup(lookup(&[])).unwrap();
        assert!(!config.master);
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("data/chain-3000.json"));
        assert_eq!(config.timeout, Duration::from_millis(2000));
        assert_eq!(config.mine_interval, Duration::from_millis(3000));
        assert!(config.peers.is_empty());
        assert!(config.crypto_secret.is_none());
    }

    #[test]
    fn test_explicit_values() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("MASTER", "true"),
            ("PORT", "4100"),
            ("DB", "/tmp/chain.json"),
            ("TIMEOUT", "500"),
            ("PEERS", "ws://a:3000/ws, ws://b:3000/ws,"),
        ]))
        .unwrap();
        assert!(config.master);
        assert_eq!(config.port, 4100);
        assert_eq!(config.db_path, PathBuf::from("/tmp/chain.json"));
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(
            config.peers,
            vec!["ws://a:3000/ws".to_string(), "ws://b:3000/ws".to_string()]
        );
    }

    #[test]
    fn test_malformed_port_rejected() {
        let err = NodeConfig::from_lookup(lookup(&[("PORT", "eleven")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn test_malformed_flag_rejected() {
        let err = NodeConfig::from_lookup(lookup(&[("MASTER", "yes")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MASTER", .. }));
    }

    #[test]
    fn test_identity_stable_under_secret() {
        let config = NodeConfig::from_lookup(lookup(&[("CRYPTO_SECRET", "hunter2")])).unwrap();
        let a = config.identity().unwrap();
        let b = config.identity().unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn test_identity_ephemeral_without_secret() {
        let config = NodeConfig::from_lookup(lookup(&[])).unwrap();
        let a = config.identity().unwrap();
        let b = config.identity().unwrap();
        assert_ne!(a.public_key_hex(), b.public_key_hex());
    }
}
