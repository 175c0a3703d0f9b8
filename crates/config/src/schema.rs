//! Config schema types (server, storage, webhook delivery, pairing, protocol bridge).

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagateConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub webhook: WebhookConfig,
    pub pairing: PairingConfig,
    pub bridge: BridgeConfig,
}

/// HTTP listener and admin credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Token required on `/admin/*` routes. `WAGATE_ADMIN_TOKEN` takes precedence.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for `users.db` and per-tenant file directories. Defaults to `~/.wagate`.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(crate::loader::data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolved_data_dir().join("users.db")
    }
}

/// Outbound webhook HTTP client and dispatch queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Skip certificate verification for tenant endpoints. Defaults to true,
    /// matching the behavior tenants already depend on; flagged for review.
    pub accept_invalid_certs: bool,
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_redirects: 15,
            accept_invalid_certs: true,
            queue_capacity: 1024,
            workers: 8,
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Minimum edge length of the rendered QR PNG, in pixels.
    pub qr_size: u32,
    /// Also print issued codes to the terminal (ignored with JSON logs).
    pub print_terminal: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            qr_size: 256,
            print_terminal: true,
        }
    }
}

/// Where the protocol bridge accepts per-tenant sockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub url: String,
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765/session".into(),
            request_timeout_secs: 30,
        }
    }
}
