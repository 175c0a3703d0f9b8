//! Configuration loading: file discovery, `${ENV}` substitution and the
//! typed schema for server, storage, webhook, pairing and bridge settings.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, data_dir, discover_and_load, load_config, save_config,
        set_config_dir,
    },
    schema::{
        BridgeConfig, PairingConfig, ServerConfig, StorageConfig, WagateConfig, WebhookConfig,
    },
};
