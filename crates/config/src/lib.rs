//! Configuration loading for the hotline relay.
//!
//! Looks for `hotline.{toml,yaml,yml,json}` in the working directory, then in
//! `~/.config/hotline/`. `${ENV_VAR}` placeholders are expanded before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        config_dir, data_dir, discover_and_load, find_or_default_config_path, load_config,
        set_config_dir,
    },
    schema::{
        AdminConfig, DatabaseConfig, Fanout, HotlineConfig, NotificationsConfig, PushoverConfig,
        RelayConfig, ServerConfig,
    },
};
