//! Configuration for the tokenswap relay.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (XDG user config + project-local overrides)
//! - Environment variable overrides using the names existing deployments set
//!   (`SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`, `PORT`, ...)
//! - Secret resolution with provenance (env var → config file)
//! - Validation into immutable [`RelaySettings`]

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, load_explicit_config,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_secret};
pub use types::*;
