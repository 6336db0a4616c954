//! CLI command handlers.

pub mod start;
pub mod token;

use std::path::Path;

use anyhow::Result;
use tokenswap_config::LoadedConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Load an explicit config file, or discover the layered ones.
///
/// Loader warnings (plaintext secrets, unreadable layers) go to stderr.
pub fn load_config(explicit: Option<&Path>, ctx: &Context) -> Result<LoadedConfig> {
    let loaded = match explicit {
        Some(path) => tokenswap_config::load_explicit_config(path)?,
        None => tokenswap_config::load_config(None)?,
    };

    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        let sources = loaded.loaded_from();
        if sources.is_empty() {
            eprintln!("No config files found, using environment + CLI args");
        } else {
            for source in sources {
                eprintln!("Loaded config: {}", source.display());
            }
        }
    }

    Ok(loaded)
}
