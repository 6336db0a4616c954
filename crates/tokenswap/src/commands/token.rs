//! Token command - seal and open refresh tokens offline.
//!
//! Uses the same key and algorithm as the running relay, so tokens handed
//! out by `/swap` can be inspected and test tokens can be minted.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};

use tokenswap_relay::TokenCipher;

use super::Context;

/// Arguments for the token command.
#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,

    /// Path to config file (overrides default discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Encrypt a plaintext refresh token
    Encrypt {
        /// Plaintext refresh token
        value: String,
    },

    /// Decrypt an encrypted refresh token
    Decrypt {
        /// Encrypted token in `<hex_iv>:<hex_ciphertext>` form
        value: String,
    },
}

/// Run the token command.
pub fn run(args: TokenArgs, ctx: &Context) -> Result<()> {
    let loaded = super::load_config(args.config.as_deref(), ctx)?;
    let settings = loaded.config.resolve_cipher()?;
    let cipher = TokenCipher::from_secret(&settings.algorithm, &settings.key.value)
        .context("Invalid cipher configuration")?;

    if ctx.verbose {
        eprintln!("Cipher: {}", cipher.algorithm());
        eprintln!("Key from: {}", settings.key.source);
    }

    match args.command {
        TokenCommand::Encrypt { value } => println!("{}", cipher.encrypt(&value)),
        TokenCommand::Decrypt { value } => {
            let plaintext = cipher
                .decrypt(value.trim())
                .context("Refresh token is invalid")?;
            println!("{}", plaintext);
        }
    }

    Ok(())
}
