//! Start command - launches the token relay.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;

use tokenswap_config::RelaySettings;
use tokenswap_relay::{
    ExchangeState, RelayServer, RelayServerConfig, TokenCipher, UpstreamClient, UpstreamConfig,
};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file and environment values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config and PORT)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<IpAddr>,

    /// Path to config file (overrides default discovery)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let loaded = super::load_config(args.config.as_deref(), ctx)?;
    let mut settings = loaded.config.resolve()?;

    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }

    if settings.has_unused_encryption_secret() {
        tracing::warn!(
            "ENCRYPTION_SECRET is set but refresh tokens are keyed with the client secret; \
             the encryption secret is ignored"
        );
    }

    let state = build_state(&settings)?;
    let server = RelayServer::new(
        RelayServerConfig::new(settings.bind_addr())
            .with_cors_origins(settings.cors_origins.clone()),
        state,
    );

    if ctx.verbose {
        eprintln!("Token endpoint: {}", settings.token_url);
        eprintln!("Cipher: {}", settings.cipher_algorithm);
        eprintln!("Client secret from: {}", settings.client_secret.source);
    }

    println!("Token relay listening on http://{}", settings.bind_addr());
    println!("Press Ctrl+C to stop");

    server
        .run_until(shutdown_signal())
        .await
        .with_context(|| format!("Failed to serve on {}", settings.bind_addr()))?;

    tracing::info!("Token relay stopped");
    Ok(())
}

/// Build the cipher and upstream client from resolved settings.
fn build_state(settings: &RelaySettings) -> Result<ExchangeState> {
    let cipher = TokenCipher::from_secret(&settings.cipher_algorithm, &settings.client_secret.value)
        .context("Invalid cipher configuration")?;

    let upstream = UpstreamClient::new(
        UpstreamConfig::new(&settings.client_id, &settings.client_secret.value)
            .with_token_url(&settings.token_url)
            .with_timeout(settings.timeout)
            .with_connect_timeout(settings.connect_timeout),
    )
    .context("Failed to build upstream client")?;

    Ok(ExchangeState::new(
        Arc::new(upstream),
        cipher,
        &settings.redirect_uri,
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Shutdown requested, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenswap_config::{
        CLIENT_ID_ENV, CLIENT_SECRET_ENV, ENCRYPTION_METHOD_ENV, REDIRECT_URI_ENV, TokenswapConfig,
    };

    fn settings(algorithm: &str, secret: &str) -> RelaySettings {
        let vars = [
            (CLIENT_ID_ENV, "client".to_string()),
            (CLIENT_SECRET_ENV, secret.to_string()),
            (REDIRECT_URI_ENV, "myapp://callback".to_string()),
            (ENCRYPTION_METHOD_ENV, algorithm.to_string()),
        ];
        TokenswapConfig::new()
            .resolve_with(|key| {
                vars.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.clone())
            })
            .unwrap()
    }

    #[test]
    fn test_build_state_with_valid_settings() {
        let state = build_state(&settings("aes-256-ctr", "0123456789abcdef0123456789abcdef")).unwrap();
        assert_eq!(state.redirect_uri, "myapp://callback");
    }

    #[test]
    fn test_unknown_algorithm_fails_at_startup() {
        let err = build_state(&settings("des-ede3", "0123456789abcdef0123456789abcdef")).unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported cipher algorithm"));
    }

    #[test]
    fn test_secret_of_wrong_length_fails_at_startup() {
        let err = build_state(&settings("aes-256-ctr", "too-short")).unwrap_err();
        assert!(format!("{:#}", err).contains("32-byte key"));
    }
}
