//! Configuration types.
//!
//! Every file-level field is optional so layers can be merged; defaults and
//! environment overrides are applied once by [`TokenswapConfig::resolve`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::secrets::{ResolvedSecret, resolve_secret};

/// Default provider token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Default cipher for refresh tokens.
pub const DEFAULT_CIPHER_ALGORITHM: &str = "aes-256-ctr";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default total upstream timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default upstream connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// Environment variables, as named by existing deployments.
pub const CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";
pub const REDIRECT_URI_ENV: &str = "SPOTIFY_CLIENT_CALLBACK";
pub const TOKEN_URL_ENV: &str = "SPOTIFY_TOKEN_URL";
pub const ENCRYPTION_SECRET_ENV: &str = "ENCRYPTION_SECRET";
pub const ENCRYPTION_METHOD_ENV: &str = "ENCRYPTION_METHOD";
pub const PORT_ENV: &str = "PORT";

/// Root configuration as read from TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TokenswapConfig {
    pub provider: ProviderConfig,
    pub cipher: CipherConfig,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

/// `[provider]` — the OAuth client registered with the provider.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub token_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// `[cipher]` — refresh token encryption.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    pub algorithm: Option<String>,
    /// Accepted for compatibility with existing deployments. The client
    /// secret is the cipher key.
    pub encryption_secret: Option<String>,
}

impl std::fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherConfig")
            .field("algorithm", &self.algorithm)
            .field(
                "encryption_secret",
                &self.encryption_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// `[server]` — listener settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub cors_origins: Option<Vec<String>>,
}

/// `[upstream]` — token endpoint transport settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

impl TokenswapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: TokenswapConfig) {
        let provider = other.provider;
        self.provider.client_id = provider.client_id.or(self.provider.client_id.take());
        self.provider.client_secret = provider.client_secret.or(self.provider.client_secret.take());
        self.provider.redirect_uri = provider.redirect_uri.or(self.provider.redirect_uri.take());
        self.provider.token_url = provider.token_url.or(self.provider.token_url.take());

        let cipher = other.cipher;
        self.cipher.algorithm = cipher.algorithm.or(self.cipher.algorithm.take());
        self.cipher.encryption_secret = cipher
            .encryption_secret
            .or(self.cipher.encryption_secret.take());

        let server = other.server;
        self.server.bind = server.bind.or(self.server.bind);
        self.server.port = server.port.or(self.server.port);
        self.server.cors_origins = server.cors_origins.or(self.server.cors_origins.take());

        let upstream = other.upstream;
        self.upstream.timeout_secs = upstream.timeout_secs.or(self.upstream.timeout_secs);
        self.upstream.connect_timeout_secs = upstream
            .connect_timeout_secs
            .or(self.upstream.connect_timeout_secs);
    }

    /// Whether any secret is stored in plaintext in the file layers.
    pub fn has_plaintext_secrets(&self) -> bool {
        self.provider.client_secret.is_some() || self.cipher.encryption_secret.is_some()
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<RelaySettings> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Apply defaults and environment overrides, then validate.
    ///
    /// Environment values win over file values; empty environment values
    /// are ignored.
    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<RelaySettings> {
        let lookup = |key: &str| env(key).filter(|v| !v.is_empty());
        let pick = |key: &str, file: &Option<String>| {
            lookup(key).or_else(|| file.clone().filter(|v| !v.is_empty()))
        };

        let client_id =
            pick(CLIENT_ID_ENV, &self.provider.client_id).ok_or(ConfigError::MissingField {
                field: "provider.client_id",
                env_var: CLIENT_ID_ENV,
            })?;

        let CipherSettings {
            algorithm: cipher_algorithm,
            key: client_secret,
        } = self.resolve_cipher_with(&env)?;

        let redirect_uri = pick(REDIRECT_URI_ENV, &self.provider.redirect_uri).ok_or(
            ConfigError::MissingField {
                field: "provider.redirect_uri",
                env_var: REDIRECT_URI_ENV,
            },
        )?;

        let token_url = pick(TOKEN_URL_ENV, &self.provider.token_url)
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        let encryption_secret = resolve_secret(
            ENCRYPTION_SECRET_ENV,
            self.cipher.encryption_secret.as_deref(),
            &env,
        );

        let port = match lookup(PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                field: "server.port",
                message: format!("{} ({}={})", e, PORT_ENV, raw),
            })?,
            None => self.server.port.unwrap_or(DEFAULT_PORT),
        };
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port",
                message: "port must be non-zero".to_string(),
            });
        }

        let timeout = positive_secs(
            "upstream.timeout_secs",
            self.upstream.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        )?;
        let connect_timeout = positive_secs(
            "upstream.connect_timeout_secs",
            self.upstream
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )?;

        Ok(RelaySettings {
            client_id,
            client_secret,
            redirect_uri,
            token_url,
            cipher_algorithm,
            encryption_secret,
            bind: self
                .server
                .bind
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port,
            cors_origins: self.server.cors_origins.clone().unwrap_or_default(),
            timeout,
            connect_timeout,
        })
    }
}

impl TokenswapConfig {
    /// Resolve only what the refresh token cipher needs.
    pub fn resolve_cipher(&self) -> Result<CipherSettings> {
        self.resolve_cipher_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_cipher_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<CipherSettings> {
        let key = resolve_secret(
            CLIENT_SECRET_ENV,
            self.provider.client_secret.as_deref(),
            &env,
        )
        .ok_or(ConfigError::MissingField {
            field: "provider.client_secret",
            env_var: CLIENT_SECRET_ENV,
        })?;

        let algorithm = env(ENCRYPTION_METHOD_ENV)
            .filter(|v| !v.is_empty())
            .or_else(|| self.cipher.algorithm.clone().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_CIPHER_ALGORITHM.to_string());

        Ok(CipherSettings { algorithm, key })
    }
}

/// Settings for sealing and opening refresh tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct CipherSettings {
    /// Algorithm name, validated when the cipher is built.
    pub algorithm: String,
    /// Key material: the provider client secret.
    pub key: ResolvedSecret,
}

fn positive_secs(field: &'static str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            field,
            message: "timeout must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Fully resolved settings, captured once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub client_id: String,
    pub client_secret: ResolvedSecret,
    pub redirect_uri: String,
    pub token_url: String,
    pub cipher_algorithm: String,
    pub encryption_secret: Option<ResolvedSecret>,
    pub bind: IpAddr,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl RelaySettings {
    /// Address the server listens on.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// True when a separate encryption secret is configured that differs
    /// from the client secret. It is never used as the cipher key.
    pub fn has_unused_encryption_secret(&self) -> bool {
        self.encryption_secret
            .as_ref()
            .is_some_and(|s| s.value != self.client_secret.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretSource;
    use std::collections::HashMap;

    const FULL: &str = r#"
[provider]
client_id = "file-client"
client_secret = "0123456789abcdef0123456789abcdef"
redirect_uri = "myapp://callback"

[cipher]
algorithm = "aes-128-ctr"

[server]
bind = "127.0.0.1"
port = 8080
cors_origins = ["https://app.example.com"]

[upstream]
timeout_secs = 5
"#;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let config = TokenswapConfig::from_toml(FULL).unwrap();
        let settings = config.resolve_with(env_from(&[])).unwrap();

        assert_eq!(settings.client_id, "file-client");
        assert_eq!(settings.client_secret.source, SecretSource::ConfigFile);
        assert_eq!(settings.redirect_uri, "myapp://callback");
        assert_eq!(settings.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(settings.cipher_algorithm, "aes-128-ctr");
        assert_eq!(settings.bind_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(settings.cors_origins, vec!["https://app.example.com"]);
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(
            settings.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert!(config.has_plaintext_secrets());
    }

    #[test]
    fn test_env_only_config() {
        let env = env_from(&[
            (CLIENT_ID_ENV, "env-client"),
            (CLIENT_SECRET_ENV, "env-secret"),
            (REDIRECT_URI_ENV, "myapp://env"),
        ]);
        let settings = TokenswapConfig::new().resolve_with(env).unwrap();

        assert_eq!(settings.client_id, "env-client");
        assert_eq!(settings.client_secret.value, "env-secret");
        assert_eq!(
            settings.client_secret.source,
            SecretSource::EnvVar(CLIENT_SECRET_ENV.to_string())
        );
        assert_eq!(settings.cipher_algorithm, DEFAULT_CIPHER_ALGORITHM);
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(settings.encryption_secret.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let config = TokenswapConfig::from_toml(FULL).unwrap();
        let env = env_from(&[
            (CLIENT_ID_ENV, "env-client"),
            (ENCRYPTION_METHOD_ENV, "aes-256-ctr"),
            (TOKEN_URL_ENV, "http://localhost:9999/token"),
            (PORT_ENV, "4000"),
        ]);
        let settings = config.resolve_with(env).unwrap();

        assert_eq!(settings.client_id, "env-client");
        assert_eq!(settings.cipher_algorithm, "aes-256-ctr");
        assert_eq!(settings.token_url, "http://localhost:9999/token");
        assert_eq!(settings.port, 4000);
    }

    #[test]
    fn test_missing_required_fields() {
        let err = TokenswapConfig::new()
            .resolve_with(env_from(&[]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "provider.client_id",
                ..
            }
        ));

        let err = TokenswapConfig::new()
            .resolve_with(env_from(&[(CLIENT_ID_ENV, "id")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "provider.client_secret",
                ..
            }
        ));

        let err = TokenswapConfig::new()
            .resolve_with(env_from(&[(CLIENT_ID_ENV, "id"), (CLIENT_SECRET_ENV, "s")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "provider.redirect_uri",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_port() {
        let config = TokenswapConfig::from_toml(FULL).unwrap();

        let err = config
            .resolve_with(env_from(&[(PORT_ENV, "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "server.port", .. }));

        let err = config.resolve_with(env_from(&[(PORT_ENV, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "server.port", .. }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = TokenswapConfig::from_toml(FULL).unwrap();
        config.upstream.timeout_secs = Some(0);
        let err = config.resolve_with(env_from(&[])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "upstream.timeout_secs",
                ..
            }
        ));
    }

    #[test]
    fn test_merge_prefers_later_layer() {
        let mut base = TokenswapConfig::from_toml(FULL).unwrap();
        let overlay = TokenswapConfig::from_toml(
            r#"
[provider]
redirect_uri = "myapp://override"

[server]
port = 9000
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.provider.redirect_uri.as_deref(), Some("myapp://override"));
        assert_eq!(base.provider.client_id.as_deref(), Some("file-client"));
        assert_eq!(base.server.port, Some(9000));
        assert_eq!(base.upstream.timeout_secs, Some(5));
    }

    #[test]
    fn test_unused_encryption_secret() {
        let env = env_from(&[
            (CLIENT_ID_ENV, "id"),
            (CLIENT_SECRET_ENV, "client-secret"),
            (REDIRECT_URI_ENV, "myapp://cb"),
            (ENCRYPTION_SECRET_ENV, "something-else"),
        ]);
        let settings = TokenswapConfig::new().resolve_with(env).unwrap();
        assert!(settings.has_unused_encryption_secret());
    }

    #[test]
    fn test_cipher_only_resolution() {
        let cipher = TokenswapConfig::new()
            .resolve_cipher_with(env_from(&[(CLIENT_SECRET_ENV, "secret")]))
            .unwrap();
        assert_eq!(cipher.algorithm, DEFAULT_CIPHER_ALGORITHM);
        assert_eq!(cipher.key.value, "secret");

        let config = TokenswapConfig::from_toml(FULL).unwrap();
        let cipher = config.resolve_cipher_with(env_from(&[])).unwrap();
        assert_eq!(cipher.algorithm, "aes-128-ctr");
        assert_eq!(cipher.key.source, SecretSource::ConfigFile);

        let err = TokenswapConfig::new()
            .resolve_cipher_with(env_from(&[]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "provider.client_secret",
                ..
            }
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = TokenswapConfig::from_toml(FULL).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("0123456789abcdef"));

        let settings = config.resolve_with(env_from(&[])).unwrap();
        assert!(!format!("{:?}", settings).contains("0123456789abcdef"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            TokenswapConfig::from_toml("[provider\nclient_id = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
