//! OAuth token-exchange relay.
//!
//! Sits between a client application and an OAuth provider's token endpoint.
//! The provider client secret stays on the server, and refresh tokens are
//! encrypted before they are handed to the client.
//!
//! # Components
//!
//! - [`upstream`] — token endpoint client and content-type driven decoding
//! - [`cipher`] — refresh token encryption (`<hex_iv>:<hex_ciphertext>`)
//! - [`handlers`] — `/swap` and `/refresh`
//! - [`server`] — Axum router and listener

pub mod cipher;
pub mod error;
pub mod grant;
pub mod handlers;
pub mod server;
pub mod upstream;

pub use cipher::{CipherAlgorithm, TokenCipher};
pub use error::{CipherError, RelayError, Result};
pub use grant::GrantRequest;
pub use handlers::{ExchangeError, ExchangeState};
pub use server::{RelayServer, RelayServerConfig};
pub use upstream::{
    BodyEncoding, SharedTokenEndpoint, TokenEndpoint, UpstreamBody, UpstreamClient,
    UpstreamConfig, UpstreamResponse,
};
