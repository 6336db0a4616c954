//! OAuth grant requests sent to the token endpoint.

use std::fmt;

/// A single grant request, built fresh for each inbound call.
#[derive(Clone, PartialEq, Eq)]
pub enum GrantRequest {
    /// Exchange an authorization code for tokens.
    AuthorizationCode { code: String, redirect_uri: String },
    /// Exchange a (decrypted) refresh token for a new access token.
    RefreshToken { refresh_token: String },
}

impl GrantRequest {
    /// The OAuth `grant_type` parameter.
    pub fn grant_type(&self) -> &'static str {
        match self {
            GrantRequest::AuthorizationCode { .. } => "authorization_code",
            GrantRequest::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form parameters in the order they are sent upstream.
    pub fn form_params(&self) -> Vec<(&'static str, &str)> {
        match self {
            GrantRequest::AuthorizationCode { code, redirect_uri } => vec![
                ("grant_type", self.grant_type()),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ],
            GrantRequest::RefreshToken { refresh_token } => vec![
                ("grant_type", self.grant_type()),
                ("refresh_token", refresh_token),
            ],
        }
    }
}

// Codes and refresh tokens are credentials; keep them out of debug output.
impl fmt::Debug for GrantRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantRequest::AuthorizationCode { redirect_uri, .. } => f
                .debug_struct("AuthorizationCode")
                .field("code", &"<redacted>")
                .field("redirect_uri", redirect_uri)
                .finish(),
            GrantRequest::RefreshToken { .. } => f
                .debug_struct("RefreshToken")
                .field("refresh_token", &"<redacted>")
                .finish(),
        }
    }
}
