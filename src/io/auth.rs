//! Access tokens from the identity service.
//!
//! Tokens are short-lived, so a fresh one is requested before every download
//! rather than cached and refreshed on expiry.
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::http::Transport;
use crate::types::{AccessToken, Credentials};

pub const DEFAULT_CLIENT_ID: &str = "cdse-public";

/// Read a credential file: account identifier on line 1, secret on line 2
pub fn read_credentials(path: &Path) -> Result<Credentials> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Authentication(format!("cannot read credential file {:?}: {}", path, e))
    })?;
    parse_credentials(&text)
}

pub fn parse_credentials(text: &str) -> Result<Credentials> {
    let mut lines = text.lines();
    let username = lines.next().map(str::trim).unwrap_or_default();
    let password = lines.next().map(str::trim).unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(Error::Authentication(
            "credential file must hold the username on line 1 and the password on line 2".into(),
        ));
    }
    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Exchanges credentials for bearer tokens (password grant)
pub struct TokenManager<'a, T: Transport> {
    transport: &'a T,
    token_url: String,
    client_id: String,
    credentials: Credentials,
}

impl<'a, T: Transport> TokenManager<'a, T> {
    pub fn new(
        transport: &'a T,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            transport,
            token_url: token_url.into(),
            client_id: client_id.into(),
            credentials,
        }
    }

    /// Request a new access token. Any failure, including a response without
    /// `access_token`, is an authentication error.
    pub fn acquire(&self) -> Result<AccessToken> {
        let form = [
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
        ];
        let body = self
            .transport
            .post_form(&self.token_url, &form)
            .map_err(|e| Error::Authentication(format!("token request failed: {}", e)))?;
        let token = match body.get("access_token") {
            Some(Value::String(s)) if !s.is_empty() => AccessToken::new(s.clone()),
            _ => {
                return Err(Error::Authentication(
                    "token response has no access_token".into(),
                ));
            }
        };
        debug!("Acquired access token for {}", self.credentials.username);
        Ok(token)
    }
}
