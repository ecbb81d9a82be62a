//! Session credentials.
//!
//! The controller authenticates a profile with a bearer token (a JWT
//! issued by the controller's installer app) presented as the MQTT
//! password at connect time. The token's `exp` claim is checked before
//! connecting so an expired token surfaces as a configuration problem
//! instead of an endless stream of refused connections.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::Error;

/// Default touch profile on the controller.
pub const DEFAULT_PROFILE: &str = "hobby";

/// Username + bearer token for one profile.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub token: SecretString,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<i64>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: SecretString) -> Self {
        Self {
            username: username.into(),
            token,
        }
    }

    /// Expiry encoded in the token, if the token carries one.
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>, Error> {
        let token = self.token.expose_secret().trim();
        if token.is_empty() {
            return Err(credential("token is empty"));
        }

        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(credential("token is not a JWT"));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| credential(&format!("token payload is not base64: {e}")))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| credential(&format!("token payload is not JSON: {e}")))?;

        match claims.exp {
            None => Ok(None),
            Some(exp) => DateTime::from_timestamp(exp, 0)
                .map(Some)
                .ok_or_else(|| credential("token expiry out of range")),
        }
    }

    /// Fail if the token is malformed or expired at `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.username.trim().is_empty() {
            return Err(credential("username is empty"));
        }
        if let Some(exp) = self.expires_at()? {
            if exp <= now {
                return Err(credential(&format!("token expired at {exp}")));
            }
        }
        Ok(())
    }
}

fn credential(reason: &str) -> Error {
    Error::Credential {
        reason: reason.to_owned(),
    }
}
