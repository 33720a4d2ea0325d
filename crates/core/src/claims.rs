//! Local decoding of access token claims
//!
//! Tokens are decoded without signature verification. The result is only good
//! for expiry checks and display hints; the identity service re-checks every
//! request on its side.

use crate::error::{CoreError, CoreResult};
use crate::types::{Profile, string_or_number};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default, deserialize_with = "string_or_number")]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiration time (as UTC timestamp, fractional seconds floored)
    #[serde(deserialize_with = "numeric_date")]
    pub exp: i64,
}

impl Claims {
    /// Decode the payload segment of a compact JWT
    pub fn decode(token: &str) -> CoreResult<Self> {
        let mut segments = token.trim().split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
            _ => return Err(CoreError::malformed_token("expected three dot-separated segments")),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| CoreError::malformed_token(format!("payload is not base64url: {e}")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::malformed_token(format!("payload is not a claims object: {e}")))
    }

    /// Expiry as an instant; out-of-range timestamps decode as `None`
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// A token is expired once `now` reaches its `exp`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Minimal profile derived from the token, used before the real profile loads
    pub fn to_profile(&self) -> Profile {
        Profile {
            id: self.sub.clone(),
            name: String::new(),
            email: self.email.clone().unwrap_or_default(),
            roles: if self.roles.is_empty() {
                vec!["USER".to_string()]
            } else {
                self.roles.clone()
            },
            image_url: None,
        }
    }
}

/// JWT NumericDate: whole or fractional seconds since the epoch
#[allow(clippy::cast_possible_truncation)]
fn numeric_date<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumericDate {
        Whole(i64),
        Fractional(f64),
    }

    match NumericDate::deserialize(deserializer)? {
        NumericDate::Whole(secs) => Ok(secs),
        NumericDate::Fractional(secs) if secs.is_finite() => Ok(secs.floor() as i64),
        NumericDate::Fractional(secs) => Err(de::Error::custom(format!("invalid exp: {secs}"))),
    }
}
