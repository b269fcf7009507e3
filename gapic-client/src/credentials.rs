//! Credential material attached to every call on a channel.

use std::fmt;

use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::config::ConfigError;

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-goog-api-key");

/// Credentials supplied at channel construction.
///
/// The channel attaches the matching request header to every call it
/// carries. Token material never appears in `Debug` output.
///
/// ```
/// use gapic_client::Credentials;
///
/// let creds = Credentials::bearer("ya29.token").unwrap();
/// assert_eq!(format!("{creds:?}"), "Bearer(***)");
/// ```
#[derive(Clone, Default)]
pub enum Credentials {
    /// No authentication. Suitable for emulators and local servers.
    #[default]
    Anonymous,
    /// OAuth2 bearer token, sent as `authorization: Bearer <token>`.
    Bearer(HeaderValue),
    /// API key, sent as `x-goog-api-key: <key>`.
    ApiKey(HeaderValue),
}

impl Credentials {
    /// Build bearer-token credentials.
    ///
    /// Fails if the token cannot be carried in an HTTP header.
    pub fn bearer(token: impl AsRef<str>) -> Result<Self, ConfigError> {
        let mut value = HeaderValue::try_from(format!("Bearer {}", token.as_ref())).map_err(
            |_| ConfigError::InvalidValue {
                option: "credentials".to_string(),
                reason: "token is not a valid header value".to_string(),
            },
        )?;
        value.set_sensitive(true);
        Ok(Self::Bearer(value))
    }

    /// Build API-key credentials.
    pub fn api_key(key: impl AsRef<str>) -> Result<Self, ConfigError> {
        let mut value =
            HeaderValue::try_from(key.as_ref()).map_err(|_| ConfigError::InvalidValue {
                option: "credentials".to_string(),
                reason: "key is not a valid header value".to_string(),
            })?;
        value.set_sensitive(true);
        Ok(Self::ApiKey(value))
    }

    /// Attach the credential header to a request header map.
    pub fn apply(&self, headers: &mut HeaderMap) {
        match self {
            Self::Anonymous => {}
            Self::Bearer(value) => {
                headers.insert(AUTHORIZATION, value.clone());
            }
            Self::ApiKey(value) => {
                headers.insert(API_KEY_HEADER, value.clone());
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}
