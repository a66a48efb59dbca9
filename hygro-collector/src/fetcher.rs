use std::sync::Arc;
use std::time::Duration;

use hygro_core::Credentials;
use reqwest::Client as HttpClient;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::ErrorKind;
use crate::signer::{self, SignError};

pub const DEFAULT_API_BASE: &str = "https://api.switch-bot.com";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("response is not a JSON object")]
    EnvelopeNotObject,
    #[error("response envelope has no `body` field")]
    MissingBody,
    #[error("response `body` is not an object")]
    BodyNotObject,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("signing failed: {0}")]
    Sign(#[from] SignError),
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream returned error status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Sign(_) => ErrorKind::Signing,
            FetchError::Request(e) if e.is_builder() => ErrorKind::Protocol,
            FetchError::Request(_) => ErrorKind::Transient,
            FetchError::Status { status, .. } if *status >= 500 || *status == 429 => {
                ErrorKind::Transient
            }
            FetchError::Status { .. } => ErrorKind::Protocol,
            FetchError::Protocol(_) => ErrorKind::Protocol,
        }
    }
}

/// The `body` object of an envelope, re-serialized as JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(String);

impl RawPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for RawPayload {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Extracts the `body` object from an API response envelope.
///
/// Envelope-level `statusCode`/`message` are only logged.
pub fn unwrap_envelope(bytes: &[u8]) -> Result<RawPayload, ProtocolError> {
    let envelope: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut envelope) = envelope else {
        return Err(ProtocolError::EnvelopeNotObject);
    };

    debug!(
        status_code = ?envelope.get("statusCode"),
        message = ?envelope.get("message"),
        "received envelope"
    );

    match envelope.remove("body") {
        Some(body @ Value::Object(_)) => Ok(RawPayload(body.to_string())),
        Some(_) => Err(ProtocolError::BodyNotObject),
        None => Err(ProtocolError::MissingBody),
    }
}

/// Signed HTTP client for the SwitchBot cloud API.
///
/// One instance is shared by every endpoint; each call signs afresh.
#[derive(Clone)]
pub struct Fetcher {
    http: HttpClient,
    credentials: Arc<Credentials>,
    api_base: String,
}

impl Fetcher {
    /// Create a fetcher whose requests are bounded by `timeout`.
    pub fn new(credentials: Arc<Credentials>, timeout: Duration) -> Result<Self, FetchError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self::with_http_client(http, credentials))
    }

    /// Create a fetcher with a custom reqwest client.
    pub fn with_http_client(http: HttpClient, credentials: Arc<Credentials>) -> Self {
        Self {
            http,
            credentials,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// GET a device status URL and return the envelope's `body`.
    pub async fn fetch(&self, url: &str) -> Result<RawPayload, FetchError> {
        let response = self.signed_get(url).await?;
        let bytes = response.bytes().await?;
        Ok(unwrap_envelope(&bytes)?)
    }

    /// Raw device listing for the account. Not parsed.
    pub async fn list_devices(&self) -> Result<String, FetchError> {
        let url = format!("{}/v1.1/devices", self.api_base);
        let response = self.signed_get(&url).await?;
        Ok(response.text().await?)
    }

    async fn signed_get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let ctx = signer::sign(&self.credentials.token, &self.credentials.secret)?;

        let mut request = self.http.get(url);
        for (name, value) in ctx.headers(&self.credentials.token) {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(FetchError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_body_object() {
        let payload = unwrap_envelope(
            br#"{"statusCode":100,"message":"success","body":{"deviceId":"D1","CO2":800}}"#,
        )
        .unwrap();
        let body: Value = serde_json::from_str(payload.as_str()).unwrap();
        assert_eq!(body["deviceId"], "D1");
        assert_eq!(body["CO2"], 800);
        assert!(body.get("statusCode").is_none());
    }

    #[test]
    fn missing_body_is_protocol_error() {
        let err = unwrap_envelope(br#"{"statusCode":100,"message":"ok"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingBody));
    }

    #[test]
    fn non_object_body_is_protocol_error() {
        let err = unwrap_envelope(br#"{"statusCode":100,"body":[1,2]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::BodyNotObject));

        let err = unwrap_envelope(br#"{"body":null}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::BodyNotObject));
    }

    #[test]
    fn garbage_is_protocol_error() {
        assert!(matches!(
            unwrap_envelope(b"<html>bad gateway</html>").unwrap_err(),
            ProtocolError::InvalidJson(_)
        ));
        assert!(matches!(
            unwrap_envelope(b"[]").unwrap_err(),
            ProtocolError::EnvelopeNotObject
        ));
    }

    #[test]
    fn status_classification() {
        let transient = FetchError::Status {
            status: 503,
            message: String::new(),
        };
        let throttled = FetchError::Status {
            status: 429,
            message: String::new(),
        };
        let unauthorized = FetchError::Status {
            status: 401,
            message: String::new(),
        };
        assert_eq!(transient.kind(), ErrorKind::Transient);
        assert_eq!(throttled.kind(), ErrorKind::Transient);
        assert_eq!(unauthorized.kind(), ErrorKind::Protocol);
        assert_eq!(
            FetchError::Protocol(ProtocolError::MissingBody).kind(),
            ErrorKind::Protocol
        );
    }
}
