//! Transport configuration and descriptor config parsing.

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::{Result, TransportError};

/// Configuration for the HTTP callback transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Upper bound on a single callback request, including the response body.
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Read an endpoint URL from a descriptor config: either the URL string
/// itself or an object with a `url` field.
pub fn endpoint_url(config: &Value) -> Result<Url> {
    let raw = match config {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::InvalidConfig("missing `url`".into()))?,
        other => {
            return Err(TransportError::InvalidConfig(format!(
                "expected url string or object, got {other}"
            )))
        }
    };
    Ok(Url::parse(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_url_shapes() {
        let plain = endpoint_url(&json!("https://example.com/cb")).unwrap();
        let wrapped = endpoint_url(&json!({ "url": "https://example.com/cb" })).unwrap();
        assert_eq!(plain, wrapped);
        assert_eq!(plain.host_str(), Some("example.com"));
    }

    #[test]
    fn test_endpoint_url_rejects_bad_config() {
        assert!(matches!(
            endpoint_url(&json!({ "endpoint": "x" })),
            Err(TransportError::InvalidConfig(_))
        ));
        assert!(matches!(
            endpoint_url(&json!(42)),
            Err(TransportError::InvalidConfig(_))
        ));
        assert!(matches!(
            endpoint_url(&json!("not a url")),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
