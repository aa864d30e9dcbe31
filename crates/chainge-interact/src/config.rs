//! Agent configuration.

use std::time::Duration;

use chainge_interact_transport::HttpConfig;

/// Configuration for an [`Agent`](crate::Agent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Lifetime stamped on tokens this agent signs. `None` signs tokens
    /// that never expire.
    pub token_ttl: Option<Duration>,
    /// Whether carried credentials are checked against the resolver. When
    /// off, every credential signature counts as valid.
    pub verify_credentials: bool,
    /// HTTP callback transport configuration.
    pub http: HttpConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            token_ttl: Some(Duration::from_secs(60 * 60)),
            verify_credentials: true,
            http: HttpConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn with_token_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_verify_credentials(mut self, verify: bool) -> Self {
        self.verify_credentials = verify;
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Token lifetime in milliseconds, saturating.
    pub(crate) fn token_ttl_millis(&self) -> Option<i64> {
        self.token_ttl
            .map(|ttl| i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
    }
}
