//! Client configuration

/// Access keys attached to every request. The service performs the actual
/// signing and verification; the client only forwards the pair.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

/// Configuration for the service client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the orchestration service
    pub endpoint: String,

    /// Optional access keys forwarded with every request
    pub credentials: Option<Credentials>,

    /// Timeout for individual requests in seconds
    pub timeout_secs: u64,

    /// Interval between status polls in seconds
    pub poll_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            credentials: None,
            timeout_secs: 60,
            poll_interval_secs: 5,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, access_key_id: String, access_key_secret: String) -> Self {
        self.credentials = Some(Credentials {
            access_key_id,
            access_key_secret,
        });
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval_secs: u64) -> Self {
        self.poll_interval_secs = poll_interval_secs;
        self
    }
}
