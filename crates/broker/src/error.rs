use thiserror::Error;

/// Errors from the Upstox REST transport.
#[derive(Debug, Error)]
pub enum UpstoxError {
    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout: {0}")]
    Timeout(String),

    /// Response parsed but the expected payload was absent.
    #[error("missing data in response: {0}")]
    MissingData(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl UpstoxError {
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// True when a later retry of the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for UpstoxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstoxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UpstoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_throttle_errors_are_transient() {
        assert!(UpstoxError::api(500, "internal").is_transient());
        assert!(UpstoxError::api(429, "throttled").is_transient());
        assert!(!UpstoxError::api(401, "unauthorized").is_transient());
        assert!(UpstoxError::Network("refused".into()).is_transient());
        assert!(!UpstoxError::MissingData("candles".into()).is_transient());
    }
}
