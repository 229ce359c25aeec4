use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for StudioError {
    fn from(e: reqwest::Error) -> Self {
        // the url may carry a query-string key
        let e = e.without_url();
        if e.is_timeout() {
            StudioError::Transport(format!("request timed out: {}", e))
        } else if e.is_connect() {
            StudioError::Transport(format!("connection failed: {}", e))
        } else {
            StudioError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(e: serde_json::Error) -> Self {
        StudioError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StudioError::Config("missing base url".into());
        assert_eq!(err.to_string(), "Configuration error: missing base url");

        let err: StudioError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, StudioError::Serialization(_)));
    }
}
