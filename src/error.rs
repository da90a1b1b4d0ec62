use thiserror::Error;

/// Unified error type for the TopVPN application
#[derive(Error, Debug)]
pub enum TopVpnError {
    // Candidate URL errors
    #[error("Failed to parse server URL: {0}")]
    Parse(String),

    #[error("Unsupported protocol in link: {0}")]
    UnsupportedProtocol(String),

    // Engine errors
    #[error("Proxy engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine rejected slot configuration for {tag}: {reason}")]
    SlotConfiguration { tag: String, reason: String },

    // Subscription errors
    #[error("Subscription file error: {0}")]
    SubscriptionFile(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for TopVPN operations
pub type Result<T> = std::result::Result<T, TopVpnError>;

impl TopVpnError {
    /// Whether this error kind is recoverable per candidate (skip and
    /// continue) as opposed to fatal for the whole probing run.
    pub fn is_per_candidate(&self) -> bool {
        matches!(
            self,
            TopVpnError::Parse(_)
                | TopVpnError::UnsupportedProtocol(_)
                | TopVpnError::SlotConfiguration { .. }
        )
    }

    /// Whether the error means the whole run cannot proceed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TopVpnError::EngineUnavailable(_) | TopVpnError::InvalidConfig(_)
        )
    }
}

// Convert from reqwest errors
impl From<reqwest::Error> for TopVpnError {
    fn from(err: reqwest::Error) -> Self {
        TopVpnError::Http(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for TopVpnError {
    fn from(err: url::ParseError) -> Self {
        TopVpnError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_candidate_classification() {
        assert!(TopVpnError::Parse("bad".to_string()).is_per_candidate());
        assert!(TopVpnError::UnsupportedProtocol("ss://x".to_string()).is_per_candidate());
        assert!(TopVpnError::SlotConfiguration {
            tag: "outbound0".to_string(),
            reason: "bad params".to_string()
        }
        .is_per_candidate());

        assert!(!TopVpnError::EngineUnavailable("api down".to_string()).is_per_candidate());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TopVpnError::EngineUnavailable("api down".to_string()).is_fatal());
        assert!(TopVpnError::InvalidConfig("bad port".to_string()).is_fatal());

        assert!(!TopVpnError::Parse("bad".to_string()).is_fatal());
        assert!(!TopVpnError::SlotConfiguration {
            tag: "outbound1".to_string(),
            reason: "rejected".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_url_parse_error_conversion() {
        let err: TopVpnError = url::ParseError::EmptyHost.into();
        assert!(matches!(err, TopVpnError::Parse(_)));
    }
}
