use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("fetch timeout")]
    Timeout,

    #[error("http error {status}")]
    Http {
        status: reqwest::StatusCode,
        retryable: bool,
    },

    #[error("body too large ({0} bytes)")]
    BodyTooLarge(u64),

    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("charset decode failure ({0})")]
    Charset(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn should_retry(&self) -> bool {
        match self {
            // Fatal errors - the same request will fail the same way
            Self::InvalidUrl(_) => false,
            Self::BodyTooLarge(_) => false,
            Self::UnsupportedContentType(_) => false,
            Self::Charset(_) => false,
            Self::Http { retryable, .. } => *retryable,

            // Temporary errors - retry
            Self::Timeout => true,
            Self::Transport(_) => true,
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Http {
                status,
                retryable: status.is_server_error(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_do_not_retry() {
        assert!(!FetchError::BodyTooLarge(10_000_000).should_retry());
        assert!(!FetchError::UnsupportedContentType("application/pdf".to_string()).should_retry());
        assert!(!FetchError::Charset("shift_jis".to_string()).should_retry());
        assert!(
            !FetchError::Http {
                status: reqwest::StatusCode::NOT_FOUND,
                retryable: false
            }
            .should_retry()
        );
    }

    #[test]
    fn test_transient_errors_retry() {
        assert!(FetchError::Timeout.should_retry());
        assert!(FetchError::Transport("connection reset by peer".to_string()).should_retry());
        assert!(
            FetchError::Http {
                status: reqwest::StatusCode::BAD_GATEWAY,
                retryable: true
            }
            .should_retry()
        );
    }
}
