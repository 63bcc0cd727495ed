//! Failure classes of the Google API calls.

/// An error from the mail or spreadsheet service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// HTTP 429, or 403 carrying a rate-limit reason.
    #[error("{service} rate limit exceeded: {message}")]
    RateLimited {
        service: &'static str,
        message: String,
    },

    #[error("{service} server error {status}: {message}")]
    Server {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} client error {status}: {message}")]
    Client {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} transport error: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} authorization failed: {message}")]
    Auth {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned a malformed response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ServiceError::RateLimited { .. })
    }

    /// Server or client errors, the classes retried around a row write.
    /// Rate limits are client errors too, though the sheet retries those
    /// itself before they get here.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Server { .. }
                | ServiceError::Client { .. }
                | ServiceError::RateLimited { .. }
        )
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        let limited = ServiceError::RateLimited {
            service: "sheets",
            message: "slow down".into(),
        };
        let server = ServiceError::Server {
            service: "sheets",
            status: 503,
            message: "unavailable".into(),
        };
        let auth = ServiceError::Auth {
            service: "gmail",
            message: "no token".into(),
        };

        assert!(limited.is_rate_limited());
        assert!(limited.is_transient());
        assert!(!server.is_rate_limited());
        assert!(server.is_transient());
        assert!(!auth.is_transient());
    }
}
