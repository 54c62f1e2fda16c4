use reqwest::StatusCode;
use thiserror::Error;

use crate::retry::{Classify, ErrorClass};

/// Failure of a single outbound call to a search, financial or model endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{service} rate limit exceeded: {message}")]
    RateLimited {
        service: &'static str,
        message: String,
    },
    #[error("{service} request failed: {message}")]
    Transient {
        service: &'static str,
        message: String,
    },
    #[error("{service} rejected request ({status}): {message}")]
    Fatal {
        service: &'static str,
        status: u16,
        message: String,
    },
}

impl FetchError {
    /// Map a non-success HTTP status into the retry taxonomy.
    pub fn from_status(service: &'static str, status: StatusCode, body: String) -> Self {
        let message = truncate(&body, 300);
        if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited { service, message }
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            Self::Transient {
                service,
                message: format!("{status}: {message}"),
            }
        } else {
            Self::Fatal {
                service,
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Network, timeout and body-decoding failures are all worth another attempt.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Self::RateLimited {
                    service,
                    message: err.to_string(),
                };
            }
        }
        let kind = if err.is_timeout() {
            "timed out"
        } else if err.is_decode() {
            "undecodable response"
        } else {
            "transport error"
        };
        Self::Transient {
            service,
            message: format!("{kind}: {err}"),
        }
    }

    pub fn transient(service: &'static str, message: impl Into<String>) -> Self {
        Self::Transient {
            service,
            message: message.into(),
        }
    }
}

impl Classify for FetchError {
    fn class(&self) -> ErrorClass {
        match self {
            FetchError::RateLimited { .. } => ErrorClass::RateLimited,
            FetchError::Transient { .. } => ErrorClass::Transient,
            FetchError::Fatal { .. } => ErrorClass::Fatal,
        }
    }
}

pub(crate) fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_retry_classes() {
        let limited = FetchError::from_status("gemini", StatusCode::TOO_MANY_REQUESTS, "".into());
        assert_eq!(limited.class(), ErrorClass::RateLimited);

        let unavailable =
            FetchError::from_status("gemini", StatusCode::SERVICE_UNAVAILABLE, "busy".into());
        assert_eq!(unavailable.class(), ErrorClass::Transient);

        let forbidden = FetchError::from_status("search", StatusCode::FORBIDDEN, "bad key".into());
        assert_eq!(forbidden.class(), ErrorClass::Fatal);
        assert!(forbidden.to_string().contains("403"));
    }

    #[test]
    fn truncate_short_strings_return_same() {
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn truncate_long_strings_adds_ellipsis() {
        let result = truncate("abcdefghijklmnopqrstuvwxyz", 5);
        assert_eq!(result, "abcde…");
    }
}
