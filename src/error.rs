//! Error types for inventory queries and image lookups.

use thiserror::Error;

/// Errors surfaced to the command-line front ends.
#[derive(Debug, Error)]
pub enum Error {
    /// The EC2 API call failed (network, auth, throttling, permissions).
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    /// No image matched the owner filter and name pattern.
    #[error("no image owned by '{owner}' matches name pattern '{pattern}'")]
    NotFound { owner: String, pattern: String },

    /// A threshold argument that is not a non-negative whole number of days.
    #[error("invalid threshold '{0}': expected a whole number of days")]
    InvalidThreshold(String),
}

impl Error {
    /// Build a transport error from an AWS SDK error, keeping the provider's
    /// error code and message.
    pub fn transport<E>(operation: &'static str, err: &E) -> Self
    where
        E: aws_sdk_ec2::error::ProvideErrorMetadata + std::error::Error,
    {
        let message = match err.message() {
            Some(msg) => msg.to_string(),
            None => aws_sdk_ec2::error::DisplayErrorContext(err).to_string(),
        };
        Error::Transport {
            operation,
            code: err.code().map(str::to_string),
            message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Transport { code: Some(c), .. } => suggestion_for_code(c),
            _ => None,
        }
    }
}

/// Error code to user-friendly suggestion mapping
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "AuthFailure",
        "Check that AWS credentials are configured for this account.",
    ),
    (
        "UnauthorizedOperation",
        "The caller needs ec2:DescribeInstances and ec2:DescribeImages permissions.",
    ),
    (
        "ExpiredToken",
        "The session token has expired. Refresh your credentials and retry.",
    ),
    (
        "RequestExpired",
        "The session token has expired. Refresh your credentials and retry.",
    ),
    (
        "OptInRequired",
        "The region is not enabled for this account.",
    ),
    (
        "RequestLimitExceeded",
        "AWS API rate limit hit. Wait a moment and run the report again.",
    ),
    (
        "Throttling",
        "AWS API rate limit hit. Wait a moment and run the report again.",
    ),
];

fn suggestion_for_code(code: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| *s)
}
