use std::fmt;
use std::time::Duration;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    SourceUnavailable,
    SourceTimeout,
    SubscriptionClosed,
    InvalidWindow,
    InputParseError,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`M####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "M1001",
            Self::SourceUnavailable => "M2001",
            Self::SourceTimeout => "M2002",
            Self::SubscriptionClosed => "M2003",
            Self::InvalidWindow => "M3001",
            Self::InputParseError => "M4001",
            Self::InternalUnexpected => "M9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::SourceUnavailable => "Message source unavailable",
            Self::SourceTimeout => "Message source timed out",
            Self::SubscriptionClosed => "Live subscription closed",
            Self::InvalidWindow => "Invalid time window",
            Self::InputParseError => "Message input parse error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .mailscope/config.toml and retry."),
            Self::SourceUnavailable => {
                Some("Check that the message store is reachable; the view retries on refresh.")
            }
            Self::SourceTimeout => Some("Retry the refresh; the last snapshot stays visible."),
            Self::SubscriptionClosed => None,
            Self::InvalidWindow => Some("Use a positive bucket size and an end after the start."),
            Self::InputParseError => Some("Each input line must be one JSON message object."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure of a call into the message source.
///
/// Always recoverable at the coordinator boundary: a failed fetch stops one
/// refresh, never the retry timer or the subscription loop.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("message source unavailable: {0}")]
    Unavailable(String),

    #[error("message source timed out after {0:?}")]
    Timeout(Duration),

    #[error("message source I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("subscription closed")]
    Closed,
}

impl SourceError {
    /// Map to the stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable(_) | Self::Io(_) => ErrorCode::SourceUnavailable,
            Self::Timeout(_) => ErrorCode::SourceTimeout,
            Self::Closed => ErrorCode::SubscriptionClosed,
        }
    }
}

/// Rejected aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("bucket size must be positive, got {seconds}s")]
    NonPositiveBucket { seconds: i64 },

    #[error("window end precedes start")]
    EndBeforeStart,
}

impl WindowError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidWindow
    }
}
