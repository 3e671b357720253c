use mailscope_core::{ErrorCode, SourceError, WindowError};

use crate::view::ViewId;

/// Errors surfaced by coordinator calls.
///
/// Fetch failures never appear here: they are recorded on the view as
/// [`crate::view::ViewFault`] and the previous snapshot stays visible.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("no open view with id {0}")]
    UnknownView(ViewId),

    #[error("unknown zoom level '{0}' (expected 1h, 4h, 24h, 7d or all)")]
    UnknownZoom(String),

    #[error("coordinator has been shut down")]
    ShutDown,

    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        what: &'static str,
        source: std::io::Error,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Window(#[from] WindowError),
}

impl LiveError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownView(_) | Self::ShutDown | Self::Spawn { .. } => {
                ErrorCode::InternalUnexpected
            }
            Self::UnknownZoom(_) | Self::Window(_) => ErrorCode::InvalidWindow,
            Self::Source(err) => err.code(),
        }
    }
}
