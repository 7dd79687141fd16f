/// Typed failure taxonomy for a progress subscription.
/// Classifies failures as retryable (transport) or terminal (everything else).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    // Retryable
    #[error("transport error: {0}")]
    Transport(String),

    // Terminal
    #[error("{0}")]
    Application(String),
    #[error("Max reconnection attempts ({attempts}) reached")]
    ReconnectExhausted { attempts: u32 },

    // Reported, connection kept
    #[error("Failed to parse message: {0}")]
    Protocol(String),
}

impl FeedError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the subscription ends with this error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Application(_) | Self::ReconnectExhausted { .. })
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Application(_) => "application",
            Self::ReconnectExhausted { .. } => "reconnect_exhausted",
            Self::Protocol(_) => "protocol",
        }
    }
}
