/// Errors that can occur while obtaining an approval decision.
///
/// A denial is not an error; it is an [`crate::ApprovalDecision::Denied`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    /// A request arrived while another was still awaiting a decision.
    #[error("approval for '{tool}' rejected: another approval request is still pending")]
    ConcurrentRequest {
        /// Tool whose request was rejected.
        tool: String,
    },

    /// The approval handler failed to produce a decision.
    #[error("approval handler failed: {0}")]
    Handler(String),

    /// The UI channel closed before a response arrived.
    #[error("approval channel closed")]
    ChannelClosed,
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
