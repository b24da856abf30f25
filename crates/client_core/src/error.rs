use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("submission needs the review step and all three declarations")]
    NotReady,
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("you must login first")]
    MissingCredential,
    #[error("author index {index} is out of range for {len} author(s)")]
    AuthorIndexOutOfRange { index: usize, len: usize },
    #[error("attachments can no longer be read: {}", files.join(", "))]
    UnreadableAttachments { files: Vec<String> },
    #[error("submission rejected: {message}")]
    Rejected { message: String },
    #[error("error submitting manuscript: {0}")]
    Transport(anyhow::Error),
    #[error("draft storage failed: {0}")]
    Storage(anyhow::Error),
}

impl WorkflowError {
    /// Failures after which the same draft can be submitted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Rejected { .. } | WorkflowError::Transport(_)
        )
    }
}
