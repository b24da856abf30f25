use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("unknown file requirement label: {0}")]
    UnknownRequirement(String),
    #[error("unknown author field: {0}")]
    UnknownAuthorField(String),
    #[error("unknown declaration: {0}")]
    UnknownDeclaration(String),
    #[error("unknown citation style: {0}")]
    UnknownCitationStyle(String),
    #[error("unknown submission status: {0}")]
    UnknownSubmissionStatus(String),
}
