use shared::{
    domain::QuestionStatus,
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

/// Failure of a core operation.
///
/// `NotFound` means the caller acted on a stale view; transports drop it
/// without notifying anyone. Every other variant is reported to the
/// originating caller only and never broadcast.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("you have already voted on this question")]
    AlreadyVoted,
    #[error("a {from} question cannot become {to}")]
    InvalidTransition {
        from: QuestionStatus,
        to: QuestionStatus,
    },
    #[error("storage failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) | CoreError::InvalidTransition { .. } => ErrorCode::Validation,
            CoreError::NotFound(_) => ErrorCode::NotFound,
            CoreError::Unauthorized(_) => ErrorCode::Unauthorized,
            CoreError::AlreadyVoted => ErrorCode::AlreadyVoted,
            CoreError::Persistence(_) => ErrorCode::Internal,
        }
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

impl From<CoreError> for ApiError {
    fn from(value: CoreError) -> Self {
        match value {
            // storage details stay in the server log
            CoreError::Persistence(_) => {
                ApiError::new(ErrorCode::Internal, "something went wrong, please try again")
            }
            other => ApiError::new(other.code(), other.to_string()),
        }
    }
}
