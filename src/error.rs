//! API daemon error classification
//!
//! Wraps gRPC status and transport failures in one type so bots can decide
//! between "log and keep polling", "retry with backoff" and "shut down".

use std::time::Duration;
use thiserror::Error;
use tonic::Code;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Daemon replied with a non-OK gRPC status
    #[error("{} ({:?})", .0.message(), .0.code())]
    Status(#[from] tonic::Status),

    /// Could not reach the daemon at all
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A failure the calling bot can survive; `stall` asks it to pause first
    #[error("Non-Fatal Error ({message})")]
    NonFatal {
        message: String,
        stall: Option<Duration>,
    },

    #[error("trade {trade_id} is not in the expected state: expected {expected}, got {actual}")]
    InvalidTradeState {
        trade_id: String,
        expected: String,
        actual: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("password is not a valid gRPC metadata value")]
    InvalidMetadata,

    #[error("daemon reply is missing field '{0}'")]
    MissingField(&'static str),

    /// Ctrl-C arrived while a bot was waiting
    #[error("interrupted by shutdown request")]
    Interrupted,
}

impl ApiError {
    pub fn non_fatal(message: impl Into<String>) -> Self {
        ApiError::NonFatal {
            message: message.into(),
            stall: None,
        }
    }

    pub fn code(&self) -> Option<Code> {
        match self {
            ApiError::Status(status) => Some(status.code()),
            _ => None,
        }
    }

    /// Status message without the gRPC code prefix
    pub fn clean_message(&self) -> String {
        match self {
            ApiError::Status(status) => status.message().to_string(),
            ApiError::NonFatal { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Daemon busy, wallet already unlocked/locked, or an explicit non-fatal failure
    pub fn is_non_fatal(&self) -> bool {
        match self {
            ApiError::NonFatal { .. } => true,
            ApiError::Status(status) => matches!(
                status.code(),
                Code::Unavailable | Code::FailedPrecondition | Code::AlreadyExists
            ),
            _ => false,
        }
    }

    /// Whether this error is retryable with exponential backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status(status) => matches!(
                status.code(),
                Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted
            ),
            _ => false,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ApiError::Interrupted)
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::NotFound(_) => true,
            ApiError::Status(status) => status.code() == Code::NotFound,
            _ => false,
        }
    }

    /// How long a bot should pause before its next attempt
    pub fn stall(&self) -> Option<Duration> {
        match self {
            ApiError::NonFatal { stall, .. } => *stall,
            _ => None,
        }
    }

    /// Converts wallet-state statuses (already unlocked, locked, busy) into
    /// `NonFatal`; leaves every other error as it is.
    pub fn into_non_fatal_if_wallet_state(self) -> Self {
        if let ApiError::Status(ref status) = self {
            if matches!(
                status.code(),
                Code::Unavailable | Code::FailedPrecondition | Code::AlreadyExists
            ) {
                return ApiError::non_fatal(status.message());
            }
        }
        self
    }
}
