//! Error types for the object delivery service.
//!
//! This module defines the central `Error` enum shared by the server and the
//! benchmark client. It implements `From<Error>` for `tonic::Status` so server
//! failures propagate to gRPC callers with a meaningful status code, and
//! `From<Status>` for `Error` so the client can map a received status back
//! into the same taxonomy.
//!
//! ## Error Cases
//! - `StartupIo`: The backing content could not be read at startup.
//! - `ContentUnavailable`: A request arrived but the content cannot be served.
//! - `StreamAborted`: A streaming session failed on its send or receive leg.
//! - `Transport`: A connection-level failure (connect, HTTP, gRPC transport).
//! - `SessionClosed`: An operation was attempted on a closed session.
//! - `ProtocolViolation`: The peer broke the 1:1 request/response pairing.
//! - `DeadlineExceeded`: A benchmark run exceeded its configured deadline.
//! - `InvalidConfig`: A configuration value was rejected.

use std::path::PathBuf;
use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the object delivery service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Reading the backing content file failed.
    #[error("Failed to load content from {}: {source}", path.display())]
    StartupIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The content could not be delivered for this request.
    #[error("Content unavailable: {reason}")]
    ContentUnavailable { reason: String },

    /// A streaming session was terminated by a failure on either leg.
    #[error("Stream aborted: {context}")]
    StreamAborted { context: String },

    /// Connection-level failure between client and server.
    #[error("Transport error: {context}")]
    Transport { context: String },

    /// The session has already reached its terminal state.
    #[error("Session is closed")]
    SessionClosed,

    /// The peer did not honour strict request/response pairing.
    #[error("Protocol violation: expected {expected} responses, observed {observed}")]
    ProtocolViolation { expected: u64, observed: u64 },

    /// A run did not finish within its configured deadline.
    #[error("Deadline of {secs}s exceeded")]
    DeadlineExceeded { secs: u64 },

    /// A configuration value was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    pub fn transport(context: impl std::fmt::Display) -> Self {
        Self::Transport {
            context: context.to_string(),
        }
    }

    pub fn stream_aborted(context: impl std::fmt::Display) -> Self {
        Self::StreamAborted {
            context: context.to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::StartupIo { .. } => Status::internal(err.to_string()),
            Error::ContentUnavailable { reason } => Status::failed_precondition(reason),
            Error::StreamAborted { context } => Status::aborted(context),
            Error::Transport { context } => Status::unavailable(context),
            Error::SessionClosed => Status::aborted("Session is closed"),
            Error::ProtocolViolation { .. } => Status::internal(err.to_string()),
            Error::DeadlineExceeded { .. } => Status::deadline_exceeded(err.to_string()),
            Error::InvalidConfig { reason } => Status::invalid_argument(reason),
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::FailedPrecondition => Error::ContentUnavailable {
                reason: status.message().to_string(),
            },
            Code::Aborted => Error::StreamAborted {
                context: status.message().to_string(),
            },
            _ => Error::Transport {
                context: format!("{:?}: {}", status.code(), status.message()),
            },
        }
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::transport(err)
    }
}
