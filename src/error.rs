//! Error taxonomy for the client.
//!
//! Every failure falls into one of four buckets: local validation, transport,
//! protocol (malformed server frames) and configuration. None of them is fatal
//! to a running [`Controller`](crate::controller::Controller); they are logged
//! and the affected controls are re-enabled.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::Pipeline;

/// Input rejected before anything reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Neither text nor a file was supplied.
    #[error("please enter some text or attach a file")]
    EmptySubmission,

    /// Feedback was submitted without picking a rating.
    #[error("please select a rating before submitting feedback")]
    NoRating,

    /// Rating outside the accepted scale.
    #[error("rating {rating} is out of range ({min}..={max})")]
    RatingOutOfRange { rating: u8, min: u8, max: u8 },

    /// Feedback targets a pipeline that has not produced results yet.
    #[error("no {0} results to give feedback on yet")]
    NoResults(Pipeline),

    /// The pipeline already has a request in flight.
    #[error("{0} check is already running")]
    PipelineBusy(Pipeline),

    /// An earlier feedback submission has not been acknowledged yet.
    #[error("feedback is already being submitted")]
    FeedbackPending,
}

/// Connection-level failures. Logged, busy flags cleared, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection to {url} failed: {detail}")]
    ConnectFailed { url: String, detail: String },

    #[error("connection closed: {0}")]
    Disconnected(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("could not read file '{name}': {detail}")]
    FileRead { name: String, detail: String },

    #[error("no response within {after:?}")]
    TimedOut { after: Duration },
}

/// A server frame that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message is not valid JSON: {0}")]
    NotJson(String),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("field '{field}' has the wrong type (expected {expected})")]
    WrongType { field: &'static str, expected: &'static str },

    #[error("unknown pipeline '{0}'")]
    UnknownPipeline(String),

    #[error("message has no recognised field")]
    Unrecognised,
}

/// Problems loading the client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {detail}")]
    Parse { path: String, detail: String },

    #[error("invalid host '{0}'")]
    InvalidHost(String),
}

/// Umbrella error for the public API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
