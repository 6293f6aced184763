//! Wire contract between the client and the proofreading backend.
//!
//! Outbound frames are plain JSON objects with a fixed key set. Inbound
//! frames carry no discriminant, so [`parse_server_message`] classifies them
//! by which field is present, in a fixed priority order, and validates field
//! types before anything reaches the controller.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Path of the chat socket on the backend host.
pub const CHAT_PATH: &str = "/ws/chat";

// ---------------------------------------------------------------------------
// Pipeline selector
// ---------------------------------------------------------------------------

/// Server-side processing mode selectable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// Entity extraction followed by a cross-chunk consistency check.
    Consistency,
    /// Chunk-by-chunk grammar checking.
    Grammar,
}

impl Pipeline {
    pub const ALL: [Pipeline; 2] = [Pipeline::Consistency, Pipeline::Grammar];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Consistency => "consistency",
            Pipeline::Grammar => "grammar",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "consistency" => Some(Pipeline::Consistency),
            "grammar" => Some(Pipeline::Grammar),
            _ => None,
        }
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// An attached file after base64 encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub filename: String,
    /// Standard base64 of the raw file bytes.
    pub content: String,
}

/// A pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub message: String,
    pub pipeline: Pipeline,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FilePayload>,
}

/// A rating/comment tied to a previously received result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    action: String,
    pub pipeline: Pipeline,
    pub results: Value,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl FeedbackRequest {
    pub const ACTION: &'static str = "feedback";

    pub fn new(pipeline: Pipeline, results: Value, rating: u8, comment: Option<String>) -> Self {
        FeedbackRequest {
            action: Self::ACTION.to_string(),
            pipeline,
            results,
            rating,
            comment,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

/// Anything the client writes to the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Analyze(AnalyzeRequest),
    Feedback(FeedbackRequest),
}

impl Outbound {
    pub fn to_json(&self) -> String {
        // Both variants are plain data with string keys; serialization cannot fail.
        let result = match self {
            Outbound::Analyze(req) => serde_json::to_string(req),
            Outbound::Feedback(req) => serde_json::to_string(req),
        };
        result.unwrap_or_default()
    }

    pub fn pipeline(&self) -> Pipeline {
        match self {
            Outbound::Analyze(req) => req.pipeline,
            Outbound::Feedback(req) => req.pipeline,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

/// A validated server push.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Progress line from the running pipeline.
    Log(String),
    /// Final result set for one pipeline.
    Results { pipeline: Pipeline, results: Value },
    /// Acknowledgement of a feedback submission.
    FeedbackResult(String),
    /// Application error reported by the server.
    Error(String),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Log(_) => "log",
            ServerMessage::Results { .. } => "results",
            ServerMessage::FeedbackResult(_) => "feedback_result",
            ServerMessage::Error(_) => "error",
        }
    }
}

fn string_field(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Option<Result<String, ProtocolError>> {
    obj.get(field).map(|v| {
        v.as_str()
            .map(str::to_string)
            .ok_or(ProtocolError::WrongType { field, expected: "string" })
    })
}

/// Classify a raw text frame.
///
/// Priority order: `log`, `results` (+ `pipeline`), `feedback_result`,
/// `error`. A `results` frame without a `pipeline` tag belongs to
/// [`Pipeline::Consistency`]. The `{type, content}` envelope of the first
/// server revision is accepted as a fallback.
pub fn parse_server_message(raw: &str) -> Result<ServerMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::NotJson(e.to_string()))?;
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    if let Some(log) = string_field(obj, "log") {
        return log.map(ServerMessage::Log);
    }

    if let Some(results) = obj.get("results") {
        let pipeline = match obj.get("pipeline") {
            None | Some(Value::Null) => Pipeline::Consistency,
            Some(Value::String(s)) => Pipeline::from_str_loose(s)
                .ok_or_else(|| ProtocolError::UnknownPipeline(s.clone()))?,
            Some(_) => {
                return Err(ProtocolError::WrongType { field: "pipeline", expected: "string" })
            }
        };
        return Ok(ServerMessage::Results { pipeline, results: results.clone() });
    }

    if let Some(ack) = string_field(obj, "feedback_result") {
        return ack.map(ServerMessage::FeedbackResult);
    }

    if let Some(err) = string_field(obj, "error") {
        return err.map(ServerMessage::Error);
    }

    match obj.get("type").and_then(Value::as_str) {
        Some("log") => match obj.get("content") {
            Some(Value::String(s)) => Ok(ServerMessage::Log(s.clone())),
            _ => Err(ProtocolError::WrongType { field: "content", expected: "string" }),
        },
        Some("reply") => Ok(ServerMessage::Results {
            pipeline: Pipeline::Consistency,
            results: obj.get("content").cloned().unwrap_or(Value::Null),
        }),
        _ => Err(ProtocolError::Unrecognised),
    }
}

/// Build the socket URL for `host`, mirroring the page's transport security.
pub fn endpoint_url(host: &str, secure: bool, path: &str) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    let path = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
    format!("{scheme}://{}{path}", host.trim_end_matches('/'))
}
