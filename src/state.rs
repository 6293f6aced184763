//! # UI state
//!
//! Pure, DOM-free state pieces owned by the [`Controller`](crate::controller::Controller):
//!
//! - [`PipelineState`]: per-pipeline request state with an explicit
//!   transition table; the busy flag is derived from it.
//! - [`ResultCache`]: last result payload per pipeline.
//! - [`FullscreenState`]: the single globally exclusive expanded panel.
//! - [`FeedbackForm`]: the feedback modal and its submit control.
//! - [`LogEntry`]: one rendered log line.
//!
//! Nothing here performs I/O.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::protocol::Pipeline;

// ---------------------------------------------------------------------------
// Pipeline state machine
// ---------------------------------------------------------------------------

/// Request state of one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    #[default]
    Idle,
    Pending,
    Done,
    Error,
}

/// Inputs that drive [`PipelineState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// User submitted a request for this pipeline.
    Submit,
    /// A result set tagged with this pipeline arrived.
    Result,
    /// The server reported an error (applies to both pipelines).
    Error,
    /// The connection closed, failed, or timed out.
    Closed,
}

impl PipelineState {
    /// Apply `event`, returning the next state.
    ///
    /// The only rejected transition is submitting while already pending.
    pub fn transition(self, event: PipelineEvent) -> Option<PipelineState> {
        use PipelineEvent as E;
        use PipelineState as S;
        match (self, event) {
            (S::Pending, E::Submit) => None,
            (_, E::Submit) => Some(S::Pending),
            (_, E::Result) => Some(S::Done),
            (S::Pending, E::Error | E::Closed) => Some(S::Error),
            (state, E::Error | E::Closed) => Some(state),
        }
    }

    pub fn is_busy(self) -> bool {
        self == PipelineState::Pending
    }
}

/// State for both pipelines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStates {
    states: HashMap<Pipeline, PipelineState>,
}

impl PipelineStates {
    pub fn get(&self, pipeline: Pipeline) -> PipelineState {
        self.states.get(&pipeline).copied().unwrap_or_default()
    }

    pub fn is_busy(&self, pipeline: Pipeline) -> bool {
        self.get(pipeline).is_busy()
    }

    /// Move `pipeline` into `Pending`, or reject if it already is.
    pub fn submit(&mut self, pipeline: Pipeline) -> Result<(), ValidationError> {
        let next = self
            .get(pipeline)
            .transition(PipelineEvent::Submit)
            .ok_or(ValidationError::PipelineBusy(pipeline))?;
        self.states.insert(pipeline, next);
        Ok(())
    }

    /// Apply a non-submit event to one pipeline.
    pub fn apply(&mut self, pipeline: Pipeline, event: PipelineEvent) {
        if let Some(next) = self.get(pipeline).transition(event) {
            self.states.insert(pipeline, next);
        }
    }

    /// Apply a non-submit event to every pipeline.
    pub fn apply_all(&mut self, event: PipelineEvent) {
        for pipeline in Pipeline::ALL {
            self.apply(pipeline, event);
        }
    }

    pub fn any_busy(&self) -> bool {
        Pipeline::ALL.iter().any(|p| self.is_busy(*p))
    }
}

// ---------------------------------------------------------------------------
// Result cache
// ---------------------------------------------------------------------------

/// Last received result payload per pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultCache {
    entries: HashMap<Pipeline, Value>,
}

impl ResultCache {
    pub fn store(&mut self, pipeline: Pipeline, results: Value) {
        self.entries.insert(pipeline, results);
    }

    pub fn get(&self, pipeline: Pipeline) -> Option<&Value> {
        self.entries.get(&pipeline)
    }

    /// Number of items to render for `pipeline`: array length, 1 for any other
    /// non-null value, 0 when absent.
    pub fn item_count(&self, pipeline: Pipeline) -> usize {
        match self.entries.get(&pipeline) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Fullscreen
// ---------------------------------------------------------------------------

/// A view region that can be expanded to fill the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    Log,
    ConsistencyResults,
    GrammarResults,
}

impl Panel {
    pub const ALL: [Panel; 3] = [Panel::Log, Panel::ConsistencyResults, Panel::GrammarResults];

    /// The result panel for `pipeline`.
    pub fn results_for(pipeline: Pipeline) -> Panel {
        match pipeline {
            Pipeline::Consistency => Panel::ConsistencyResults,
            Pipeline::Grammar => Panel::GrammarResults,
        }
    }
}

/// At most one expanded panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullscreenState {
    expanded: Option<Panel>,
}

impl FullscreenState {
    pub fn expanded(&self) -> Option<Panel> {
        self.expanded
    }

    pub fn is_expanded(&self, panel: Panel) -> bool {
        self.expanded == Some(panel)
    }

    /// Collapse `panel` if it is expanded, otherwise collapse whatever is
    /// expanded and expand `panel`. Returns the panel collapsed, if any.
    pub fn toggle(&mut self, panel: Panel) -> Option<Panel> {
        let previous = self.expanded.take();
        if previous != Some(panel) {
            self.expanded = Some(panel);
        }
        previous
    }

    /// Collapse the expanded panel, if any.
    pub fn escape(&mut self) -> Option<Panel> {
        self.expanded.take()
    }
}

// ---------------------------------------------------------------------------
// Feedback form
// ---------------------------------------------------------------------------

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// The feedback modal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackForm {
    pub open: bool,
    pub pipeline: Option<Pipeline>,
    pub rating: Option<u8>,
    pub comment: String,
    /// True while a submission is in flight; the submit control is disabled.
    pub submitting: bool,
}

impl FeedbackForm {
    pub fn open_for(&mut self, pipeline: Pipeline) {
        *self = FeedbackForm { open: true, pipeline: Some(pipeline), ..Default::default() };
    }

    pub fn close(&mut self) {
        *self = FeedbackForm::default();
    }

    pub fn submit_enabled(&self) -> bool {
        !self.submitting
    }
}

/// Check that `rating` is selected and on the scale.
pub fn validate_rating(rating: Option<u8>) -> Result<u8, ValidationError> {
    let rating = rating.ok_or(ValidationError::NoRating)?;
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ValidationError::RatingOutOfRange {
            rating,
            min: MIN_RATING,
            max: MAX_RATING,
        });
    }
    Ok(rating)
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    /// Echo of the user's own submission.
    User,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub text: String,
}

impl LogEntry {
    pub fn info(text: impl Into<String>) -> Self {
        LogEntry { level: LogLevel::Info, text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        LogEntry { level: LogLevel::User, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        LogEntry { level: LogLevel::Error, text: text.into() }
    }
}
