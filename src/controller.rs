//! # Controller
//!
//! ## Responsibility
//! The client's single state owner. Consumes user actions and network events,
//! updates [`ViewState`], and emits [`Effect`]s for the runtime to perform.
//! After every event it calls [`View::render`] exactly once.
//!
//! ## Guarantees
//! - Events tagged with a session that is not current are ignored.
//! - A busy pipeline is always released by one of: result, server error,
//!   connection close/failure, request timeout, or being superseded. Every
//!   release other than a result leaves an error line in the log.
//! - The request timer measures silence: any frame on the live session
//!   restarts it.
//! - Validation failures never produce an effect.
//!
//! ## NOT Responsible For
//! - Sockets, file reads, timers (see [`crate::runtime`])
//! - Drawing (see [`View`] implementations)

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::encoder::{validate_submission, FileAttachment, PendingRequest};
use crate::error::{TransportError, ValidationError};
use crate::protocol::{
    parse_server_message, AnalyzeRequest, FeedbackRequest, Outbound, Pipeline, ServerMessage,
};
use crate::session::{ConnectionManager, Queued, Session, SessionId};
use crate::state::{
    validate_rating, FeedbackForm, FullscreenState, LogEntry, Panel, PipelineEvent,
    PipelineStates, ResultCache,
};

// ---------------------------------------------------------------------------
// Effects and view
// ---------------------------------------------------------------------------

/// A side effect requested by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a socket for `session`.
    Open { session: SessionId, url: String },
    /// Encode the request's file, then report back with the finished request.
    EncodeFile { session: SessionId, request: PendingRequest },
    /// Write one text frame.
    Send { session: SessionId, payload: String },
    /// Start the reply timer for send number `seq` on `session`.
    ArmTimeout { session: SessionId, seq: u64 },
    /// Tear down the socket.
    Close { session: SessionId },
}

/// Everything a front end needs to draw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub log: Vec<LogEntry>,
    pub pipelines: PipelineStates,
    pub results: ResultCache,
    pub fullscreen: FullscreenState,
    pub feedback: FeedbackForm,
    pub connected: bool,
}

impl ViewState {
    pub fn submit_enabled(&self, pipeline: Pipeline) -> bool {
        !self.pipelines.is_busy(pipeline)
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }
}

/// Rendering seam. Implementations draw `state`; they must not call back into
/// the controller.
pub trait View {
    fn render(&mut self, state: &ViewState);
}

/// A view that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullView;

impl View for NullView {
    fn render(&mut self, _state: &ViewState) {}
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller<V: View> {
    url: String,
    view: V,
    state: ViewState,
    connections: ConnectionManager,
    effects: Vec<Effect>,
    started: bool,
    /// Timer generation for the current session. Only the newest armed
    /// timer may fire.
    timer_seq: u64,
}

impl<V: View> Controller<V> {
    /// Create a controller talking to the socket at `url`.
    pub fn new(url: impl Into<String>, view: V) -> Self {
        Controller {
            url: url.into(),
            view,
            state: ViewState::default(),
            connections: ConnectionManager::new(),
            effects: Vec::new(),
            started: false,
            timer_seq: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.connections.current()
    }

    /// Take all effects emitted since the last call.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // -- lifecycle ----------------------------------------------------------

    pub fn start(&mut self) {
        self.started = true;
        debug!(url = %self.url, "controller started");
        self.render();
    }

    /// Close any live session and release every control.
    pub fn dispose(&mut self) {
        if let Some(session) = self.connections.close_current() {
            self.effects.push(Effect::Close { session: session.id });
            self.release_session(&session);
        }
        self.state.connected = false;
        self.started = false;
        debug!("controller disposed");
        self.render();
    }

    // -- user actions -------------------------------------------------------

    /// Validate and start a pipeline request.
    ///
    /// Rejected submissions are logged and produce no effects.
    pub fn on_user_submit(
        &mut self,
        pipeline: Pipeline,
        text: &str,
        file: Option<FileAttachment>,
    ) -> Result<SessionId, ValidationError> {
        let result = self.begin_submit(pipeline, text, file);
        if let Err(err) = &result {
            debug!(%pipeline, error = %err, "submission rejected");
            self.state.push_log(LogEntry::error(err.to_string()));
        }
        self.render();
        result
    }

    fn begin_submit(
        &mut self,
        pipeline: Pipeline,
        text: &str,
        file: Option<FileAttachment>,
    ) -> Result<SessionId, ValidationError> {
        let request = validate_submission(pipeline, text, file)?;
        self.state.pipelines.submit(pipeline)?;

        if !request.text.is_empty() {
            self.state.push_log(LogEntry::user(request.text.clone()));
        }
        if let Some(file) = &request.file {
            self.state.push_log(LogEntry::user(format!("[file] {}", file.name)));
        }

        let session = self.open_session(Queued::Request(request));
        info!(%session, %pipeline, "request submitted");
        Ok(session)
    }

    /// Send feedback for the last `pipeline` result set.
    ///
    /// Reuses the current session when it is open and queues behind it while
    /// it is still connecting; only opens a new one when nothing is live.
    /// Returns the session the feedback rides on.
    pub fn submit_feedback(
        &mut self,
        pipeline: Pipeline,
        rating: Option<u8>,
        comment: Option<String>,
    ) -> Result<SessionId, ValidationError> {
        let result = self.begin_feedback(pipeline, rating, comment);
        if let Err(err) = &result {
            debug!(%pipeline, error = %err, "feedback rejected");
            self.state.push_log(LogEntry::error(err.to_string()));
        }
        self.render();
        result
    }

    fn begin_feedback(
        &mut self,
        pipeline: Pipeline,
        rating: Option<u8>,
        comment: Option<String>,
    ) -> Result<SessionId, ValidationError> {
        let results = self
            .state
            .results
            .get(pipeline)
            .cloned()
            .ok_or(ValidationError::NoResults(pipeline))?;
        if self.state.feedback.submitting {
            return Err(ValidationError::FeedbackPending);
        }
        let rating = validate_rating(rating)?;
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

        let form = &mut self.state.feedback;
        if !form.open || form.pipeline != Some(pipeline) {
            form.open_for(pipeline);
        }
        form.rating = Some(rating);
        form.comment = comment.clone().unwrap_or_default();
        form.submitting = true;

        let request = FeedbackRequest::new(pipeline, results, rating, comment);
        let session = match self.connections.current_mut() {
            Some(live) if live.is_open() => {
                live.carries_feedback = true;
                let id = live.id;
                self.send(id, Outbound::Feedback(request));
                id
            }
            Some(connecting) => {
                debug!(session = %connecting.id, "feedback queued behind connecting session");
                connecting.queue_feedback(request);
                connecting.id
            }
            None => self.open_session(Queued::Feedback(request)),
        };
        info!(%session, %pipeline, rating, "feedback submitted");
        Ok(session)
    }

    pub fn open_feedback(&mut self, pipeline: Pipeline) {
        self.state.feedback.open_for(pipeline);
        self.render();
    }

    pub fn close_feedback(&mut self) {
        self.state.feedback.close();
        self.render();
    }

    pub fn toggle_fullscreen(&mut self, panel: Panel) {
        self.state.fullscreen.toggle(panel);
        self.render();
    }

    pub fn escape(&mut self) {
        self.state.fullscreen.escape();
        self.render();
    }

    // -- network events -----------------------------------------------------

    /// The socket for `session` finished its handshake.
    pub fn on_connection_opened(&mut self, session: SessionId) {
        let Some(queued) = self.connections.mark_open(session) else {
            debug!(%session, "open event for stale session ignored");
            return;
        };
        self.state.connected = true;
        debug!(%session, queued = queued.len(), "connection open");
        for work in queued {
            match work {
                Queued::Request(request) if request.needs_encoding() => {
                    self.effects.push(Effect::EncodeFile { session, request });
                }
                Queued::Request(request) => {
                    self.send(session, Outbound::Analyze(request.into_request(None)));
                }
                Queued::Feedback(request) => {
                    self.send(session, Outbound::Feedback(request));
                }
            }
        }
        self.render();
    }

    /// File encoding for `session` completed.
    pub fn on_file_encoded(
        &mut self,
        session: SessionId,
        encoded: Result<AnalyzeRequest, TransportError>,
    ) {
        if self.connections.live_mut(session).is_none() {
            debug!(%session, "encoded file for stale session dropped");
            return;
        }
        match encoded {
            Ok(request) => self.send(session, Outbound::Analyze(request)),
            Err(err) => self.fail_session(session, err),
        }
        self.render();
    }

    /// A text frame arrived on `session`.
    pub fn on_server_message(&mut self, session: SessionId, raw: &str) {
        if self.connections.live_mut(session).is_none() {
            debug!(%session, "frame from stale session ignored");
            return;
        }
        match parse_server_message(raw) {
            Ok(message) => self.dispatch(session, message),
            Err(err) => {
                warn!(%session, error = %err, "unparseable server message");
                self.state.push_log(LogEntry::error(format!("parse error: {err}")));
            }
        }
        // The server is alive; restart the timer if it is still owed a reply.
        let awaiting = self
            .connections
            .live_mut(session)
            .is_some_and(|s| s.in_flight.is_some() || s.carries_feedback);
        if awaiting && self.timer_seq > 0 {
            self.arm_timeout(session);
        }
        self.render();
    }

    fn dispatch(&mut self, session: SessionId, message: ServerMessage) {
        debug!(%session, kind = message.kind(), "dispatching server message");
        match message {
            ServerMessage::Log(line) => {
                self.state.push_log(LogEntry::info(line));
            }
            ServerMessage::Results { pipeline, results } => {
                self.state.results.store(pipeline, results);
                self.state.pipelines.apply(pipeline, PipelineEvent::Result);
                let count = self.state.results.item_count(pipeline);
                self.state.push_log(LogEntry::info(format!(
                    "{pipeline} check finished: {count} result(s)"
                )));
                if let Some(s) = self.connections.live_mut(session) {
                    if s.in_flight == Some(pipeline) {
                        s.in_flight = None;
                    }
                }
                info!(%session, %pipeline, count, "results received");
            }
            ServerMessage::FeedbackResult(ack) => {
                self.state.push_log(LogEntry::info(format!("feedback submitted: {ack}")));
                self.state.feedback.close();
                if let Some(s) = self.connections.live_mut(session) {
                    s.carries_feedback = false;
                }
            }
            ServerMessage::Error(message) => {
                warn!(%session, error = %message, "server reported an error");
                self.state.push_log(LogEntry::error(message));
                // The server does not always say which pipeline failed.
                self.state.pipelines.apply_all(PipelineEvent::Error);
                self.state.feedback.submitting = false;
                if let Some(s) = self.connections.live_mut(session) {
                    s.in_flight = None;
                    s.carries_feedback = false;
                }
            }
        }
    }

    /// The peer closed `session` (or the stream ended).
    pub fn on_connection_closed(&mut self, session: SessionId, reason: Option<String>) {
        let Some(closed) = self.connections.close(session) else {
            debug!(%session, "close event for stale session ignored");
            return;
        };
        self.state.connected = false;
        let reason = reason.unwrap_or_else(|| "connection closed".to_string());
        if closed.in_flight.is_some() || closed.carries_feedback {
            warn!(%session, %reason, "connection closed with work outstanding");
            self.state.push_log(LogEntry::error(TransportError::Disconnected(reason).to_string()));
        } else {
            debug!(%session, %reason, "connection closed");
        }
        self.release_session(&closed);
        self.render();
    }

    /// The socket for `session` failed (connect, send, or file read).
    pub fn on_transport_error(&mut self, session: SessionId, err: TransportError) {
        if self.connections.live_mut(session).is_none() {
            debug!(%session, error = %err, "transport error for stale session ignored");
            return;
        }
        self.fail_session(session, err);
        self.render();
    }

    /// Timer `seq` on `session` expired after `after` of silence.
    pub fn on_timeout(&mut self, session: SessionId, seq: u64, after: Duration) {
        let awaiting = match self.connections.live_mut(session) {
            Some(s) => s.in_flight.is_some() || s.carries_feedback,
            None => false,
        };
        if !awaiting || seq != self.timer_seq {
            debug!(%session, seq, "superseded or idle timer ignored");
            return;
        }
        self.fail_session(session, TransportError::TimedOut { after });
        self.render();
    }

    // -- internals ----------------------------------------------------------

    fn open_session(&mut self, queued: Queued) -> SessionId {
        let (session, superseded) = self.connections.open(queued);
        self.timer_seq = 0;
        if let Some(old) = superseded {
            debug!(old = %old.id, new = %session, "superseding live session");
            if let Some(pipeline) = old.in_flight {
                self.state.push_log(LogEntry::error(format!(
                    "{pipeline} check cancelled: superseded by a new request"
                )));
            }
            if old.carries_feedback {
                self.state.push_log(LogEntry::error(
                    "feedback cancelled: superseded by a new request",
                ));
            }
            self.effects.push(Effect::Close { session: old.id });
            self.release_session(&old);
        }
        self.effects.push(Effect::Open { session, url: self.url.clone() });
        session
    }

    fn send(&mut self, session: SessionId, outbound: Outbound) {
        debug!(%session, pipeline = %outbound.pipeline(), "sending");
        self.effects.push(Effect::Send { session, payload: outbound.to_json() });
        self.arm_timeout(session);
    }

    fn arm_timeout(&mut self, session: SessionId) {
        self.timer_seq += 1;
        self.effects.push(Effect::ArmTimeout { session, seq: self.timer_seq });
    }

    fn fail_session(&mut self, session: SessionId, err: TransportError) {
        warn!(%session, error = %err, "transport failure");
        self.state.push_log(LogEntry::error(err.to_string()));
        if let Some(closed) = self.connections.close(session) {
            self.effects.push(Effect::Close { session });
            self.state.connected = false;
            self.release_session(&closed);
        }
    }

    /// Release the controls held by a session that just closed.
    fn release_session(&mut self, closed: &Session) {
        if let Some(pipeline) = closed.in_flight {
            self.state.pipelines.apply(pipeline, PipelineEvent::Closed);
        }
        if closed.carries_feedback {
            self.state.feedback.submitting = false;
        }
    }

    fn render(&mut self) {
        self.view.render(&self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LogLevel, PipelineState};
    use serde_json::{json, Value};

    #[derive(Default)]
    struct CountingView {
        renders: usize,
    }

    impl View for CountingView {
        fn render(&mut self, _state: &ViewState) {
            self.renders += 1;
        }
    }

    fn controller() -> Controller<CountingView> {
        let mut c = Controller::new("ws://localhost:8000/ws/chat", CountingView::default());
        c.start();
        c
    }

    fn sent_payloads(effects: &[Effect]) -> Vec<Value> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send { payload, .. } => serde_json::from_str(payload).ok(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn empty_submission_emits_nothing_and_logs() {
        let mut c = controller();
        let err = c.on_user_submit(Pipeline::Grammar, "   ", None).unwrap_err();
        assert_eq!(err, ValidationError::EmptySubmission);
        assert!(c.drain_effects().is_empty());
        assert_eq!(c.state().log.last().unwrap().level, LogLevel::Error);
        assert!(c.state().submit_enabled(Pipeline::Grammar));
    }

    #[test]
    fn submit_opens_then_sends_on_open() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "hello", None).unwrap();
        let effects = c.drain_effects();
        assert_eq!(effects, vec![Effect::Open { session, url: c.url().to_string() }]);
        assert!(!c.state().submit_enabled(Pipeline::Grammar));

        c.on_connection_opened(session);
        let effects = c.drain_effects();
        assert_eq!(
            sent_payloads(&effects),
            vec![json!({"message": "hello", "pipeline": "grammar"})]
        );
        assert!(effects.contains(&Effect::ArmTimeout { session, seq: 1 }));
        assert!(c.state().connected);
    }

    #[test]
    fn file_submission_waits_for_encoding() {
        let mut c = controller();
        let file = FileAttachment::from_bytes("a.txt", b"hi".to_vec());
        let session = c.on_user_submit(Pipeline::Consistency, "", Some(file)).unwrap();
        c.drain_effects();

        c.on_connection_opened(session);
        let effects = c.drain_effects();
        assert!(sent_payloads(&effects).is_empty(), "nothing sent before encoding");
        let request = match &effects[..] {
            [Effect::EncodeFile { request, .. }] => request.clone(),
            other => panic!("expected EncodeFile, got {other:?}"),
        };

        let encoded = tokio_test::block_on(crate::encoder::encode_request(request)).unwrap();
        c.on_file_encoded(session, Ok(encoded));
        let payloads = sent_payloads(&c.drain_effects());
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["file"]["filename"], "a.txt");
        assert_eq!(payloads[0]["file"]["content"], "aGk=");
    }

    #[test]
    fn file_encode_failure_releases_pipeline() {
        let mut c = controller();
        let file = FileAttachment::from_path("/no/such/file.docx");
        let session = c.on_user_submit(Pipeline::Grammar, "", Some(file)).unwrap();
        c.on_connection_opened(session);
        c.drain_effects();
        c.on_file_encoded(
            session,
            Err(TransportError::FileRead { name: "file.docx".into(), detail: "missing".into() }),
        );
        assert!(c.state().submit_enabled(Pipeline::Grammar));
        assert_eq!(c.drain_effects(), vec![Effect::Close { session }]);
    }

    #[test]
    fn results_fill_cache_and_release() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "hello", None).unwrap();
        c.on_connection_opened(session);
        c.on_server_message(
            session,
            r#"{"results":[{"original":"hello","correct":true}],"pipeline":"grammar"}"#,
        );
        assert_eq!(c.state().results.item_count(Pipeline::Grammar), 1);
        assert_eq!(c.state().pipelines.get(Pipeline::Grammar), PipelineState::Done);
        assert!(c.state().submit_enabled(Pipeline::Grammar));
    }

    #[test]
    fn server_error_clears_both_pipelines() {
        let mut c = controller();
        let s1 = c.on_user_submit(Pipeline::Grammar, "a", None).unwrap();
        c.on_connection_opened(s1);
        c.on_server_message(s1, r#"{"error":"timeout"}"#);
        assert!(!c.state().pipelines.any_busy());
        let last = c.state().log.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert_eq!(last.text, "timeout");
    }

    #[test]
    fn parse_error_changes_nothing_but_log() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "a", None).unwrap();
        c.on_connection_opened(session);
        let before = c.state().clone();
        c.on_server_message(session, "<html>");
        assert_eq!(c.state().pipelines, before.pipelines);
        assert_eq!(c.state().results, before.results);
        assert_eq!(c.state().log.len(), before.log.len() + 1);
        assert!(c.state().log.last().unwrap().text.starts_with("parse error"));
    }

    #[test]
    fn stale_session_frames_are_ignored() {
        let mut c = controller();
        let old = c.on_user_submit(Pipeline::Grammar, "first", None).unwrap();
        c.on_connection_opened(old);
        let new = c.on_user_submit(Pipeline::Consistency, "second", None).unwrap();
        assert!(c.drain_effects().contains(&Effect::Close { session: old }));
        // Superseding released the grammar request.
        assert!(c.state().submit_enabled(Pipeline::Grammar));

        let before = c.state().clone();
        c.on_server_message(old, r#"{"results":[1],"pipeline":"grammar"}"#);
        c.on_connection_closed(old, None);
        assert_eq!(c.state(), &before);
        assert!(c.current_session().is_some_and(|s| s.id == new));
    }

    #[test]
    fn close_mid_flight_releases_pipeline() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Consistency, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_connection_closed(session, Some("going away".into()));
        assert!(c.state().submit_enabled(Pipeline::Consistency));
        assert_eq!(c.state().pipelines.get(Pipeline::Consistency), PipelineState::Error);
        assert!(!c.state().connected);
        assert!(c.state().log.last().unwrap().text.contains("going away"));
    }

    #[test]
    fn timeout_only_fires_for_latest_send() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_timeout(session, 0, Duration::from_secs(30));
        assert!(c.state().pipelines.is_busy(Pipeline::Grammar));
        c.on_timeout(session, 1, Duration::from_secs(30));
        assert!(!c.state().pipelines.is_busy(Pipeline::Grammar));
        assert!(c.state().log.last().unwrap().text.contains("30s"));
    }

    #[test]
    fn timeout_after_results_is_ignored() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_server_message(session, r#"{"results":[],"pipeline":"grammar"}"#);
        c.drain_effects();
        c.on_timeout(session, 1, Duration::from_secs(30));
        assert!(c.drain_effects().is_empty());
        assert!(c.state().connected);
    }

    #[test]
    fn progress_frames_restart_the_timer() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Consistency, "x", None).unwrap();
        c.on_connection_opened(session);
        c.drain_effects();
        for i in 0..50 {
            c.on_server_message(session, &format!(r#"{{"log":"chunk {i}"}}"#));
        }
        let effects = c.drain_effects();
        assert_eq!(effects.last(), Some(&Effect::ArmTimeout { session, seq: 51 }));

        // The timer armed by the send has been overtaken by progress.
        c.on_timeout(session, 1, Duration::from_secs(300));
        assert!(c.state().pipelines.is_busy(Pipeline::Consistency));
        assert!(c.drain_effects().is_empty());

        c.on_timeout(session, 51, Duration::from_secs(300));
        assert!(!c.state().pipelines.is_busy(Pipeline::Consistency));
        assert_eq!(c.state().log.last().unwrap().text, "no response within 300s");
    }

    #[test]
    fn frames_before_any_send_do_not_arm_a_timer() {
        let mut c = controller();
        let file = FileAttachment::from_bytes("a.txt", b"hi".to_vec());
        let session = c.on_user_submit(Pipeline::Grammar, "", Some(file)).unwrap();
        c.on_connection_opened(session);
        c.drain_effects();
        c.on_server_message(session, r#"{"log":"warming up"}"#);
        assert!(c.drain_effects().is_empty());
    }

    #[test]
    fn superseded_request_is_logged() {
        let mut c = controller();
        let first = c.on_user_submit(Pipeline::Consistency, "a", None).unwrap();
        c.on_connection_opened(first);
        c.on_user_submit(Pipeline::Grammar, "b", None).unwrap();

        assert_eq!(c.state().pipelines.get(Pipeline::Consistency), PipelineState::Error);
        let errors: Vec<&str> = c
            .state()
            .log
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(errors, vec!["consistency check cancelled: superseded by a new request"]);
    }

    #[test]
    fn superseded_feedback_is_logged_and_released() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_server_message(session, r#"{"results":[],"pipeline":"grammar"}"#);
        c.on_connection_closed(session, None);
        c.submit_feedback(Pipeline::Grammar, Some(4), None).unwrap();
        assert!(c.state().feedback.submitting);

        c.on_user_submit(Pipeline::Consistency, "y", None).unwrap();
        assert!(c.state().feedback.submit_enabled());
        assert!(c
            .state()
            .log
            .iter()
            .any(|e| e.level == LogLevel::Error && e.text.starts_with("feedback cancelled")));
    }

    #[test]
    fn feedback_waits_for_connecting_request() {
        let mut c = controller();
        let first = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.on_connection_opened(first);
        c.on_server_message(first, r#"{"results":[],"pipeline":"grammar"}"#);

        let pending = c.on_user_submit(Pipeline::Consistency, "y", None).unwrap();
        c.drain_effects();
        let log_len = c.state().log.len();

        let fb = c.submit_feedback(Pipeline::Grammar, Some(5), None).unwrap();
        assert_eq!(fb, pending);
        assert!(c.drain_effects().is_empty(), "no socket yet, nothing to open or send");
        assert!(c.state().pipelines.is_busy(Pipeline::Consistency));
        assert_eq!(c.state().log.len(), log_len);

        c.on_connection_opened(pending);
        let payloads = sent_payloads(&c.drain_effects());
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["pipeline"], "consistency");
        assert_eq!(payloads[1]["action"], "feedback");
        assert_eq!(payloads[1]["pipeline"], "grammar");
    }

    #[test]
    fn second_feedback_while_submitting_is_rejected() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_server_message(session, r#"{"results":[],"pipeline":"grammar"}"#);
        c.drain_effects();

        c.submit_feedback(Pipeline::Grammar, Some(3), None).unwrap();
        let err = c.submit_feedback(Pipeline::Grammar, Some(3), None).unwrap_err();
        assert_eq!(err, ValidationError::FeedbackPending);
        assert_eq!(sent_payloads(&c.drain_effects()).len(), 1);

        c.on_server_message(session, r#"{"feedback_result":"saved"}"#);
        assert!(c.submit_feedback(Pipeline::Grammar, Some(2), None).is_ok());
    }

    #[test]
    fn feedback_without_results_is_rejected() {
        let mut c = controller();
        let err = c.submit_feedback(Pipeline::Grammar, Some(5), None).unwrap_err();
        assert_eq!(err, ValidationError::NoResults(Pipeline::Grammar));
        assert!(c.drain_effects().is_empty());
    }

    #[test]
    fn feedback_without_rating_is_rejected() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_server_message(session, r#"{"results":[],"pipeline":"grammar"}"#);
        c.drain_effects();
        let err = c.submit_feedback(Pipeline::Grammar, None, None).unwrap_err();
        assert_eq!(err, ValidationError::NoRating);
        assert!(c.drain_effects().is_empty());
    }

    #[test]
    fn feedback_reuses_open_session() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_server_message(session, r#"{"results":[{"correct":false}],"pipeline":"grammar"}"#);
        c.drain_effects();

        let fb = c.submit_feedback(Pipeline::Grammar, Some(4), Some(" nice ".into())).unwrap();
        assert_eq!(fb, session);
        let effects = c.drain_effects();
        assert!(!effects.iter().any(|e| matches!(e, Effect::Open { .. })));
        assert_eq!(
            sent_payloads(&effects),
            vec![json!({
                "action": "feedback",
                "pipeline": "grammar",
                "results": [{"correct": false}],
                "rating": 4,
                "comment": "nice"
            })]
        );
        assert!(!c.state().feedback.submit_enabled());

        c.on_server_message(session, r#"{"feedback_result":"saved"}"#);
        assert!(!c.state().feedback.open);
        assert!(c.state().feedback.submit_enabled());
    }

    #[test]
    fn feedback_opens_new_session_when_closed() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Consistency, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_server_message(session, r#"{"results":{"entities":[]}}"#);
        c.on_connection_closed(session, None);
        c.drain_effects();

        let fb = c.submit_feedback(Pipeline::Consistency, Some(2), None).unwrap();
        assert_ne!(fb, session);
        assert_eq!(c.drain_effects(), vec![Effect::Open { session: fb, url: c.url().to_string() }]);

        c.on_connection_opened(fb);
        let payloads = sent_payloads(&c.drain_effects());
        assert_eq!(payloads[0]["action"], "feedback");
        assert!(payloads[0].get("comment").is_none());
    }

    #[test]
    fn feedback_transport_failure_restores_submit() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.on_connection_opened(session);
        c.on_server_message(session, r#"{"results":[],"pipeline":"grammar"}"#);
        c.submit_feedback(Pipeline::Grammar, Some(3), None).unwrap();
        assert!(!c.state().feedback.submit_enabled());
        c.on_transport_error(session, TransportError::SendFailed("broken pipe".into()));
        assert!(c.state().feedback.submit_enabled());
        assert_eq!(c.state().log.last().unwrap().level, LogLevel::Error);
    }

    #[test]
    fn every_event_renders_once() {
        let mut c = controller();
        let start = c.view().renders;
        c.toggle_fullscreen(Panel::Log);
        c.escape();
        assert_eq!(c.view().renders, start + 2);
    }

    #[test]
    fn dispose_closes_live_session() {
        let mut c = controller();
        let session = c.on_user_submit(Pipeline::Grammar, "x", None).unwrap();
        c.drain_effects();
        c.dispose();
        assert_eq!(c.drain_effects(), vec![Effect::Close { session }]);
        assert!(c.state().submit_enabled(Pipeline::Grammar));
        assert!(!c.is_started());
    }
}
