//! Connection bookkeeping: which session is current and what it is waiting to
//! send.
//!
//! The manager never touches a socket. It hands out [`SessionId`]s and tracks
//! `Connecting → Open → Closed`; the runtime performs the actual I/O and
//! reports back with the id, so late events from a superseded session can be
//! recognised and dropped.

use uuid::Uuid;

use crate::encoder::PendingRequest;
use crate::protocol::{FeedbackRequest, Pipeline};

/// Identity of one connection lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The first block is enough to tell sessions apart in logs.
        let s = self.0.to_string();
        write!(f, "{}", &s[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Open,
    /// Terminal.
    Closed,
}

/// Work queued until the socket opens.
#[derive(Debug, Clone, PartialEq)]
pub enum Queued {
    Request(PendingRequest),
    Feedback(FeedbackRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    /// Pipeline whose request rides on this session.
    pub in_flight: Option<Pipeline>,
    /// Whether a feedback submission rides on this session.
    pub carries_feedback: bool,
    /// Sent in order once the socket opens.
    pub queued: Vec<Queued>,
}

impl Session {
    fn new(queued: Queued) -> Self {
        let (in_flight, carries_feedback) = match &queued {
            Queued::Request(req) => (Some(req.pipeline), false),
            Queued::Feedback(_) => (None, true),
        };
        Session {
            id: SessionId::new(),
            status: SessionStatus::Connecting,
            in_flight,
            carries_feedback,
            queued: vec![queued],
        }
    }

    /// Queue feedback behind whatever this session is still waiting to send.
    pub fn queue_feedback(&mut self, request: FeedbackRequest) {
        self.carries_feedback = true;
        self.queued.push(Queued::Feedback(request));
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

/// Owns the single current session.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    current: Option<Session>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        ConnectionManager { current: None }
    }

    /// Start a new session, closing any prior live one first.
    ///
    /// Returns the new id and the superseded session, if there was one that
    /// was not already closed.
    pub fn open(&mut self, queued: Queued) -> (SessionId, Option<Session>) {
        let superseded = self.current.take().filter(|s| s.status != SessionStatus::Closed);
        let session = Session::new(queued);
        let id = session.id;
        self.current = Some(session);
        (id, superseded)
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// The current session if it has not closed, whatever its id.
    pub fn current_mut(&mut self) -> Option<&mut Session> {
        self.current.as_mut().filter(|s| s.status != SessionStatus::Closed)
    }

    /// The current session, if `id` names it and it has not closed.
    pub fn live_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.current
            .as_mut()
            .filter(|s| s.id == id && s.status != SessionStatus::Closed)
    }

    /// `Connecting → Open`. Returns the work queued for this session.
    pub fn mark_open(&mut self, id: SessionId) -> Option<Vec<Queued>> {
        let session = self.live_mut(id)?;
        session.status = SessionStatus::Open;
        Some(std::mem::take(&mut session.queued))
    }

    /// Move the session to `Closed`. Returns a snapshot of it as it was, or
    /// `None` if `id` is stale or already closed.
    pub fn close(&mut self, id: SessionId) -> Option<Session> {
        let session = self.live_mut(id)?;
        let snapshot = session.clone();
        session.status = SessionStatus::Closed;
        session.queued.clear();
        session.in_flight = None;
        session.carries_feedback = false;
        Some(snapshot)
    }

    /// Close whatever is current. Used on dispose.
    pub fn close_current(&mut self) -> Option<Session> {
        let id = self.current.as_ref()?.id;
        self.close(id)
    }
}
