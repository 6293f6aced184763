//! # Runtime
//!
//! ## Responsibility
//! Drives a [`Controller`] on one tokio task: every user action, socket
//! event, file-encode completion and timer expiry arrives as an [`Event`] on
//! a single channel, is applied to the controller, and the resulting
//! [`Effect`]s are executed.
//!
//! ## Design
//! - One reader/writer task per socket (`tokio-tungstenite`), multiplexed with
//!   `tokio::select!`; it reports `Opened` / `Frame` / `Closed` / `Failed`.
//! - Closing a session drops its outbound sender, which ends the socket task
//!   quietly.
//! - File encoding and reply timers are spawned tasks whose results come back
//!   through the same channel, so the controller is never touched
//!   concurrently.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use crate::controller::{Controller, Effect, View, ViewState};
use crate::encoder::{encode_request, FileAttachment};
use crate::error::{ClientError, TransportError};
use crate::protocol::{AnalyzeRequest, Pipeline};
use crate::session::SessionId;
use crate::state::Panel;

/// Everything the driver reacts to.
#[derive(Debug)]
pub enum Event {
    Submit { pipeline: Pipeline, text: String, file: Option<FileAttachment> },
    Feedback { pipeline: Pipeline, rating: Option<u8>, comment: Option<String> },
    OpenFeedback(Pipeline),
    CloseFeedback,
    ToggleFullscreen(Panel),
    Escape,
    Opened(SessionId),
    Frame(SessionId, String),
    Closed(SessionId, Option<String>),
    Failed(SessionId, TransportError),
    FileEncoded(SessionId, Result<AnalyzeRequest, TransportError>),
    TimedOut { session: SessionId, seq: u64 },
    Shutdown,
}

/// Cloneable sender for feeding events into a [`Driver`] from other tasks.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl DriverHandle {
    /// Queue an event. Returns `false` once the driver is gone.
    pub fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.send(Event::Shutdown)
    }
}

pub struct Driver<V: View> {
    controller: Controller<V>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    sockets: HashMap<SessionId, mpsc::UnboundedSender<String>>,
    request_timeout: Option<Duration>,
}

impl<V: View> Driver<V> {
    /// Wrap `controller`, starting it if needed. Must be called inside a
    /// tokio runtime.
    pub fn new(mut controller: Controller<V>, request_timeout: Option<Duration>) -> Self {
        if !controller.is_started() {
            controller.start();
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Driver {
            controller,
            events_tx,
            events_rx,
            sockets: HashMap::new(),
            request_timeout,
        }
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle { tx: self.events_tx.clone() }
    }

    pub fn controller(&self) -> &Controller<V> {
        &self.controller
    }

    pub fn state(&self) -> &ViewState {
        self.controller.state()
    }

    /// Submit a request and start its I/O.
    ///
    /// Unlike [`Event::Submit`], a rejection is returned to the caller as well
    /// as logged.
    pub fn submit(
        &mut self,
        pipeline: Pipeline,
        text: &str,
        file: Option<FileAttachment>,
    ) -> Result<SessionId, ClientError> {
        let session = self.controller.on_user_submit(pipeline, text, file)?;
        self.execute();
        Ok(session)
    }

    /// Submit feedback for the cached `pipeline` results.
    pub fn submit_feedback(
        &mut self,
        pipeline: Pipeline,
        rating: Option<u8>,
        comment: Option<String>,
    ) -> Result<SessionId, ClientError> {
        let session = self.controller.submit_feedback(pipeline, rating, comment)?;
        self.execute();
        Ok(session)
    }

    /// Apply one event and execute what it asked for. Returns `false` after
    /// [`Event::Shutdown`].
    pub fn apply(&mut self, event: Event) -> bool {
        let keep_running = self.dispatch(event);
        self.execute();
        keep_running
    }

    fn dispatch(&mut self, event: Event) -> bool {
        let c = &mut self.controller;
        match event {
            Event::Submit { pipeline, text, file } => {
                // Rejections are already logged into the view.
                let _ = c.on_user_submit(pipeline, &text, file);
            }
            Event::Feedback { pipeline, rating, comment } => {
                let _ = c.submit_feedback(pipeline, rating, comment);
            }
            Event::OpenFeedback(pipeline) => c.open_feedback(pipeline),
            Event::CloseFeedback => c.close_feedback(),
            Event::ToggleFullscreen(panel) => c.toggle_fullscreen(panel),
            Event::Escape => c.escape(),
            Event::Opened(session) => c.on_connection_opened(session),
            Event::Frame(session, text) => c.on_server_message(session, &text),
            Event::Closed(session, reason) => {
                self.sockets.remove(&session);
                c.on_connection_closed(session, reason);
            }
            Event::Failed(session, err) => {
                self.sockets.remove(&session);
                c.on_transport_error(session, err);
            }
            Event::FileEncoded(session, encoded) => c.on_file_encoded(session, encoded),
            Event::TimedOut { session, seq } => {
                c.on_timeout(session, seq, self.request_timeout.unwrap_or_default());
            }
            Event::Shutdown => {
                c.dispose();
                return false;
            }
        }
        true
    }

    /// Wait for the next event and apply it.
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.apply(event),
            None => false,
        }
    }

    /// Process events until `done` holds for the view state. Returns `false`
    /// if the driver shut down first.
    pub async fn run_until(&mut self, mut done: impl FnMut(&ViewState) -> bool) -> bool {
        while !done(self.controller.state()) {
            if !self.process_next().await {
                return false;
            }
        }
        true
    }

    /// Process events until [`Event::Shutdown`], then hand the controller back.
    pub async fn run(mut self) -> Controller<V> {
        while self.process_next().await {}
        self.controller
    }

    /// Dispose the controller, close every socket, and hand it back.
    pub fn finish(mut self) -> Controller<V> {
        self.apply(Event::Shutdown);
        self.sockets.clear();
        self.controller
    }

    fn execute(&mut self) {
        for effect in self.controller.drain_effects() {
            match effect {
                Effect::Open { session, url } => {
                    let (out_tx, out_rx) = mpsc::unbounded_channel();
                    self.sockets.insert(session, out_tx);
                    tokio::spawn(socket_task(session, url, out_rx, self.events_tx.clone()));
                }
                Effect::EncodeFile { session, request } => {
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        let encoded = encode_request(request).await;
                        let _ = events.send(Event::FileEncoded(session, encoded));
                    });
                }
                Effect::Send { session, payload } => {
                    let delivered = self
                        .sockets
                        .get(&session)
                        .is_some_and(|tx| tx.send(payload).is_ok());
                    if !delivered {
                        let _ = self.events_tx.send(Event::Failed(
                            session,
                            TransportError::SendFailed("socket is not open".to_string()),
                        ));
                    }
                }
                Effect::ArmTimeout { session, seq } => {
                    if let Some(after) = self.request_timeout {
                        let events = self.events_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(after).await;
                            let _ = events.send(Event::TimedOut { session, seq });
                        });
                    }
                }
                Effect::Close { session } => {
                    if self.sockets.remove(&session).is_some() {
                        debug!(%session, "socket released");
                    }
                }
            }
        }
    }
}

/// Own one socket: connect, then pump outbound frames and inbound events
/// until either side ends.
async fn socket_task(
    session: SessionId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<Event>,
) {
    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!(%session, %url, error = %e, "connect failed");
            let _ = events.send(Event::Failed(
                session,
                TransportError::ConnectFailed { url, detail: e.to_string() },
            ));
            return;
        }
    };
    let _ = events.send(Event::Opened(session));

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            out = outbound.recv() => {
                match out {
                    Some(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            let _ = events.send(Event::Failed(
                                session,
                                TransportError::SendFailed(e.to_string()),
                            ));
                            break;
                        }
                    }
                    // The driver released this session.
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = events.send(Event::Frame(session, text));
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = frame
                            .filter(|f| !f.reason.is_empty())
                            .map(|f| f.reason.to_string());
                        let _ = events.send(Event::Closed(session, reason));
                        break;
                    }
                    Some(Ok(_)) => {} // binary / ping / pong
                    Some(Err(e)) => {
                        let _ = events.send(Event::Failed(
                            session,
                            TransportError::Disconnected(e.to_string()),
                        ));
                        break;
                    }
                    None => {
                        let _ = events.send(Event::Closed(session, None));
                        break;
                    }
                }
            }
        }
    }
}
