//! Chat client for a text proofreading backend.
//!
//! Submissions (text and/or a base64-encoded document) go to one of two
//! server pipelines, `consistency` or `grammar`, over a WebSocket. The server
//! streams back log lines and finally a result set, which the user can rate.
//!
//! The [`controller::Controller`] is the whole client state machine and does
//! no I/O: it consumes events and emits [`controller::Effect`]s. The
//! [`runtime::Driver`] executes those effects with tokio-tungstenite, and
//! [`render::TerminalView`] draws the state.

pub mod cli;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod protocol;
pub mod render;
pub mod runtime;
pub mod session;
pub mod state;

pub use controller::{Controller, Effect, NullView, View, ViewState};
pub use error::{ClientError, ConfigError, ProtocolError, TransportError, ValidationError};
pub use protocol::{Pipeline, ServerMessage};
pub use runtime::{Driver, DriverHandle, Event};
