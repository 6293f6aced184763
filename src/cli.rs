use std::path::PathBuf;

use clap::Parser;

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::protocol::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "textcheck")]
#[command(version)]
#[command(about = "Send text or a document to a consistency/grammar checking backend")]
pub struct Args {
    /// Text to check (may be empty when --file is given)
    #[arg(default_value = "")]
    pub text: String,

    /// Processing pipeline: consistency or grammar
    #[arg(long, short, value_enum)]
    pub pipeline: Option<Pipeline>,

    /// Document to attach (sent base64-encoded)
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// Backend host[:port]
    #[arg(long)]
    pub host: Option<String>,

    /// Connect with wss instead of ws
    #[arg(long)]
    pub secure: bool,

    /// Seconds to wait for a reply (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Path to a toml config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Prompt for a rating and comment once results arrive
    #[arg(long)]
    pub feedback: bool,

    /// Print the results panel in full once it arrives
    #[arg(long)]
    pub expand: bool,
}

impl Args {
    /// Load the config file (if any) and layer the flags over it.
    pub fn resolve_config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if self.secure {
            config.secure = true;
        }
        if let Some(secs) = self.timeout {
            config.request_timeout_secs = secs;
        }
        if let Some(pipeline) = self.pipeline {
            config.default_pipeline = pipeline;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Parse a rating typed at the feedback prompt. Blank input means "no rating".
pub fn parse_rating(input: &str) -> Option<u8> {
    input.trim().parse::<u8>().ok()
}
