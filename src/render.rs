//! Terminal [`View`]: prints new log lines and result panels as they change.

use std::collections::HashMap;
use std::io::Write;

use colored::*;
use serde_json::Value;

use crate::controller::{View, ViewState};
use crate::protocol::Pipeline;
use crate::state::{LogEntry, LogLevel, Panel};

/// Format one result item as a single line.
///
/// Grammar items (`{correct, original_text|original, content, reason}`) get a
/// verdict mark; anything else is printed as compact JSON.
pub fn format_result_item(item: &Value) -> String {
    let Some(obj) = item.as_object() else {
        return match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    };
    let Some(correct) = obj.get("correct").and_then(Value::as_bool) else {
        return item.to_string();
    };
    let original = obj
        .get("original_text")
        .or_else(|| obj.get("original"))
        .and_then(Value::as_str)
        .unwrap_or("");
    if correct {
        return format!("[ok] {original}");
    }
    let mut line = format!("[fix] {original}");
    if let Some(content) = obj.get("content").and_then(Value::as_str) {
        line.push_str(&format!(" -> {content}"));
    }
    if let Some(reason) = obj.get("reason").and_then(Value::as_str) {
        line.push_str(&format!(" ({reason})"));
    }
    line
}

/// Lines for a result panel.
pub fn format_results(results: &Value) -> Vec<String> {
    match results {
        Value::Array(items) => items.iter().map(format_result_item).collect(),
        Value::Null => Vec::new(),
        other => vec![format_result_item(other)],
    }
}

fn paint(entry: &LogEntry) -> String {
    match entry.level {
        LogLevel::Info => format!("{} {}", "·".dimmed(), entry.text),
        LogLevel::User => format!("{} {}", ">".cyan().bold(), entry.text.cyan()),
        LogLevel::Error => format!("{} {}", "!".red().bold(), entry.text.red()),
    }
}

fn panel_title(panel: Panel) -> &'static str {
    match panel {
        Panel::Log => "log",
        Panel::ConsistencyResults => "consistency results",
        Panel::GrammarResults => "grammar results",
    }
}

/// Incremental terminal renderer over any writer.
pub struct TerminalView<W: Write> {
    out: W,
    printed_log: usize,
    shown_results: HashMap<Pipeline, Value>,
    shown_fullscreen: Option<Panel>,
}

impl TerminalView<std::io::Stdout> {
    pub fn stdout() -> Self {
        TerminalView::new(std::io::stdout())
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        TerminalView {
            out,
            printed_log: 0,
            shown_results: HashMap::new(),
            shown_fullscreen: None,
        }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    fn draw(&mut self, state: &ViewState) -> std::io::Result<()> {
        for entry in state.log.iter().skip(self.printed_log) {
            writeln!(self.out, "{}", paint(entry))?;
        }
        self.printed_log = state.log.len();

        for pipeline in Pipeline::ALL {
            let Some(results) = state.results.get(pipeline) else { continue };
            if self.shown_results.get(&pipeline) == Some(results) {
                continue;
            }
            self.draw_results(pipeline, results)?;
            self.shown_results.insert(pipeline, results.clone());
        }

        let expanded = state.fullscreen.expanded();
        if expanded != self.shown_fullscreen {
            if let Some(panel) = expanded {
                self.draw_fullscreen(panel, state)?;
            }
            self.shown_fullscreen = expanded;
        }
        self.out.flush()
    }

    fn draw_results(&mut self, pipeline: Pipeline, results: &Value) -> std::io::Result<()> {
        let lines = format_results(results);
        writeln!(
            self.out,
            "{}",
            format!("── {pipeline} results ({}) ──", lines.len()).bold()
        )?;
        for line in lines {
            writeln!(self.out, "  {line}")?;
        }
        Ok(())
    }

    fn draw_fullscreen(&mut self, panel: Panel, state: &ViewState) -> std::io::Result<()> {
        let title = format!("══ {} ══", panel_title(panel));
        writeln!(self.out, "{}", title.bold().reversed())?;
        match panel {
            Panel::Log => {
                for entry in &state.log {
                    writeln!(self.out, "{}", paint(entry))?;
                }
            }
            Panel::ConsistencyResults | Panel::GrammarResults => {
                let pipeline = match panel {
                    Panel::GrammarResults => Pipeline::Grammar,
                    _ => Pipeline::Consistency,
                };
                let pretty = state
                    .results
                    .get(pipeline)
                    .and_then(|v| serde_json::to_string_pretty(v).ok())
                    .unwrap_or_else(|| "(no results yet)".to_string());
                writeln!(self.out, "{pretty}")?;
            }
        }
        Ok(())
    }
}

impl<W: Write> View for TerminalView<W> {
    fn render(&mut self, state: &ViewState) {
        // A broken stdout must not take the controller down.
        if let Err(e) = self.draw(state) {
            tracing::debug!(error = %e, "terminal render failed");
        }
    }
}
