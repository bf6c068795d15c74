//! Terminal rendering of streamed replies

use potpie_chat::{StreamOutcome, StreamUpdate, ToolCall};
use std::io::Write;

/// Prints each update's new text, so the reply appears as it streams.
///
/// Reply text goes to `out`; tool activity and citations go to `err`.
pub struct Renderer<O: Write, E: Write> {
    out: O,
    err: E,
    printed: String,
    tool_calls_seen: usize,
}

impl Renderer<std::io::Stdout, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdout(), std::io::stderr())
    }
}

impl<O: Write, E: Write> Renderer<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            printed: String::new(),
            tool_calls_seen: 0,
        }
    }

    pub fn update(&mut self, update: &StreamUpdate) {
        // A retry starts a fresh accumulator
        if !update.message.starts_with(&self.printed) {
            let _ = writeln!(self.out);
            self.printed.clear();
        }
        let fresh = &update.message[self.printed.len()..];
        if !fresh.is_empty() {
            let _ = write!(self.out, "{}", fresh);
            let _ = self.out.flush();
            self.printed.push_str(fresh);
        }

        if update.tool_calls.len() < self.tool_calls_seen {
            self.tool_calls_seen = 0;
        }
        for call in &update.tool_calls[self.tool_calls_seen..] {
            let _ = writeln!(self.err, "[tool] {}", describe(call));
        }
        self.tool_calls_seen = update.tool_calls.len();
    }

    pub fn finish(&mut self, outcome: &StreamOutcome) {
        if !self.printed.is_empty() && !self.printed.ends_with('\n') {
            let _ = writeln!(self.out);
        }
        if !outcome.citations.is_empty() {
            let _ = writeln!(self.err, "Citations:");
            for citation in &outcome.citations {
                let _ = writeln!(self.err, "  {}", citation);
            }
        }
        let _ = self.out.flush();
    }
}

fn describe(call: &ToolCall) -> String {
    let name = call.tool_name.as_deref().unwrap_or("tool");
    let mut line = match call.event_type.as_deref() {
        Some(event) => format!("{} ({})", name, event),
        None => name.to_string(),
    };
    if let Some(first) = call
        .tool_response
        .as_deref()
        .and_then(|r| r.lines().next())
        .filter(|l| !l.trim().is_empty())
    {
        line.push_str(": ");
        line.push_str(first);
    }
    line
}
