//! Decoding of the streamed response body
//!
//! The service writes independent JSON objects back to back with no
//! delimiter, so each read is split heuristically at `}{` boundaries and
//! every candidate is parsed on its own. A candidate that fails to parse is
//! dropped without affecting its neighbours. All framing knowledge lives in
//! [`split_candidates`].

use crate::{
    api::ByteStream,
    error::Result,
    types::{StreamOutcome, StreamUpdate, ToolCall},
};
use futures::StreamExt;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Textual `\uXXXX` escapes left inside already-decoded message strings
static UNICODE_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\\u([0-9a-f]{4})").unwrap());

const REPLACEMENT: char = '\u{FFFD}';

/// Split decoded text into candidate JSON objects.
///
/// A boundary is a `}` followed by optional whitespace and then `{`; the
/// braces stay with their objects and the whitespace is discarded. Note this
/// also splits inside string values that happen to contain `}{`.
pub fn split_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut start = 0;

    for (i, _) in text.match_indices('}') {
        let rest = text[i + 1..].trim_start();
        if rest.starts_with('{') {
            candidates.push(&text[start..=i]);
            start = text.len() - rest.len();
        }
    }

    candidates.push(&text[start..]);
    candidates
}

/// Replace textual `\uXXXX` escapes with the characters they name.
///
/// Adjacent high/low surrogate escapes combine into one character; an
/// unpaired surrogate becomes U+FFFD.
pub fn unescape_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut pending_high: Option<u16> = None;

    for caps in UNICODE_ESCAPE.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        let Ok(unit) = u16::from_str_radix(&caps[1], 16) else {
            continue;
        };

        if let Some(high) = pending_high.take() {
            if m.start() == last && (0xDC00..=0xDFFF).contains(&unit) {
                let code = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                out.push(char::from_u32(code).unwrap_or(REPLACEMENT));
                last = m.end();
                continue;
            }
            out.push(REPLACEMENT);
        }

        out.push_str(&text[last..m.start()]);
        last = m.end();

        match unit {
            0xD800..=0xDBFF => pending_high = Some(unit),
            0xDC00..=0xDFFF => out.push(REPLACEMENT),
            _ => out.push(char::from_u32(u32::from(unit)).unwrap_or(REPLACEMENT)),
        }
    }

    if pending_high.is_some() {
        out.push(REPLACEMENT);
    }
    out.push_str(&text[last..]);
    out
}

/// Remove `key` from a decoded object and convert it, skipping a value of the wrong shape
fn take_field<T: DeserializeOwned>(object: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = object.remove(key)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::trace!(field = key, error = %e, "skipping malformed stream field");
            None
        }
    }
}

/// Accumulates decoded objects into a [`StreamUpdate`].
///
/// The callback runs once for each applied field, in the order message,
/// tool_calls, citations.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    state: StreamUpdate,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one raw read from the response body.
    ///
    /// Each read is decoded on its own; invalid UTF-8 becomes U+FFFD.
    pub fn feed<F>(&mut self, bytes: &[u8], on_update: &mut F)
    where
        F: FnMut(&StreamUpdate),
    {
        let text = String::from_utf8_lossy(bytes);
        self.feed_text(&text, on_update);
    }

    /// Process already-decoded text
    pub fn feed_text<F>(&mut self, text: &str, on_update: &mut F)
    where
        F: FnMut(&StreamUpdate),
    {
        for candidate in split_candidates(text) {
            match serde_json::from_str::<Map<String, Value>>(candidate) {
                Ok(object) => self.apply(object, on_update),
                Err(e) => {
                    tracing::trace!(error = %e, candidate, "dropping undecodable stream candidate");
                }
            }
        }
    }

    /// Each known field is checked on its own; other keys are ignored
    fn apply<F>(&mut self, mut object: Map<String, Value>, on_update: &mut F)
    where
        F: FnMut(&StreamUpdate),
    {
        if let Some(message) = take_field::<String>(&mut object, "message") {
            self.state.message.push_str(&unescape_unicode(&message));
            on_update(&self.state);
        }
        if let Some(tool_calls) = take_field::<Vec<ToolCall>>(&mut object, "tool_calls") {
            self.state.tool_calls.extend(tool_calls);
            on_update(&self.state);
        }
        if let Some(citations) = take_field::<Vec<String>>(&mut object, "citations") {
            self.state.citations = citations;
            on_update(&self.state);
        }
    }

    /// Current accumulated state
    pub fn state(&self) -> &StreamUpdate {
        &self.state
    }

    /// Finish decoding and keep only the returned parts
    pub fn finish(self) -> StreamOutcome {
        StreamOutcome {
            message: self.state.message,
            citations: self.state.citations,
        }
    }
}

/// Read a response body to the end through a fresh [`ChunkDecoder`].
///
/// The stream is consumed, so it is released on every exit path including
/// a read error part way through.
pub async fn drain<F>(mut stream: ByteStream, on_update: &mut F) -> Result<StreamOutcome>
where
    F: FnMut(&StreamUpdate),
{
    let mut decoder = ChunkDecoder::new();
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        decoder.feed(&bytes, on_update);
    }
    Ok(decoder.finish())
}
