//! Chunk buffer and payload scanner.
//!
//! The buffer accumulates decoded text for one turn. Scanning splits it into
//! line-like segments and looks for a `{ ... }` span that decodes as JSON.
//! A span that does not decode yet is a truncated object still in flight, so
//! the scan reports "not complete" and the caller waits for more chunks.

use crate::types::{InterpreterError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::ops::Range;

lazy_static! {
    /// `}` followed by an inline `tag:` prefix with no newline in between.
    static ref INLINE_TAG_BOUNDARY: Regex =
        Regex::new(r"^([^\S\n]*)\w+:").expect("Invalid boundary regex");
    /// `}` directly followed by another object on the same line.
    static ref ADJACENT_OBJECT: Regex =
        Regex::new(r"^([^\S\n]*)\{").expect("Invalid adjacent object regex");
}

/// A line-like slice of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    /// Where the following segment begins (past the delimiter).
    pub next: usize,
    /// False for the trailing segment, which may still grow.
    pub terminated: bool,
}

impl Segment {
    pub fn text<'a>(&self, buffer: &'a str) -> &'a str {
        &buffer[self.start..self.end]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub segment: Segment,
    pub span: Range<usize>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub complete: bool,
    pub payload: Option<Candidate>,
    pub consumed_up_to: Option<usize>,
    /// Start of the first segment that is still open. Everything before it
    /// has been looked at and will not change.
    pub open_from: usize,
}

/// Splits on newlines, and right after a `}` that is followed on the same
/// line by a bare `identifier:` tag or by another `{`.
pub fn split_segments(buffer: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut seg_start = 0;

    for (i, ch) in buffer.char_indices() {
        if i < seg_start {
            continue;
        }
        match ch {
            '\n' => {
                segments.push(Segment {
                    start: seg_start,
                    end: i,
                    next: i + 1,
                    terminated: true,
                });
                seg_start = i + 1;
            }
            '}' => {
                let rest = &buffer[i + 1..];
                let boundary = INLINE_TAG_BOUNDARY
                    .captures(rest)
                    .or_else(|| ADJACENT_OBJECT.captures(rest));
                if let Some(caps) = boundary {
                    let gap = caps.get(1).map_or(0, |m| m.len());
                    segments.push(Segment {
                        start: seg_start,
                        end: i + 1,
                        next: i + 1 + gap,
                        terminated: true,
                    });
                    seg_start = i + 1 + gap;
                }
            }
            _ => {}
        }
    }

    if seg_start < buffer.len() {
        segments.push(Segment {
            start: seg_start,
            end: buffer.len(),
            next: buffer.len(),
            terminated: false,
        });
    }

    segments
}

/// Detects whether a span has balanced braces and brackets outside strings.
pub fn is_balanced(json_str: &str) -> bool {
    let trimmed = json_str.trim();
    if trimmed.is_empty() {
        return false;
    }

    let mut brace_count = 0i32;
    let mut bracket_count = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in trimmed.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => brace_count += 1,
            '}' if !in_string => brace_count -= 1,
            '[' if !in_string => bracket_count += 1,
            ']' if !in_string => bracket_count -= 1,
            _ => {}
        }

        if brace_count < 0 || bracket_count < 0 {
            return false;
        }
    }

    !in_string && brace_count == 0 && bracket_count == 0
}

/// Locates the first `{` and last `}` of a segment.
pub fn candidate_span(segment_text: &str) -> Option<Range<usize>> {
    let open = segment_text.find('{')?;
    let close = segment_text.rfind('}')?;
    if close > open {
        Some(open..close + 1)
    } else {
        None
    }
}

pub fn decode_candidate(span_text: &str) -> Result<Value> {
    if !is_balanced(span_text) {
        return Err(InterpreterError::MalformedPayload("unbalanced span".to_string()).into());
    }
    let value = serde_json::from_str::<Value>(span_text)
        .map_err(|e| InterpreterError::MalformedPayload(e.to_string()))?;
    Ok(value)
}

/// Returns the first segment whose candidate span decodes.
pub fn scan(buffer: &str) -> ScanOutcome {
    let segments = split_segments(buffer);
    let open_from = segments
        .iter()
        .find(|s| !s.terminated)
        .map_or(buffer.len(), |s| s.start);

    for segment in segments {
        let text = segment.text(buffer);
        let span = match candidate_span(text) {
            Some(span) => span,
            None => continue,
        };
        let abs = segment.start + span.start..segment.start + span.end;
        match decode_candidate(&buffer[abs.clone()]) {
            Ok(value) => {
                return ScanOutcome {
                    complete: true,
                    payload: Some(Candidate {
                        segment,
                        span: abs,
                        value,
                    }),
                    consumed_up_to: Some(segment.next),
                    open_from,
                };
            }
            Err(e) => {
                tracing::trace!(
                    "[SCAN] Candidate at {}..{} not decodable yet: {}",
                    abs.start,
                    abs.end,
                    e.inner
                );
            }
        }
    }

    ScanOutcome {
        complete: false,
        payload: None,
        consumed_up_to: None,
        open_from,
    }
}

/// Text received so far for the current turn.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    text: String,
    /// Prefix already scanned without a hit; its segments are settled.
    settled: usize,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Scans the unsettled part of the buffer. Offsets in the outcome are
    /// relative to the whole buffer.
    pub fn scan(&mut self) -> ScanOutcome {
        let base = self.settled;
        let mut outcome = scan(&self.text[base..]);
        outcome.open_from += base;
        if let Some(candidate) = outcome.payload.as_mut() {
            candidate.segment.start += base;
            candidate.segment.end += base;
            candidate.segment.next += base;
            candidate.span = candidate.span.start + base..candidate.span.end + base;
        }
        if let Some(up_to) = outcome.consumed_up_to.as_mut() {
            *up_to += base;
        }
        if !outcome.complete {
            self.settled = outcome.open_from;
        }
        outcome
    }

    /// Drops `up_to` leading bytes and hands them back.
    pub fn consume(&mut self, up_to: usize) -> String {
        let up_to = up_to.min(self.text.len());
        let head: String = self.text.drain(..up_to).collect();
        self.settled = self.settled.saturating_sub(up_to);
        head
    }

    /// Drops every settled segment, keeping only the open tail.
    pub fn consume_settled(&mut self) -> String {
        let settled = self.settled;
        self.consume(settled)
    }

    pub fn take_all(&mut self) -> String {
        self.settled = 0;
        std::mem::take(&mut self.text)
    }
}
