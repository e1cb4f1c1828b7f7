//! Noise filter for visible narration.
//!
//! Streams interleave prose with transport envelopes, token accounting and
//! index-prefixed fragments. Only prose may reach the transcript.

use crate::constants::{METADATA_FIELD_NAMES, TOOL_NAMES};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref TAG_ENVELOPE: Regex =
        Regex::new(r"^[A-Za-z]{1,16}:\s*\{").expect("Invalid envelope regex");
    static ref INDEX_MARKER: Regex = Regex::new(r"^\d+:").expect("Invalid index marker regex");
}

/// Decides whether a line is user-facing prose.
pub trait NarrationFilter: Send + Sync {
    fn is_narration_line(&self, line: &str) -> bool;
}

impl<F> NarrationFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_narration_line(&self, line: &str) -> bool {
        self(line)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNoiseFilter;

impl NarrationFilter for DefaultNoiseFilter {
    fn is_narration_line(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }
        if TAG_ENVELOPE.is_match(trimmed) || INDEX_MARKER.is_match(trimmed) {
            return false;
        }
        if METADATA_FIELD_NAMES
            .iter()
            .chain(TOOL_NAMES)
            .any(|name| trimmed.contains(name))
        {
            return false;
        }
        !matches!(
            serde_json::from_str::<Value>(trimmed),
            Ok(Value::Object(_)) | Ok(Value::Array(_))
        )
    }
}

/// Keeps prose lines only, trimmed.
pub fn filter<'a, I>(filter: &dyn NarrationFilter, lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter(|line| filter.is_narration_line(line))
        .map(|line| line.trim().to_string())
        .collect()
}

/// Joins retained prose with single spaces.
pub fn join_narration(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prose_is_kept() {
        let f = DefaultNoiseFilter;
        assert!(f.is_narration_line("Here is the invoice you asked for."));
        assert!(f.is_narration_line("  Totals: see the panel  "));
        assert!(f.is_narration_line("Use {braces} sparingly"));
    }

    #[test]
    fn test_metadata_lines_are_dropped() {
        let f = DefaultNoiseFilter;
        assert!(!f.is_narration_line("   "));
        assert!(!f.is_narration_line(r#"d:{"finishReason":"stop"}"#));
        assert!(!f.is_narration_line(r#"tool: {"name":"getInvoice"}"#));
        assert!(!f.is_narration_line(r#"0:"Hello""#));
        assert!(!f.is_narration_line("12:partial fragment"));
        assert!(!f.is_narration_line("usage promptTokens=12 completionTokens=40"));
        assert!(!f.is_narration_line("calling toolName getInvoiceByIdFromApi"));
        assert!(!f.is_narration_line(r#"{"Id":"1"}"#));
        assert!(!f.is_narration_line("[1, 2, 3]"));
    }

    #[test]
    fn test_bare_tool_name_lines_are_dropped() {
        let f = DefaultNoiseFilter;
        assert!(!f.is_narration_line("getTop5InvoicesFromApi"));
        assert!(!f.is_narration_line("  sendInvoicePdfFromApi()"));
        assert!(f.is_narration_line("Your top five invoices are in the panel."));
    }

    #[test]
    fn test_filter_and_join() {
        let lines = vec![
            "Let me check.",
            r#"9:{"toolCallId":"c1","toolName":"getInvoiceByIdFromApi"}"#,
            "",
            "   Done.  ",
            r#"e:{"finishReason":"tool-calls","usage":{"promptTokens":1}}"#,
        ];
        let kept = filter(&DefaultNoiseFilter, lines);
        assert_eq!(kept, vec!["Let me check.", "Done."]);
        assert_eq!(join_narration(&kept), "Let me check. Done.");
    }

    #[test]
    fn test_custom_predicate_plugs_in() {
        let only_questions = |line: &str| line.trim_end().ends_with('?');
        let kept = filter(&only_questions, vec!["Anything else?", "No."]);
        assert_eq!(kept, vec!["Anything else?"]);
    }
}
