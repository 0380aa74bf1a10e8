//! Recovery of a string list from model output that was asked to be a JSON array.
//!
//! Models are not always compliant: the array may be fenced in markdown,
//! wrapped in prose, followed by a bonus remark, or missing entirely in favour
//! of a bulleted list. Strategies run in order and the first one that yields a
//! non-empty list wins:
//!
//! 1. [`Strategy::FencedBlock`]: the interior of a ```` ``` ```` / ```` ```json ```` fence,
//!    control characters stripped, parsed strictly.
//! 2. [`Strategy::BalancedArray`]: the first bracket-balanced `[...]` slice that
//!    parses after light repair; later slices are tried when an earlier one is
//!    not an array. Non-empty text after it becomes one extra item.
//! 3. [`Strategy::TrailingText`]: a bracketed region exists but is not a valid
//!    array; the text after the last `]` is the single item.
//! 4. [`Strategy::LineHeuristic`]: bullet/quote-prefixed lines.
//!
//! Nothing here panics; exhaustion is a [`ParseFailure`].

use std::sync::OnceLock;

use glimpse_types::ParsedSummary;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::markdown::normalize_emphasis;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not recover a list of items from the model response ({input_chars} chars)")]
pub struct ParseFailure {
    input_chars: usize,
}

impl ParseFailure {
    fn for_input(raw: &str) -> Self {
        Self {
            input_chars: raw.chars().count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FencedBlock,
    BalancedArray,
    TrailingText,
    LineHeuristic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub summary: ParsedSummary,
    pub strategy: Strategy,
}

/// Recover and normalize a list of items from raw model text.
pub fn parse_summary(raw: &str) -> Result<ParsedSummary, ParseFailure> {
    let recovered = recover(raw)?;
    let normalized = recovered
        .summary
        .into_items()
        .into_iter()
        .map(|item| normalize_emphasis(&item));
    ParsedSummary::from_items(normalized).ok_or_else(|| ParseFailure::for_input(raw))
}

/// Run the recovery strategies without the emphasis normalization pass.
pub fn recover(raw: &str) -> Result<Recovered, ParseFailure> {
    let found = |summary: Option<ParsedSummary>, strategy| {
        summary.map(|summary| Recovered { summary, strategy })
    };

    if let Some(recovered) = found(from_fenced_block(raw), Strategy::FencedBlock) {
        return Ok(recovered);
    }

    // A bracketed slice that is not an array (a markdown link, say) does not
    // hide a real array after it.
    let mut search_from = 0;
    while let Some((start, end)) = balanced_array_bounds(raw, search_from) {
        let summary = from_balanced_array(raw, start, end);
        if let Some(recovered) = found(summary, Strategy::BalancedArray) {
            return Ok(recovered);
        }
        search_from = end + 1;
    }

    if let Some(recovered) = found(from_trailing_text(raw), Strategy::TrailingText) {
        return Ok(recovered);
    }

    let lines = heuristic_items(raw);
    if let Some(summary) = ParsedSummary::from_items(lines) {
        tracing::warn!(
            items = summary.items().len(),
            had_brackets = raw.contains('['),
            "Model output fell through to the line heuristic"
        );
        return Ok(Recovered {
            summary,
            strategy: Strategy::LineHeuristic,
        });
    }

    tracing::debug!(chars = raw.chars().count(), "No list recoverable from model output");
    Err(ParseFailure::for_input(raw))
}

fn from_fenced_block(raw: &str) -> Option<ParsedSummary> {
    let interior = fenced_interior(raw)?;
    let cleaned: String = interior.chars().filter(|c| !c.is_control()).collect();
    let values: Vec<Value> = serde_json::from_str(cleaned.trim()).ok()?;
    ParsedSummary::from_items(items_from_values(values))
}

/// The text between the first fence (after an optional `json` tag) and the
/// next fence, or the end of input when the fence is never closed.
fn fenced_interior(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after = &raw[start + 3..];
    let after = after
        .strip_prefix("json")
        .or_else(|| after.strip_prefix("JSON"))
        .unwrap_or(after);
    let end = after.find("```").unwrap_or(after.len());
    Some(&after[..end])
}

fn from_balanced_array(raw: &str, start: usize, end: usize) -> Option<ParsedSummary> {
    let repaired = repair_json(&raw[start..=end]);
    let values: Vec<Value> = serde_json::from_str(&repaired).ok()?;
    let mut items = items_from_values(values);

    let trailing = clean_trailing(&raw[end + 1..]);
    if !trailing.is_empty() {
        items.push(trailing.to_string());
    }
    ParsedSummary::from_items(items)
}

fn from_trailing_text(raw: &str) -> Option<ParsedSummary> {
    let last_close = raw.rfind(']')?;
    let trailing = clean_trailing(&raw[last_close + 1..]);
    if trailing.is_empty() {
        return None;
    }
    ParsedSummary::from_items([trailing.to_string()])
}

/// Byte bounds (inclusive) of the first bracket-balanced `[...]` slice
/// starting at or after byte `from`.
///
/// Brackets inside JSON string literals are ignored.
fn balanced_array_bounds(text: &str, from: usize) -> Option<(usize, usize)> {
    let start = from + text.get(from..)?.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '[' if !in_string => depth += 1,
            ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset));
                }
            }
            _ => {}
        }
    }

    None
}

fn trailing_comma_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r",\s*\]").expect("valid trailing comma regex"))
}

/// Fix the JSON mistakes models actually make: smart quotes, trailing commas,
/// and raw control characters inside strings.
fn repair_json(candidate: &str) -> String {
    let replaced: String = candidate
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    trailing_comma_pattern()
        .replace_all(&replaced, "]")
        .into_owned()
}

/// Text after a closing bracket, minus closers left over from an enclosing
/// object (`{"items": [...]}`) and fence markers.
fn clean_trailing(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '}' | ']' | ','))
        .trim_matches(|c: char| c.is_whitespace() || c == '`')
}

fn items_from_values(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect()
}

/// Lines that look like list entries: a leading quote, `*`, `-`, or a `**` bold label.
fn heuristic_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = if line.starts_with("**") {
                line
            } else if let Some(rest) = line.strip_prefix('"') {
                rest
            } else if let Some(rest) = line.strip_prefix('*').or_else(|| line.strip_prefix('-')) {
                rest
            } else {
                return None;
            };

            let cleaned = rest.trim().trim_end_matches([',', '"']).trim_end();
            let is_rule = cleaned.chars().all(|c| matches!(c, '-' | '*' | '_'));
            (!cleaned.is_empty() && !is_rule).then(|| cleaned.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Strategy, balanced_array_bounds, parse_summary, recover, repair_json};

    fn items(raw: &str) -> Vec<String> {
        parse_summary(raw).expect("recoverable").into_items()
    }

    #[test]
    fn fenced_json_block() {
        let raw = "```json\n[\"a\",\"b\"]\n```";
        assert_eq!(items(raw), ["a", "b"]);
        assert_eq!(recover(raw).unwrap().strategy, Strategy::FencedBlock);
    }

    #[test]
    fn untagged_fence_with_prose_around_it() {
        let raw = "Here you go:\n```\n[\"one\", \"two\"]\n```\nHope that helps";
        assert_eq!(items(raw), ["one", "two"]);
    }

    #[test]
    fn trailing_prose_becomes_extra_item() {
        assert_eq!(items("[\"a\"] bonus remark"), ["a", "bonus remark"]);
        assert_eq!(
            recover("[\"a\"] bonus remark").unwrap().strategy,
            Strategy::BalancedArray
        );
    }

    #[test]
    fn leading_prose_is_ignored() {
        assert_eq!(items("Sure! [\"x\", \"y\"]"), ["x", "y"]);
    }

    #[test]
    fn nested_arrays_and_brackets_in_strings() {
        let raw = "[\"see [1]\", \"b\"] end";
        assert_eq!(balanced_array_bounds(raw, 0), Some((0, 15)));
        assert_eq!(balanced_array_bounds(raw, 1), Some((6, 8)));
        assert_eq!(items(raw), ["see [1]", "b", "end"]);
    }

    #[test]
    fn object_wrapped_array_leaves_no_closing_brace_item() {
        let raw = "```json\n{\"items\": [\"a\", \"b\"]}\n```";
        assert_eq!(items(raw), ["a", "b"]);
        assert_eq!(recover(raw).unwrap().strategy, Strategy::BalancedArray);

        let with_remark = "{\"items\": [\"a\"]}\nHope this helps";
        assert_eq!(items(with_remark), ["a", "Hope this helps"]);
    }

    #[test]
    fn non_array_brackets_before_the_array_are_skipped() {
        let raw = "[Source](https://x.example) says:\n[\"a\", \"b\"]";
        assert_eq!(items(raw), ["a", "b"]);
        assert_eq!(recover(raw).unwrap().strategy, Strategy::BalancedArray);
    }

    #[test]
    fn repairs_trailing_commas_and_smart_quotes() {
        assert_eq!(repair_json("[\u{201C}a\u{201D}, ]"), "[\"a\"]");
        assert_eq!(items("[\u{201C}a\u{201D}, \"b\",\n]"), ["a", "b"]);
    }

    #[test]
    fn non_string_elements_are_rendered() {
        assert_eq!(items("[1, \"two\", null, true]"), ["1", "two", "true"]);
    }

    #[test]
    fn invalid_array_with_trailing_text_uses_trailing_text() {
        let raw = "[not json at all] but this part is useful";
        let recovered = recover(raw).unwrap();
        assert_eq!(recovered.strategy, Strategy::TrailingText);
        assert_eq!(recovered.summary.items(), ["but this part is useful"]);
    }

    #[test]
    fn line_heuristic_for_bullets() {
        let raw = "* First point\n* Second point";
        assert_eq!(items(raw), ["First point", "Second point"]);
        assert_eq!(recover(raw).unwrap().strategy, Strategy::LineHeuristic);
    }

    #[test]
    fn line_heuristic_strips_quotes_commas_and_rules() {
        let raw = "Intro text\n\"alpha\",\n- beta\n---\n**Key:** gamma";
        assert_eq!(items(raw), ["alpha", "beta", "**Key:** gamma"]);
    }

    #[test]
    fn empty_and_markerless_input_fail() {
        assert!(parse_summary("").is_err());
        assert!(parse_summary("no useful content").is_err());
        assert!(parse_summary("[]").is_err());
        assert!(parse_summary("[\"\", \"  \"]").is_err());
    }

    #[test]
    fn normalization_applies_after_recovery() {
        let parsed = items("[\"*Key Finding:* text\", \"Summary: more\"]");
        assert!(parsed[0].starts_with("**Key Finding:**"));
        assert_eq!(parsed[1], "**Summary:** more");
    }
}
