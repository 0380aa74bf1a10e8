//! Output recovery on realistic model responses.

use glimpse_core::{Strategy, parse_summary, recover};

#[test]
fn fenced_json_array() {
    let summary = parse_summary("```json\n[\"a\",\"b\"]\n```").unwrap();
    assert_eq!(summary.items(), ["a", "b"]);
}

#[test]
fn array_followed_by_remark() {
    let summary = parse_summary("[\"a\"] bonus remark").unwrap();
    assert_eq!(summary.items(), ["a", "bonus remark"]);
}

#[test]
fn bulleted_fallback() {
    let raw = "* First point\n* Second point";
    let summary = parse_summary(raw).unwrap();
    assert_eq!(summary.items(), ["First point", "Second point"]);
    assert_eq!(recover(raw).unwrap().strategy, Strategy::LineHeuristic);
}

#[test]
fn nothing_recoverable() {
    assert!(parse_summary("").is_err());
    assert!(parse_summary("The page could not be summarized.").is_err());
}

#[test]
fn emphasis_is_normalized() {
    let summary = parse_summary("[\"*Key Finding:* text\"]").unwrap();
    assert!(summary.items()[0].starts_with("**Key Finding:**"));
}

#[test]
fn multiline_items_with_labels() {
    let raw = "```\n[\"Pros: fast\\nCons: young ecosystem\", \"See https://example.com\"]\n```";
    let summary = parse_summary(raw).unwrap();
    assert_eq!(
        summary.items(),
        [
            "**Pros:** fast\n**Cons:** young ecosystem",
            "See https://example.com"
        ]
    );
}
