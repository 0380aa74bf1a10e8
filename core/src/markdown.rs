//! Bold-label normalization for recovered list items.
//!
//! Models mix `*Label:*`, `***Label:***`, `*Label*:` and bare `Label:` for the
//! same thing. Downstream rendering expects `**Label:**`.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Labels at or above this many characters are left alone.
const MAX_LABEL_CHARS: usize = 50;

struct LabelPatterns {
    /// `*Label:*` / `***Label:***`
    colon_inside: Regex,
    /// `*Label*:` / `***Label***:`
    colon_outside: Regex,
}

fn label_patterns() -> &'static LabelPatterns {
    static PATTERNS: OnceLock<LabelPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| LabelPatterns {
        colon_inside: Regex::new(r"^(?:\*\*\*|\*)([^*\n:]{1,49}):(?:\*\*\*|\*)")
            .expect("valid label regex"),
        colon_outside: Regex::new(r"^(?:\*\*\*|\*)([^*\n:]{1,49})(?:\*\*\*|\*):")
            .expect("valid label regex"),
    })
}

/// Normalize every line of an item.
#[must_use]
pub fn normalize_emphasis(item: &str) -> String {
    if !item.contains(':') {
        return item.to_string();
    }
    item.lines()
        .map(normalize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_line(line: &str) -> Cow<'_, str> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let patterns = label_patterns();

    for pattern in [&patterns.colon_inside, &patterns.colon_outside] {
        if let Some(caps) = pattern.captures(body) {
            let label = caps[1].trim();
            if label.is_empty() {
                continue;
            }
            let rest = &body[caps[0].len()..];
            return Cow::Owned(format!("{indent}**{label}:**{rest}"));
        }
    }

    if body.contains('*') {
        return Cow::Borrowed(line);
    }

    let Some((label, rest)) = body.split_once(':') else {
        return Cow::Borrowed(line);
    };
    let label = label.trim();
    // `https://...` is not a label.
    if label.is_empty() || label.chars().count() >= MAX_LABEL_CHARS || rest.starts_with("//") {
        return Cow::Borrowed(line);
    }
    Cow::Owned(format!("{indent}**{label}:**{rest}"))
}
