//! Redaction of credentials from text that leaves the gateway.
//!
//! Upstream error bodies sometimes echo the request, including the bearer
//! credential. Everything that ends up in a log line or a bus response goes
//! through [`sanitize_upstream_error`] first.
//!
//! Two passes run, in order:
//! 1. Value-based: the exact credential(s) currently in use, via an
//!    Aho-Corasick automaton ([`SecretRedactor`]).
//! 2. Pattern-based: well-known key shapes (`sk-or-v1-*`, `sk-*`, `Bearer *`).

use std::borrow::Cow;
use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

/// Values shorter than this are never treated as secrets ("true", "1", ...).
const MIN_SECRET_LENGTH: usize = 8;

/// Redactor built from a known set of secret values.
///
/// Secrets are never exposed via `Debug`.
pub struct SecretRedactor {
    secrets: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl std::fmt::Debug for SecretRedactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRedactor")
            .field("secret_count", &self.secrets.len())
            .finish_non_exhaustive()
    }
}

impl SecretRedactor {
    #[must_use]
    pub fn new<'a>(secrets: impl IntoIterator<Item = &'a str>) -> Self {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(str::trim)
            .filter(|s| s.len() >= MIN_SECRET_LENGTH)
            .map(ToString::to_string)
            .collect();

        // Longest first so the fallback path never leaves a suffix of a longer secret behind.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();

        let automaton = if secrets.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostLongest)
                .build(&secrets)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::warn!(
                        secret_count = secrets.len(),
                        "SecretRedactor automaton build failed; using fallback redaction ({e})"
                    );
                    None
                }
            }
        };

        Self { secrets, automaton }
    }

    /// Returns the input with every known secret replaced by `[REDACTED]`.
    #[must_use]
    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if self.secrets.is_empty() {
            return Cow::Borrowed(input);
        }

        if let Some(ac) = &self.automaton {
            if !ac.is_match(input) {
                return Cow::Borrowed(input);
            }
            let mut result = String::with_capacity(input.len());
            ac.replace_all_with(input, &mut result, |_, _, dst| {
                dst.push_str(REDACTED);
                true
            });
            return Cow::Owned(result);
        }

        // Fail-closed fallback: sequential replacement.
        let mut output: Option<String> = None;
        for secret in &self.secrets {
            let haystack = output.as_deref().unwrap_or(input);
            if haystack.contains(secret.as_str()) {
                output = Some(haystack.replace(secret.as_str(), REDACTED));
            }
        }
        output.map_or(Cow::Borrowed(input), Cow::Owned)
    }
}

struct PatternRedactor {
    bearer: Regex,
    openrouter_key: Regex,
    openai_key: Regex,
}

impl PatternRedactor {
    fn new() -> Self {
        Self {
            bearer: Regex::new(r"(?i)\b(bearer)\s+[A-Za-z0-9._~+/=-]{8,}")
                .expect("valid bearer regex"),
            openrouter_key: Regex::new(r"\bsk-or-[A-Za-z0-9_-]{8,}").expect("valid sk-or regex"),
            openai_key: Regex::new(r"\bsk-[A-Za-z0-9_-]{8,}").expect("valid sk regex"),
        }
    }

    fn redact(&self, raw: &str) -> String {
        let out = self.bearer.replace_all(raw, "$1 [REDACTED]");
        let out = self.openrouter_key.replace_all(&out, "sk-or-***");
        // `sk-or-***` no longer matches the generic shape (needs 8+ key chars).
        self.openai_key.replace_all(&out, "sk-***").into_owned()
    }
}

static PATTERN_REDACTOR: OnceLock<PatternRedactor> = OnceLock::new();

fn pattern_redactor() -> &'static PatternRedactor {
    PATTERN_REDACTOR.get_or_init(PatternRedactor::new)
}

/// Redact well-known API key shapes from a string.
#[must_use]
pub fn redact_api_keys(raw: &str) -> String {
    pattern_redactor().redact(raw)
}

/// Trim and redact upstream error text before it is logged or returned to a caller.
#[must_use]
pub fn sanitize_upstream_error(raw: &str, redactor: &SecretRedactor) -> String {
    let value_redacted = redactor.redact(raw.trim());
    redact_api_keys(&value_redacted)
}
