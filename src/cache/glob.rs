//! Glob patterns for cache key inspection and invalidation.
//!
//! Matching follows Redis `SCAN MATCH` / `KEYS` semantics so a pattern selects
//! the same keys whichever store is behind the cache:
//!
//! - `*` matches any sequence, including the empty one
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` and `[^a]` match one character from (or outside) a class
//! - `\x` matches `x` literally
//!
//! Patterns are anchored: they must match the whole stored key. An unclosed
//! `[` is taken literally.

use regex::Regex;

use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let source = pattern.into();
        let translated = translate(&source);
        let regex = Regex::new(&translated).map_err(|e| {
            Error::input_with_context(
                format!("invalid cache key pattern '{}'", source),
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("glob_pattern"),
            )
        })?;
        Ok(Self { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

fn escape_char(c: char) -> String {
    regex::escape(c.encode_utf8(&mut [0u8; 4]))
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push_str(".*");
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '\\' if i + 1 < chars.len() => {
                out.push_str(&escape_char(chars[i + 1]));
                i += 2;
            }
            '[' => match translate_class(&chars, i + 1) {
                Some((class, next)) => {
                    out.push_str(&class);
                    i = next;
                }
                None => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            c => {
                out.push_str(&escape_char(c));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

/// Translate a `[...]` class whose body starts at `start`. Returns the regex
/// class and the index just past the closing `]`.
fn translate_class(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut j = start;
    let mut negated = false;
    if chars.get(j) == Some(&'^') {
        negated = true;
        j += 1;
    }

    let mut body = String::new();
    while j < chars.len() {
        match chars[j] {
            '\\' if j + 1 < chars.len() => {
                body.push_str(&escape_char(chars[j + 1]));
                j += 2;
            }
            ']' => {
                if body.is_empty() {
                    return None;
                }
                let mut class = String::from("[");
                if negated {
                    class.push('^');
                }
                class.push_str(&body);
                class.push(']');
                return Some((class, j + 1));
            }
            '-' if !body.is_empty() && chars.get(j + 1).map_or(false, |c| *c != ']') => {
                body.push('-');
                j += 1;
            }
            c => {
                body.push_str(&escape_char(c));
                j += 1;
            }
        }
    }
    None
}
