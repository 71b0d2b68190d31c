use regex::{Regex, RegexBuilder};

use crate::error::ConfigError;

/// In-process match or substitution.
///
/// Expressions are written `m/pattern/flags` or `s/pattern/replacement/flags`
/// with any non-alphanumeric delimiter; anything else is a bare match
/// pattern. Flags are `i`, `m`, `s`, `x` (as in the `regex` crate) and `g`
/// (replace every occurrence rather than the first).
///
/// A match returns the concatenated capture groups, or the whole match when
/// the pattern has no groups. No match returns the payload unchanged.
/// Replacements may refer to groups as `$1`, `${name}` or `\1`.
#[derive(Debug, Clone)]
pub struct PatternBackend {
    expression: String,
    regex: Regex,
    replacement: Option<String>,
    global: bool,
}

struct Parsed {
    pattern: String,
    replacement: Option<String>,
    flags: String,
}

impl PatternBackend {
    /// Compiles an expression.
    pub fn compile(expression: &str) -> Result<Self, ConfigError> {
        let bad = |reason: String| ConfigError::BadPattern {
            pattern: expression.to_string(),
            reason,
        };

        let parsed = parse_expression(expression).unwrap_or_else(|| Parsed {
            pattern: expression.to_string(),
            replacement: None,
            flags: String::new(),
        });
        if parsed.pattern.is_empty() {
            return Err(bad("empty pattern".to_string()));
        }

        let mut builder = RegexBuilder::new(&parsed.pattern);
        let mut global = false;
        for flag in parsed.flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                'g' => global = true,
                other => return Err(bad(format!("unknown flag '{}'", other))),
            }
        }
        let regex = builder.build().map_err(|e| bad(e.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            regex,
            replacement: parsed.replacement.map(|r| backrefs_to_dollars(&r)),
            global,
        })
    }

    /// Returns the expression as configured.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns true for `s///` expressions.
    pub fn is_substitution(&self) -> bool {
        self.replacement.is_some()
    }

    /// Runs the expression against `payload`.
    pub fn apply(&self, payload: &str) -> String {
        if let Some(replacement) = &self.replacement {
            let replaced = if self.global {
                self.regex.replace_all(payload, replacement.as_str())
            } else {
                self.regex.replace(payload, replacement.as_str())
            };
            return replaced.into_owned();
        }

        let Some(captures) = self.regex.captures(payload) else {
            return payload.to_string();
        };
        if captures.len() == 1 {
            return captures
                .get(0)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
        }
        captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .collect()
    }
}

/// Splits `m/p/f` or `s/p/r/f`; `None` means treat the input as a bare pattern.
fn parse_expression(expression: &str) -> Option<Parsed> {
    let mut chars = expression.chars();
    let op = chars.next()?;
    let delimiter = chars.next()?;
    if !matches!(op, 'm' | 's') || delimiter.is_alphanumeric() || delimiter.is_whitespace() || delimiter == '\\' {
        return None;
    }

    let parts = split_delimited(chars.as_str(), delimiter);
    match (op, parts.as_slice()) {
        ('m', [pattern, flags]) => Some(Parsed {
            pattern: pattern.clone(),
            replacement: None,
            flags: flags.clone(),
        }),
        ('s', [pattern, replacement, flags]) => Some(Parsed {
            pattern: pattern.clone(),
            replacement: Some(replacement.clone()),
            flags: flags.clone(),
        }),
        _ => None,
    }
}

/// Splits on unescaped `delimiter`. An escaped delimiter loses its backslash
/// unless the delimiter is itself a regex metacharacter.
fn split_delimited(body: &str, delimiter: char) -> Vec<String> {
    let keep_escape = regex::escape(&delimiter.to_string()).len() > delimiter.len_utf8();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&delimiter) {
            if keep_escape {
                current.push('\\');
            }
            current.push(delimiter);
            chars.next();
        } else if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == delimiter {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// Rewrites `\1` style group references as `${1}`.
fn backrefs_to_dollars(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('\\', Some(d)) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    group.push(*d);
                    chars.next();
                }
                out.push_str("${");
                out.push_str(&group);
                out.push('}');
            }
            ('\\', Some(_)) => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push(c),
        }
    }
    out
}
