//! Glob patterns over canonical CRI literals, used by session authorization.

use conduit_core::Cri;
use regex::Regex;

/// Errors compiling a CRI pattern.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid CRI pattern {pattern}: {message}")]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

/// A compiled CRI pattern.
///
/// `*` matches within one path segment, `**` matches any remainder; all
/// other characters match literally against the canonical CRI literal.
/// Compilation happens once at construction.
#[derive(Debug, Clone)]
pub struct CriPattern {
    pattern: String,
    regex: Regex,
}

impl CriPattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push('^');
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '*' {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    translated.push_str(".*");
                } else {
                    translated.push_str("[^/]*");
                }
            } else {
                translated.push_str(&regex::escape(&c.to_string()));
            }
        }
        translated.push('$');

        let regex = Regex::new(&translated).map_err(|e| PatternError {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn matches(&self, cri: &Cri) -> bool {
        self.regex.is_match(&cri.to_string())
    }
}
