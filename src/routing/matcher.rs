//! Route pattern compilation and matching.
//!
//! # Responsibilities
//! - Turn a `"{METHOD} {PATH}"` template into an anchored regular expression
//! - Treat every character literally except `*`, which matches any run of characters
//! - Full-string match against a dispatch key
//!
//! # Design Decisions
//! - Escape first, then widen the escaped `*`, so no other metacharacter leaks through
//! - Wildcards are unanchored internally: `*` may span `/` and `?`

use regex::Regex;

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    regex: Regex,
}

impl RoutePattern {
    /// Compile a route template such as `GET /run?file=*.py`.
    pub fn compile(template: &str) -> Result<Self, regex::Error> {
        let escaped = regex::escape(template);
        let widened = escaped.replace(r"\*", ".*");
        let regex = Regex::new(&format!("^{}$", widened))?;

        Ok(Self {
            template: template.to_string(),
            regex,
        })
    }

    /// Returns true if the whole dispatch key matches this pattern.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_is_full_match() {
        let pattern = RoutePattern::compile("GET /files").unwrap();
        assert!(pattern.matches("GET /files"));
        assert!(!pattern.matches("GET /files/a.py"));
        assert!(!pattern.matches("XGET /files"));
        assert!(!pattern.matches("get /files")); // method is case-sensitive
        assert!(!pattern.matches("POST /files"));
    }

    #[test]
    fn metacharacters_are_literal() {
        let pattern = RoutePattern::compile("GET /run?file=a.py").unwrap();
        assert!(pattern.matches("GET /run?file=a.py"));
        assert!(!pattern.matches("GET /rufile=a.py"));
        assert!(!pattern.matches("GET /run?file=aXpy"));

        let brackets = RoutePattern::compile("GET /(x)[y]+{z}|$^").unwrap();
        assert!(brackets.matches("GET /(x)[y]+{z}|$^"));
    }

    #[test]
    fn wildcard_matches_zero_or_more_characters() {
        let pattern = RoutePattern::compile("GET /run?file=*.py").unwrap();
        assert!(pattern.matches("GET /run?file=a.py"));
        assert!(pattern.matches("GET /run?file=.py"));
        assert!(pattern.matches("GET /run?file=dir/nested name.py"));
        assert!(!pattern.matches("GET /run?file=a.txt"));
        assert!(!pattern.matches("GET /run?file=a.py.bak"));
    }

    #[test]
    fn several_wildcards() {
        let pattern = RoutePattern::compile("* /files/*").unwrap();
        assert!(pattern.matches("DELETE /files/a.py"));
        assert!(pattern.matches("GET /files/"));
        assert!(!pattern.matches("GET /files"));
        assert_eq!(pattern.template(), "* /files/*");
    }
}
