//! Wildcard allow/deny rules.
//!
//! A rule is either an exact name or a glob using `*` (any run of characters)
//! and `?` (one character). Each rule is compiled once into an anchored,
//! case-insensitive regex and reused on every poll.

use regex::{Regex, RegexBuilder};

use super::ForegroundTarget;
use crate::error::ValidationError;

#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    regex: Regex,
}

impl WildcardPattern {
    pub fn compile(pattern: &str) -> Result<Self, ValidationError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidPattern {
                pattern: pattern.to_string(),
                message: "pattern is empty".into(),
            });
        }

        let mut expr = String::with_capacity(trimmed.len() + 8);
        expr.push('^');
        for ch in trimmed.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');

        let regex = RegexBuilder::new(&expr)
            .case_insensitive(true)
            .build()
            .map_err(|e| ValidationError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            source: trimmed.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// Match against the target's app name, its URL, or the URL's host.
    pub fn matches_target(&self, target: &ForegroundTarget) -> bool {
        if self.matches(&target.name) {
            return true;
        }
        let Some(url) = target.url.as_deref() else {
            return false;
        };
        self.matches(url) || target.host().is_some_and(|host| self.matches(&host))
    }
}

/// An ordered set of rules; duplicates (ignoring case) are collapsed.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<WildcardPattern>,
}

impl PatternList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sources<I, S>(sources: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for source in sources {
            list.add(source.as_ref())?;
        }
        Ok(list)
    }

    /// Returns `false` when an equivalent rule was already present.
    pub fn add(&mut self, pattern: &str) -> Result<bool, ValidationError> {
        let compiled = WildcardPattern::compile(pattern)?;
        if self.position(compiled.source()).is_some() {
            return Ok(false);
        }
        self.patterns.push(compiled);
        Ok(true)
    }

    pub fn remove(&mut self, pattern: &str) -> bool {
        match self.position(pattern.trim()) {
            Some(idx) => {
                self.patterns.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn find_match(&self, target: &ForegroundTarget) -> Option<&WildcardPattern> {
        self.patterns.iter().find(|p| p.matches_target(target))
    }

    pub fn matches(&self, target: &ForegroundTarget) -> bool {
        self.find_match(target).is_some()
    }

    pub fn sources(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.source.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn position(&self, source: &str) -> Option<usize> {
        self.patterns
            .iter()
            .position(|p| p.source.eq_ignore_ascii_case(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::TargetKind;

    fn app(name: &str) -> ForegroundTarget {
        ForegroundTarget::app(name, None)
    }

    #[test]
    fn exact_match_is_case_insensitive_and_anchored() {
        let p = WildcardPattern::compile("Slack").unwrap();
        assert!(p.matches("slack"));
        assert!(p.matches("SLACK"));
        assert!(!p.matches("Slack Helper"));
        assert!(!p.matches("NotSlack"));
    }

    #[test]
    fn star_and_question_mark() {
        let star = WildcardPattern::compile("*tube*").unwrap();
        assert!(star.matches("YouTube"));
        assert!(star.matches("tube"));
        assert!(!star.matches("tub"));

        let q = WildcardPattern::compile("app?").unwrap();
        assert!(q.matches("app1"));
        assert!(!q.matches("app"));
        assert!(!q.matches("app12"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = WildcardPattern::compile("Code.exe (x86)").unwrap();
        assert!(p.matches("code.exe (x86)"));
        assert!(!p.matches("CodeXexe (x86)"));
    }

    #[test]
    fn empty_pattern_rejected() {
        assert!(WildcardPattern::compile("   ").is_err());
    }

    #[test]
    fn matches_url_and_host() {
        let p = WildcardPattern::compile("*.reddit.com").unwrap();
        let site = ForegroundTarget {
            kind: TargetKind::Website,
            name: "Firefox".into(),
            title: Some("front page".into()),
            url: Some("https://www.reddit.com/r/rust".into()),
        };
        assert!(p.matches_target(&site));
        assert!(!p.matches_target(&app("Firefox")));
    }

    #[test]
    fn list_dedupes_and_removes() {
        let mut list = PatternList::from_sources(["Code", "Terminal"]).unwrap();
        assert!(!list.add("code").unwrap());
        assert_eq!(list.len(), 2);
        assert!(list.matches(&app("CODE")));

        assert!(list.remove("CODE"));
        assert!(!list.remove("Code"));
        assert!(!list.matches(&app("Code")));
        assert_eq!(list.sources(), vec!["Terminal".to_string()]);
    }
}
