//! Focus enforcement: foreground probing, allow/deny rules, the grace
//! countdown and the distraction log.

mod distraction;
mod guard;
mod pattern;
mod probe;

pub use distraction::{DistractionKind, DistractionLog, DistractionLogEntry, InMemoryDistractionLog};
pub use guard::{FocusGuard, GraceCountdown, PollOutcome};
pub use pattern::{PatternList, WildcardPattern};
pub use probe::{CommandProbe, ForegroundProbe, ScriptedProbe};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    App,
    Website,
}

/// Whatever currently has the user's attention according to the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundTarget {
    pub kind: TargetKind,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ForegroundTarget {
    pub fn app(name: impl Into<String>, title: Option<String>) -> Self {
        Self {
            kind: TargetKind::App,
            name: name.into(),
            title,
            url: None,
        }
    }

    pub fn website(browser: impl Into<String>, url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            kind: TargetKind::Website,
            name: browser.into(),
            title,
            url: Some(url.into()),
        }
    }

    /// Host part of the URL, if there is a parseable one.
    pub fn host(&self) -> Option<String> {
        let raw = self.url.as_deref()?;
        url::Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_from_url() {
        let site = ForegroundTarget::website("Chrome", "https://news.ycombinator.com/item?id=1", None);
        assert_eq!(site.host().as_deref(), Some("news.ycombinator.com"));
        assert_eq!(site.kind, TargetKind::Website);

        let bad = ForegroundTarget::website("Chrome", "not a url", None);
        assert!(bad.host().is_none());
        assert!(ForegroundTarget::app("Code", None).host().is_none());
    }
}
