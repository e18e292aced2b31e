//! Outcome and state assertions
//!
//! Every check is a bounded poll over DOM state. A check that runs out of
//! time fails the scenario; there are no retries.

use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::{ERROR_ALERT, ERROR_MESSAGE, SUCCESS_ALERT, SUCCESS_MESSAGE};
use crate::error::{E2eError, E2eResult};
use crate::page::BrowserPage;
use crate::wait::poll_until;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Error,
}

impl OutcomeKind {
    fn alert(&self) -> &'static str {
        match self {
            OutcomeKind::Success => SUCCESS_ALERT,
            OutcomeKind::Error => ERROR_ALERT,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            OutcomeKind::Success => SUCCESS_MESSAGE,
            OutcomeKind::Error => ERROR_MESSAGE,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success => f.write_str("success"),
            OutcomeKind::Error => f.write_str("error"),
        }
    }
}

/// Observed result of one user-facing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Success(String),
    Error(String),
    Timeout,
}

impl ActionResult {
    pub fn kind(&self) -> Option<OutcomeKind> {
        match self {
            ActionResult::Success(_) => Some(OutcomeKind::Success),
            ActionResult::Error(_) => Some(OutcomeKind::Error),
            ActionResult::Timeout => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ActionResult::Success(m) | ActionResult::Error(m) => Some(m),
            ActionResult::Timeout => None,
        }
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionResult::Success(m) => write!(f, "success banner {m:?}"),
            ActionResult::Error(m) => write!(f, "error banner {m:?}"),
            ActionResult::Timeout => f.write_str("no banner"),
        }
    }
}

/// Substring expectation on rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TextMatchRepr")]
pub struct TextMatch {
    pub needle: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

/// Scenario files may give a bare string for a case-sensitive match.
#[derive(Deserialize)]
#[serde(untagged)]
enum TextMatchRepr {
    Plain(String),
    Full {
        needle: String,
        #[serde(default)]
        case_insensitive: bool,
    },
}

impl From<TextMatchRepr> for TextMatch {
    fn from(repr: TextMatchRepr) -> Self {
        match repr {
            TextMatchRepr::Plain(needle) => TextMatch::exact(needle),
            TextMatchRepr::Full {
                needle,
                case_insensitive,
            } => TextMatch {
                needle,
                case_insensitive,
            },
        }
    }
}

impl TextMatch {
    pub fn exact(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            case_insensitive: false,
        }
    }

    pub fn ignore_case(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            case_insensitive: true,
        }
    }

    pub fn matches(&self, haystack: &str) -> bool {
        if self.case_insensitive {
            haystack.to_lowercase().contains(&self.needle.to_lowercase())
        } else {
            haystack.contains(&self.needle)
        }
    }

    pub fn map_needle(&self, f: impl FnOnce(&str) -> String) -> Self {
        Self {
            needle: f(&self.needle),
            case_insensitive: self.case_insensitive,
        }
    }
}

async fn banner_text<P: BrowserPage + ?Sized>(page: &P, kind: OutcomeKind) -> E2eResult<String> {
    let text = match page.text_content(kind.message()).await? {
        Some(text) => text,
        None => page.text_content(kind.alert()).await?.unwrap_or_default(),
    };
    Ok(text.trim().to_string())
}

/// Text of the `kind` banner when it is showing.
async fn visible_banner<P: BrowserPage + ?Sized>(page: &P, kind: OutcomeKind) -> E2eResult<Option<String>> {
    if !page.is_visible(kind.alert()).await? {
        return Ok(None);
    }
    banner_text(page, kind).await.map(Some)
}

/// Banners showing before an action. Only a banner that appears afterwards,
/// or whose text changes, is credited to that action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BannerSnapshot {
    success: Option<String>,
    error: Option<String>,
}

impl BannerSnapshot {
    /// No banner showing, e.g. right after a page load.
    pub fn empty() -> Self {
        Self::default()
    }

    pub async fn capture<P: BrowserPage + ?Sized>(page: &P) -> E2eResult<Self> {
        Ok(Self {
            success: visible_banner(page, OutcomeKind::Success).await?,
            error: visible_banner(page, OutcomeKind::Error).await?,
        })
    }

    fn shown(&self, kind: OutcomeKind) -> Option<&str> {
        match kind {
            OutcomeKind::Success => self.success.as_deref(),
            OutcomeKind::Error => self.error.as_deref(),
        }
    }

    fn is_fresh(&self, kind: OutcomeKind, text: &str) -> bool {
        self.shown(kind) != Some(text)
    }
}

async fn fresh_banner<P: BrowserPage + ?Sized>(
    page: &P,
    before: &BannerSnapshot,
    kind: OutcomeKind,
) -> E2eResult<Option<String>> {
    Ok(visible_banner(page, kind)
        .await?
        .filter(|text| before.is_fresh(kind, text)))
}

/// Wait for a banner that was not already showing in `before` and classify
/// it. An error banner wins over a success banner that appeared alongside.
pub async fn observe_outcome<P: BrowserPage + ?Sized>(
    page: &P,
    before: &BannerSnapshot,
    timeout: Duration,
) -> E2eResult<ActionResult> {
    let observed = poll_until("outcome banner", timeout, || async move {
        if let Some(text) = fresh_banner(page, before, OutcomeKind::Error).await? {
            return Ok(Some(ActionResult::Error(text)));
        }
        if let Some(text) = fresh_banner(page, before, OutcomeKind::Success).await? {
            return Ok(Some(ActionResult::Success(text)));
        }
        Ok(None)
    })
    .await;

    match observed {
        Ok(result) => {
            debug!("Observed {}", result);
            Ok(result)
        }
        Err(e) if e.is_timeout() => Ok(ActionResult::Timeout),
        Err(e) => Err(e),
    }
}

/// Require a fresh banner of `kind`, optionally containing `contains`.
/// Returns the banner text. The opposite banner appearing first is a
/// mismatch.
pub async fn expect_outcome<P: BrowserPage + ?Sized>(
    page: &P,
    kind: OutcomeKind,
    contains: Option<&TextMatch>,
    before: &BannerSnapshot,
    timeout: Duration,
) -> E2eResult<String> {
    let observed = observe_outcome(page, before, timeout).await?;

    let message = match observed {
        ActionResult::Timeout => {
            return Err(E2eError::timeout(format!("{kind} banner"), timeout));
        }
        ref other if other.kind() != Some(kind) => {
            return Err(E2eError::AssertionMismatch {
                expected: format!("{kind} banner"),
                observed: other.to_string(),
            });
        }
        ActionResult::Success(m) | ActionResult::Error(m) => m,
    };

    if let Some(expected) = contains {
        if !expected.matches(&message) {
            return Err(E2eError::AssertionMismatch {
                expected: format!("{kind} message containing {:?}", expected.needle),
                observed: format!("{message:?}"),
            });
        }
    }

    Ok(message)
}

/// Wait until the page URL matches `pattern`. Returns the matching URL.
pub async fn expect_redirect<P: BrowserPage + ?Sized>(
    page: &P,
    pattern: &Regex,
    timeout: Duration,
) -> E2eResult<String> {
    let waited = poll_until("redirect", timeout, || async move {
        let url = page.url().await?;
        Ok(pattern.is_match(&url).then_some(url))
    })
    .await;

    match waited {
        Ok(url) => Ok(url),
        Err(e) if e.is_timeout() => Err(E2eError::RedirectTimeout {
            pattern: pattern.as_str().to_string(),
            url: page.url().await?,
            timeout_ms: timeout.as_millis() as u64,
        }),
        Err(e) => Err(e),
    }
}

/// Immediate check that the page is still where it should be, e.g. after a
/// rejected login.
pub async fn expect_current_url<P: BrowserPage + ?Sized>(page: &P, pattern: &Regex) -> E2eResult<()> {
    let url = page.url().await?;
    if pattern.is_match(&url) {
        Ok(())
    } else {
        Err(E2eError::AssertionMismatch {
            expected: format!("url matching /{}/", pattern.as_str()),
            observed: url,
        })
    }
}

pub async fn expect_visible<P: BrowserPage + ?Sized>(page: &P, selector: &str, timeout: Duration) -> E2eResult<()> {
    poll_until(&format!("{selector} to be visible"), timeout, || async move {
        Ok(page.is_visible(selector).await?.then_some(()))
    })
    .await
}

/// Wait until the first match of `selector` contains `expected`.
pub async fn expect_text_contains<P: BrowserPage + ?Sized>(
    page: &P,
    selector: &str,
    expected: &TextMatch,
    timeout: Duration,
) -> E2eResult<()> {
    let waited = poll_until(&format!("text of {selector}"), timeout, || async move {
        let text = page.text_content(selector).await?.unwrap_or_default();
        Ok(expected.matches(&text).then_some(()))
    })
    .await;

    match waited {
        Err(e) if e.is_timeout() => Err(E2eError::AssertionMismatch {
            expected: format!("{selector} containing {:?}", expected.needle),
            observed: format!("{:?}", page.text_content(selector).await?.unwrap_or_default()),
        }),
        other => other,
    }
}

/// Wait until the table text contains every substring. On timeout the error
/// names the first one still missing.
pub async fn expect_table_contains<P: BrowserPage + ?Sized>(
    page: &P,
    table_selector: &str,
    substrings: &[TextMatch],
    timeout: Duration,
) -> E2eResult<()> {
    let waited = poll_until(&format!("content of {table_selector}"), timeout, || async move {
        let text = page.text_content(table_selector).await?.unwrap_or_default();
        Ok(substrings.iter().all(|s| s.matches(&text)).then_some(()))
    })
    .await;

    match waited {
        Err(e) if e.is_timeout() => {
            let text = page.text_content(table_selector).await?.unwrap_or_default();
            let missing = substrings
                .iter()
                .find(|s| !s.matches(&text))
                .map(|s| s.needle.clone())
                .unwrap_or_default();
            Err(E2eError::ContentMismatch {
                scope: table_selector.to_string(),
                missing,
            })
        }
        other => other,
    }
}

/// Wait until exactly `expected` elements match `selector`.
pub async fn expect_count<P: BrowserPage + ?Sized>(
    page: &P,
    selector: &str,
    expected: usize,
    timeout: Duration,
) -> E2eResult<()> {
    let waited = poll_until(&format!("{expected} x {selector}"), timeout, || async move {
        Ok((page.count(selector).await? == expected).then_some(()))
    })
    .await;

    match waited {
        Err(e) if e.is_timeout() => Err(E2eError::AssertionMismatch {
            expected: format!("{expected} element(s) matching {selector}"),
            observed: format!("{} element(s)", page.count(selector).await?),
        }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_match_case() {
        assert!(TextMatch::exact("Registration successful").matches("Registration successful! Redirecting"));
        assert!(!TextMatch::exact("do not match").matches("Passwords Do Not Match"));
        assert!(TextMatch::ignore_case("do not match").matches("Passwords Do Not Match"));
    }

    #[test]
    fn test_text_match_from_yaml() {
        let plain: TextMatch = serde_yaml::from_str("\"15\"").unwrap();
        assert_eq!(plain, TextMatch::exact("15"));

        let full: TextMatch = serde_yaml::from_str("needle: addition\ncase_insensitive: true\n").unwrap();
        assert_eq!(full, TextMatch::ignore_case("addition"));
    }

    #[test]
    fn test_snapshot_credits_only_new_banners() {
        let before = BannerSnapshot {
            success: Some("Calculation complete: 6".into()),
            error: None,
        };
        assert!(!before.is_fresh(OutcomeKind::Success, "Calculation complete: 6"));
        assert!(before.is_fresh(OutcomeKind::Success, "Calculation deleted successfully"));
        assert!(before.is_fresh(OutcomeKind::Error, "Cannot divide by zero"));
        assert!(BannerSnapshot::empty().is_fresh(OutcomeKind::Success, "Login successful! Redirecting..."));
    }

    #[test]
    fn test_action_result_kind() {
        assert_eq!(ActionResult::Success("ok".into()).kind(), Some(OutcomeKind::Success));
        assert_eq!(ActionResult::Error("no".into()).message(), Some("no"));
        assert_eq!(ActionResult::Timeout.kind(), None);
        assert_eq!(ActionResult::Timeout.to_string(), "no banner");
    }
}
