//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// A stable element id the harness relies on is missing from the page.
    #[error("Field not found on page: {0}")]
    FieldNotFound(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    TimeoutExceeded { what: String, timeout_ms: u64 },

    #[error("Assertion failed: expected {expected}, observed {observed}")]
    AssertionMismatch { expected: String, observed: String },

    #[error("Content mismatch in {scope}: missing {missing:?}")]
    ContentMismatch { scope: String, missing: String },

    #[error("Redirect timeout after {timeout_ms} ms: {url} never matched /{pattern}/")]
    RedirectTimeout {
        pattern: String,
        url: String,
        timeout_ms: u64,
    },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright bridge error: {0}")]
    Bridge(String),

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl E2eError {
    /// True for failures caused by a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            E2eError::TimeoutExceeded { .. } | E2eError::RedirectTimeout { .. }
        )
    }

    /// True when the page answered but not with what the step expected.
    pub fn is_assertion_failure(&self) -> bool {
        matches!(
            self,
            E2eError::AssertionMismatch { .. } | E2eError::ContentMismatch { .. }
        )
    }

    pub(crate) fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        E2eError::TimeoutExceeded {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
