//! Browser page seam
//!
//! The action, outcome and session layers only ever talk to a page through
//! [`BrowserPage`]. The Playwright bridge implements it for real browsers;
//! [`crate::testing`] implements it in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// What to do with the next native `confirm()` dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogAction {
    Accept,
    Dismiss,
}

/// One isolated browser context with a single page.
///
/// Selectors are CSS. Actions that target a selector with several matches act
/// on the first one.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> E2eResult<()>;

    async fn url(&self) -> E2eResult<String>;

    /// Number of elements matching `selector`, zero when absent.
    async fn count(&self, selector: &str) -> E2eResult<usize>;

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    async fn select_option(&self, selector: &str, value: &str) -> E2eResult<()>;

    async fn check(&self, selector: &str) -> E2eResult<()>;

    async fn is_visible(&self, selector: &str) -> E2eResult<bool>;

    /// Text content of the first match, `None` when nothing matches.
    async fn text_content(&self, selector: &str) -> E2eResult<Option<String>>;

    /// Register a one-shot handler for the next dialog. Must be called before
    /// the action that opens the dialog.
    async fn arm_dialog(&self, action: DialogAction) -> E2eResult<()>;

    async fn set_viewport(&self, viewport: Viewport) -> E2eResult<()>;

    /// Tear down the browser context. Further calls fail.
    async fn close(&self) -> E2eResult<()>;
}

/// Opens a fresh, isolated page per scenario.
#[async_trait]
pub trait PageFactory: Send + Sync {
    type Page: BrowserPage;

    async fn new_page(&self, viewport: Viewport) -> E2eResult<Self::Page>;
}
