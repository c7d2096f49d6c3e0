//! Browser automation engine seam
//!
//! The suite only ever talks to the browser through these two traits. The
//! live implementation is [`crate::playwright::PlaywrightEngine`]; the
//! [`crate::recorder::RecordingEngine`] answers from a script instead.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::E2eResult;

/// Opens isolated browser contexts, one per test instance
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn new_context(&self, label: &str) -> E2eResult<Box<dyn BrowserPage>>;
}

/// A single page inside an isolated browser context.
///
/// Every call is awaited before the next one is issued.
#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &str) -> E2eResult<()>;

    /// Wait until the selector is visible. `Ok(false)` on timeout.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> E2eResult<bool>;

    async fn click(&mut self, selector: &str, timeout: Duration) -> E2eResult<()>;

    async fn fill(&mut self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()>;

    async fn select_option(&mut self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()>;

    async fn text_content(&mut self, selector: &str, timeout: Duration) -> E2eResult<String>;

    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool>;

    async fn click_in_frame(&mut self, frame: &str, selector: &str, timeout: Duration) -> E2eResult<()>;

    /// Press a keyboard key on the focused element
    async fn press(&mut self, key: &str) -> E2eResult<()>;

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()>;

    async fn pause(&mut self, duration: Duration) -> E2eResult<()> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    /// Dispose of the context. Called exactly once per context.
    async fn close(&mut self) -> E2eResult<()>;
}
