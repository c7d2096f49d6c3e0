//! Action primitives: one UI interaction each, always awaited in order

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::LocatorCheck;
use crate::engine::BrowserPage;
use crate::error::{E2eError, E2eResult};
use crate::locator::ConcreteLocator;

/// How a presence check reacts to a missing element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceMode {
    /// Report absence as `false`
    Soft,
    /// Report absence as an error
    Hard,
}

/// A screenshot written by [`Actions::capture_screenshot_with_title`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    pub path: PathBuf,
    pub sha256: Option<String>,
}

/// Primitive UI actions against one page
pub struct Actions {
    page: Box<dyn BrowserPage>,
    check: LocatorCheck,
    screenshot_dir: PathBuf,
}

impl Actions {
    pub fn new(page: Box<dyn BrowserPage>, check: LocatorCheck, screenshot_dir: PathBuf) -> Self {
        Self {
            page,
            check,
            screenshot_dir,
        }
    }

    pub async fn goto(&mut self, url: &str) -> E2eResult<()> {
        debug!("goto {}", url);
        self.page.goto(url).await
    }

    /// Probe for an element, polling `retries + 1` times.
    ///
    /// In soft mode engine errors are logged and reported as absence, so
    /// the call never fails. In hard mode absence is an error.
    pub async fn is_locator_present(
        &mut self,
        locator: &ConcreteLocator,
        timeout: Option<Duration>,
        mode: PresenceMode,
    ) -> E2eResult<bool> {
        let timeout = timeout.unwrap_or_else(|| self.check.timeout());
        let attempts = self.check.retries.saturating_add(1);

        for attempt in 1..=attempts {
            match self.page.wait_for(locator.as_str(), timeout).await {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    debug!("{} not present (attempt {}/{})", locator, attempt, attempts);
                }
                Err(e) if mode == PresenceMode::Soft => {
                    warn!("Presence check for {} failed: {}", locator, e);
                }
                Err(e) => return Err(e),
            }
        }

        match mode {
            PresenceMode::Soft => Ok(false),
            PresenceMode::Hard => Err(E2eError::LocatorNotPresent {
                selector: locator.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis())
                    .unwrap_or(u64::MAX)
                    .saturating_mul(u64::from(attempts)),
            }),
        }
    }

    pub async fn click(&mut self, locator: &ConcreteLocator) -> E2eResult<()> {
        let timeout = self.check.timeout();
        self.page.click(locator.as_str(), timeout).await
    }

    pub async fn fill(&mut self, locator: &ConcreteLocator, value: &str) -> E2eResult<()> {
        let timeout = self.check.timeout();
        self.page.fill(locator.as_str(), value, timeout).await
    }

    pub async fn select_option(&mut self, locator: &ConcreteLocator, value: &str) -> E2eResult<()> {
        let timeout = self.check.timeout();
        self.page.select_option(locator.as_str(), value, timeout).await
    }

    pub async fn text_of(&mut self, locator: &ConcreteLocator) -> E2eResult<String> {
        let timeout = self.check.timeout();
        Ok(self.page.text_content(locator.as_str(), timeout).await?.trim().to_string())
    }

    /// Element text (trimmed) must equal `expected`
    pub async fn assert_text_match(&mut self, locator: &ConcreteLocator, expected: &str) -> E2eResult<()> {
        let actual = self.text_of(locator).await?;
        if actual == expected.trim() {
            Ok(())
        } else {
            Err(E2eError::AssertionFailed(format!(
                "{}: expected text '{}', found '{}'",
                locator, expected, actual
            )))
        }
    }

    pub async fn assert_button_visibility(&mut self, locator: &ConcreteLocator, visible: bool) -> E2eResult<()> {
        if visible {
            // give the button the usual presence budget before judging
            self.is_locator_present(locator, None, PresenceMode::Soft).await?;
        }
        let actual = self.page.is_visible(locator.as_str()).await?;
        if actual == visible {
            Ok(())
        } else {
            Err(E2eError::AssertionFailed(format!(
                "{}: expected {}, found {}",
                locator,
                if visible { "visible" } else { "hidden" },
                if actual { "visible" } else { "hidden" }
            )))
        }
    }

    pub async fn click_inside_iframe(&mut self, frame: &ConcreteLocator, locator: &ConcreteLocator) -> E2eResult<()> {
        let timeout = self.check.timeout();
        self.page.click_in_frame(frame.as_str(), locator.as_str(), timeout).await
    }

    pub async fn arrow_down(&mut self) -> E2eResult<()> {
        self.page.press("ArrowDown").await
    }

    pub async fn enter(&mut self) -> E2eResult<()> {
        self.page.press("Enter").await
    }

    pub async fn hard_pause(&mut self, duration: Duration) -> E2eResult<()> {
        self.page.pause(duration).await
    }

    /// Full-page screenshot named after `title`
    pub async fn capture_screenshot_with_title(&mut self, title: &str) -> E2eResult<Screenshot> {
        let path = self.screenshot_dir.join(format!("{}.png", sanitize_title(title)));
        self.page.screenshot(&path).await?;
        let sha256 = if path.exists() { Some(hash_file(&path)?) } else { None };
        Ok(Screenshot { path, sha256 })
    }

    /// Dispose of the underlying context
    pub async fn close(&mut self) -> E2eResult<()> {
        self.page.close().await
    }
}

/// File-system safe version of a screenshot title
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "screenshot".to_string()
    } else {
        trimmed.to_string()
    }
}

fn hash_file(path: &Path) -> E2eResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
