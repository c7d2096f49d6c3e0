//! In-process engine that records interactions instead of driving a browser
//!
//! Used by `--dry-run` to print the exact action sequence of a plan, and by
//! the test suite to script page state (which selectors exist, which clicks
//! fail, what text an element holds).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{BrowserEngine, BrowserPage};
use crate::error::{E2eError, E2eResult};

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecordedAction {
    Open { context: String },
    Goto { url: String },
    Wait { selector: String, present: bool },
    Click { selector: String },
    Fill { selector: String, value: String },
    Select { selector: String, value: String },
    Text { selector: String },
    Visible { selector: String },
    FrameClick { frame: String, selector: String },
    Press { key: String },
    Screenshot { path: String },
    Pause { ms: u64 },
    Close { context: String },
}

#[derive(Debug, Default)]
struct Script {
    all_present: bool,
    present: HashSet<String>,
    absent: HashSet<String>,
    /// Remaining forced failures per selector; `None` fails forever
    failing: HashMap<String, Option<u32>>,
    texts: HashMap<String, String>,
    fail_open: bool,
}

#[derive(Debug, Default)]
struct Journal {
    actions: Vec<RecordedAction>,
    opened: usize,
    closed: usize,
}

/// Scripted, recording browser engine
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    script: Arc<Mutex<Script>>,
    journal: Arc<Mutex<Journal>>,
}

impl RecordingEngine {
    /// Engine where no selector is present unless declared
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine where every selector is present unless declared absent
    pub fn all_present() -> Self {
        let engine = Self::default();
        engine.script.lock().all_present = true;
        engine
    }

    pub fn with_present(self, selector: &str) -> Self {
        self.script.lock().present.insert(selector.to_string());
        self
    }

    pub fn with_absent(self, selector: &str) -> Self {
        self.script.lock().absent.insert(selector.to_string());
        self
    }

    /// Clicks on `selector` fail the next `times` times
    pub fn with_failing_click(self, selector: &str, times: u32) -> Self {
        self.script
            .lock()
            .failing
            .insert(selector.to_string(), Some(times));
        self
    }

    /// Clicks on `selector` always fail
    pub fn with_broken(self, selector: &str) -> Self {
        self.script.lock().failing.insert(selector.to_string(), None);
        self
    }

    pub fn with_text(self, selector: &str, text: &str) -> Self {
        self.script
            .lock()
            .texts
            .insert(selector.to_string(), text.to_string());
        self
    }

    /// Every attempt to open a context fails
    pub fn with_failing_open(self) -> Self {
        self.script.lock().fail_open = true;
        self
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        self.journal.lock().actions.clone()
    }

    pub fn contexts_opened(&self) -> usize {
        self.journal.lock().opened
    }

    pub fn contexts_closed(&self) -> usize {
        self.journal.lock().closed
    }

    /// Number of recorded clicks on a selector
    pub fn clicks_on(&self, selector: &str) -> usize {
        self.journal
            .lock()
            .actions
            .iter()
            .filter(|a| matches!(a, RecordedAction::Click { selector: s } if s == selector))
            .count()
    }

    pub fn filled(&self, selector: &str) -> Option<String> {
        self.journal.lock().actions.iter().rev().find_map(|a| match a {
            RecordedAction::Fill { selector: s, value } if s == selector => Some(value.clone()),
            _ => None,
        })
    }
}

#[async_trait]
impl BrowserEngine for RecordingEngine {
    async fn new_context(&self, label: &str) -> E2eResult<Box<dyn BrowserPage>> {
        if self.script.lock().fail_open {
            return Err(E2eError::Driver(format!("cannot open context for '{}'", label)));
        }
        {
            let mut journal = self.journal.lock();
            journal.opened += 1;
            journal.actions.push(RecordedAction::Open {
                context: label.to_string(),
            });
        }
        Ok(Box::new(RecordingPage {
            label: label.to_string(),
            script: self.script.clone(),
            journal: self.journal.clone(),
        }))
    }
}

/// Page handed out by [`RecordingEngine`]
pub struct RecordingPage {
    label: String,
    script: Arc<Mutex<Script>>,
    journal: Arc<Mutex<Journal>>,
}

impl RecordingPage {
    fn record(&self, action: RecordedAction) {
        info!("[dry-run:{}] {:?}", self.label, action);
        self.journal.lock().actions.push(action);
    }

    fn is_present(&self, selector: &str) -> bool {
        let script = self.script.lock();
        if script.absent.contains(selector) {
            return false;
        }
        script.all_present || script.present.contains(selector) || script.texts.contains_key(selector)
    }

    fn take_failure(&self, selector: &str) -> bool {
        let mut script = self.script.lock();
        match script.failing.get_mut(selector) {
            None => false,
            Some(None) => true,
            Some(Some(0)) => false,
            Some(Some(n)) => {
                *n -= 1;
                true
            }
        }
    }

    fn require(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        if self.is_present(selector) {
            Ok(())
        } else {
            Err(E2eError::LocatorNotPresent {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[async_trait]
impl BrowserPage for RecordingPage {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        self.record(RecordedAction::Goto { url: url.to_string() });
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> E2eResult<bool> {
        let present = self.is_present(selector);
        self.record(RecordedAction::Wait {
            selector: selector.to_string(),
            present,
        });
        Ok(present)
    }

    async fn click(&mut self, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.record(RecordedAction::Click {
            selector: selector.to_string(),
        });
        self.require(selector, timeout)?;
        if self.take_failure(selector) {
            return Err(E2eError::Driver(format!("click:{}: element not interactable", selector)));
        }
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()> {
        self.record(RecordedAction::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        });
        self.require(selector, timeout)
    }

    async fn select_option(&mut self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()> {
        self.record(RecordedAction::Select {
            selector: selector.to_string(),
            value: value.to_string(),
        });
        self.require(selector, timeout)
    }

    async fn text_content(&mut self, selector: &str, timeout: Duration) -> E2eResult<String> {
        self.record(RecordedAction::Text {
            selector: selector.to_string(),
        });
        self.require(selector, timeout)?;
        Ok(self
            .script
            .lock()
            .texts
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool> {
        self.record(RecordedAction::Visible {
            selector: selector.to_string(),
        });
        Ok(self.is_present(selector))
    }

    async fn click_in_frame(&mut self, frame: &str, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.record(RecordedAction::FrameClick {
            frame: frame.to_string(),
            selector: selector.to_string(),
        });
        self.require(frame, timeout)?;
        self.require(selector, timeout)
    }

    async fn press(&mut self, key: &str) -> E2eResult<()> {
        self.record(RecordedAction::Press { key: key.to_string() });
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        self.record(RecordedAction::Screenshot {
            path: path.to_string_lossy().to_string(),
        });
        Ok(())
    }

    async fn pause(&mut self, duration: Duration) -> E2eResult<()> {
        self.record(RecordedAction::Pause {
            ms: duration.as_millis() as u64,
        });
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        let mut journal = self.journal.lock();
        journal.closed += 1;
        journal.actions.push(RecordedAction::Close {
            context: self.label.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_presence() {
        let engine = RecordingEngine::new().with_present("#a");
        let mut page = engine.new_context("t").await.unwrap();
        assert!(page.wait_for("#a", Duration::from_millis(10)).await.unwrap());
        assert!(!page.wait_for("#b", Duration::from_millis(10)).await.unwrap());
        assert!(page.click("#b", Duration::from_millis(10)).await.is_err());
        page.close().await.unwrap();
        assert_eq!(engine.contexts_opened(), 1);
        assert_eq!(engine.contexts_closed(), 1);
    }

    #[tokio::test]
    async fn test_failing_click_recovers() {
        let engine = RecordingEngine::all_present().with_failing_click("#btn", 2);
        let mut page = engine.new_context("t").await.unwrap();
        let timeout = Duration::from_millis(10);
        assert!(page.click("#btn", timeout).await.is_err());
        assert!(page.click("#btn", timeout).await.is_err());
        assert!(page.click("#btn", timeout).await.is_ok());
        assert_eq!(engine.clicks_on("#btn"), 3);
    }

    #[tokio::test]
    async fn test_text_implies_presence() {
        let engine = RecordingEngine::new().with_text("#mrn", "MRN-42");
        let mut page = engine.new_context("t").await.unwrap();
        let text = page.text_content("#mrn", Duration::from_millis(10)).await.unwrap();
        assert_eq!(text, "MRN-42");
    }
}
