//! Playwright browser automation
//!
//! Each browser context is a `node` process running a small generated
//! driver script. Commands go in over stdin and replies come back over
//! stdout, one JSON object per line.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::engine::{BrowserEngine, BrowserPage};
use crate::error::{E2eError, E2eResult};

/// Extra time granted to the driver on top of the per-command timeout
const REPLY_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,
    /// `node_modules` directory that contains the `playwright` package
    pub node_modules: PathBuf,
    /// Timeout for browser launch and for commands without their own
    pub launch_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 720,
            browser: Browser::Chromium,
            headless: true,
            node_modules: PathBuf::from("node_modules"),
            launch_timeout: Duration::from_secs(60),
        }
    }
}

/// One request on the driver protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DriverCommand {
    Goto {
        url: String,
    },
    Wait {
        selector: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Click {
        selector: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Fill {
        selector: String,
        value: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Select {
        selector: String,
        value: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Text {
        selector: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Visible {
        selector: String,
    },
    FrameClick {
        frame: String,
        selector: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Press {
        key: String,
    },
    Screenshot {
        path: String,
    },
    Close,
}

impl DriverCommand {
    fn timeout(&self) -> Option<Duration> {
        match self {
            DriverCommand::Wait { timeout_ms, .. }
            | DriverCommand::Click { timeout_ms, .. }
            | DriverCommand::Fill { timeout_ms, .. }
            | DriverCommand::Select { timeout_ms, .. }
            | DriverCommand::Text { timeout_ms, .. }
            | DriverCommand::FrameClick { timeout_ms, .. } => Some(Duration::from_millis(*timeout_ms)),
            _ => None,
        }
    }

    fn name(&self) -> String {
        match self {
            DriverCommand::Goto { url } => format!("goto:{}", url),
            DriverCommand::Wait { selector, .. } => format!("wait:{}", selector),
            DriverCommand::Click { selector, .. } => format!("click:{}", selector),
            DriverCommand::Fill { selector, .. } => format!("fill:{}", selector),
            DriverCommand::Select { selector, .. } => format!("select:{}", selector),
            DriverCommand::Text { selector, .. } => format!("text:{}", selector),
            DriverCommand::Visible { selector } => format!("visible:{}", selector),
            DriverCommand::FrameClick { frame, selector, .. } => format!("frame-click:{} >> {}", frame, selector),
            DriverCommand::Press { key } => format!("press:{}", key),
            DriverCommand::Screenshot { path } => format!("screenshot:{}", path),
            DriverCommand::Close => "close".to_string(),
        }
    }
}

#[derive(Serialize)]
struct DriverRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand,
}

/// One reply on the driver protocol
#[derive(Debug, Clone, Deserialize)]
pub struct DriverReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Build the Node.js driver script for one browser context
pub fn build_driver_script(config: &PlaywrightConfig) -> String {
    let mut script = format!(
        r#"
const {{ chromium, firefox, webkit }} = require('playwright');
const readline = require('readline');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
"#,
        browser = config.browser.as_str(),
        headless = config.headless,
        width = config.viewport_width,
        height = config.viewport_height,
    );

    script.push_str(
        r#"
  const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
  reply({ id: 0, ok: true, value: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    const cmd = JSON.parse(line);
    try {
      let value = null;
      switch (cmd.op) {
        case 'goto':
          await page.goto(cmd.url);
          break;
        case 'wait':
          try {
            await page.waitForSelector(cmd.selector, { state: 'visible', timeout: cmd.timeoutMs });
            value = true;
          } catch (e) {
            value = false;
          }
          break;
        case 'click':
          await page.click(cmd.selector, { timeout: cmd.timeoutMs });
          break;
        case 'fill':
          await page.fill(cmd.selector, cmd.value, { timeout: cmd.timeoutMs });
          break;
        case 'select':
          await page.selectOption(cmd.selector, cmd.value, { timeout: cmd.timeoutMs });
          break;
        case 'text':
          value = (await page.textContent(cmd.selector, { timeout: cmd.timeoutMs })) ?? '';
          break;
        case 'visible':
          value = await page.isVisible(cmd.selector);
          break;
        case 'frameClick':
          await page.frameLocator(cmd.frame).locator(cmd.selector).click({ timeout: cmd.timeoutMs });
          break;
        case 'press':
          await page.keyboard.press(cmd.key);
          break;
        case 'screenshot':
          await page.screenshot({ path: cmd.path, fullPage: true });
          break;
        case 'close':
          await context.close();
          await browser.close();
          reply({ id: cmd.id, ok: true, value: null });
          process.exit(0);
        default:
          throw new Error('unknown op: ' + cmd.op);
      }
      reply({ id: cmd.id, ok: true, value });
    } catch (error) {
      reply({ id: cmd.id, ok: false, error: error.message });
    }
  }
  await browser.close();
})().catch((error) => {
  process.stdout.write(JSON.stringify({ id: 0, ok: false, error: error.message }) + '\n');
  process.exit(1);
});
"#,
    );

    script
}

/// Live engine backed by Playwright
pub struct PlaywrightEngine {
    config: PlaywrightConfig,
}

impl PlaywrightEngine {
    /// Create a new engine after verifying Playwright is available
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        Ok(Self { config })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl BrowserEngine for PlaywrightEngine {
    async fn new_context(&self, label: &str) -> E2eResult<Box<dyn BrowserPage>> {
        let page = PlaywrightPage::launch(&self.config, label).await?;
        Ok(Box::new(page))
    }
}

/// A browser context driven through a `node` child process
pub struct PlaywrightPage {
    label: String,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    default_timeout: Duration,
    closed: bool,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightPage {
    async fn launch(config: &PlaywrightConfig, label: &str) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, build_driver_script(config))?;

        let node_modules = std::fs::canonicalize(&config.node_modules)
            .unwrap_or_else(|_| config.node_modules.clone());

        debug!("Launching Playwright driver for '{}': {}", label, script_path.display());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .env("NODE_PATH", &node_modules)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Driver(format!("failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdout unavailable".into()))?;

        let mut page = Self {
            label: label.to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            default_timeout: config.launch_timeout,
            closed: false,
            _script_dir: script_dir,
        };

        let ready = tokio::time::timeout(config.launch_timeout, page.read_reply(0))
            .await
            .map_err(|_| E2eError::Timeout(format!("browser launch for '{}'", label)))??;
        if !ready.ok {
            return Err(E2eError::Driver(
                ready.error.unwrap_or_else(|| "browser launch failed".into()),
            ));
        }

        info!("Browser context opened for '{}'", label);
        Ok(page)
    }

    async fn read_reply(&mut self, id: u64) -> E2eResult<DriverReply> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Driver("driver process exited".into()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DriverReply>(&line) {
                Ok(reply) if reply.id == id => return Ok(reply),
                Ok(reply) => warn!("Discarding stale driver reply {}", reply.id),
                Err(_) => debug!("[driver] {}", line),
            }
        }
    }

    async fn call(&mut self, command: DriverCommand) -> E2eResult<Option<Value>> {
        if self.closed {
            return Err(E2eError::Driver(format!("context '{}' is closed", self.label)));
        }

        self.next_id += 1;
        let id = self.next_id;
        let name = command.name();

        let mut line = serde_json::to_string(&DriverRequest { id, command: &command })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let wait = command.timeout().unwrap_or(self.default_timeout) + REPLY_GRACE;
        let reply = tokio::time::timeout(wait, self.read_reply(id))
            .await
            .map_err(|_| E2eError::Timeout(name.clone()))??;

        if reply.ok {
            Ok(reply.value)
        } else {
            Err(E2eError::Driver(format!(
                "{}: {}",
                name,
                reply.error.unwrap_or_else(|| "unknown error".into())
            )))
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        self.call(DriverCommand::Goto { url: url.to_string() }).await?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> E2eResult<bool> {
        let value = self
            .call(DriverCommand::Wait {
                selector: selector.to_string(),
                timeout_ms: millis(timeout),
            })
            .await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn click(&mut self, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.call(DriverCommand::Click {
            selector: selector.to_string(),
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()> {
        self.call(DriverCommand::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn select_option(&mut self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()> {
        self.call(DriverCommand::Select {
            selector: selector.to_string(),
            value: value.to_string(),
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn text_content(&mut self, selector: &str, timeout: Duration) -> E2eResult<String> {
        let value = self
            .call(DriverCommand::Text {
                selector: selector.to_string(),
                timeout_ms: millis(timeout),
            })
            .await?;
        Ok(value
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default())
    }

    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool> {
        let value = self
            .call(DriverCommand::Visible {
                selector: selector.to_string(),
            })
            .await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn click_in_frame(&mut self, frame: &str, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.call(DriverCommand::FrameClick {
            frame: frame.to_string(),
            selector: selector.to_string(),
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn press(&mut self, key: &str) -> E2eResult<()> {
        self.call(DriverCommand::Press { key: key.to_string() }).await?;
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.call(DriverCommand::Screenshot {
            path: path.to_string_lossy().to_string(),
        })
        .await?;
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.call(DriverCommand::Close).await;
        self.closed = true;

        if let Err(e) = &result {
            warn!("Graceful close failed for '{}': {}", self.label, e);
            let _ = self.child.kill().await;
        }
        let _ = self.child.wait().await;

        info!("Browser context closed for '{}'", self.label);
        result.map(|_| ())
    }
}
