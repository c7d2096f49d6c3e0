//! One test instance's browser session and the flow interpreter

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::{Actions, PresenceMode, Screenshot};
use crate::appointment::{AppointmentBooker, AppointmentRequest};
use crate::config::EnvironmentConfig;
use crate::engine::BrowserPage;
use crate::error::{E2eError, E2eResult};
use crate::fixture::{BoundRow, FixtureStore, FixtureWriter};
use crate::flow::{Flow, FlowStep, StepAction, Target, ValueSource};
use crate::locator::{ConcreteLocator, LocatorKey, LocatorRegistry};

/// Values discovered mid-instance and handed to later steps
#[derive(Debug, Clone, Default)]
pub struct DataBag(HashMap<String, String>);

impl DataBag {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Skipped,
    Failed,
}

/// Result of executing a flow step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub flow: String,
    pub step_name: String,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Screenshot>,
}

/// Shared, read-only collaborators every session needs
#[derive(Clone)]
pub struct SessionDeps {
    pub registry: Arc<LocatorRegistry>,
    pub env: Arc<EnvironmentConfig>,
    pub store: FixtureStore,
    pub writer: FixtureWriter,
    pub screenshot_dir: PathBuf,
    pub booker: Option<Arc<dyn AppointmentBooker>>,
    /// Rehearse flows: text assertions are read but not compared, captures
    /// fall back to a placeholder and nothing is written back to fixtures
    pub dry_run: bool,
}

/// A running test instance: one page, its bound rows and its data bag
pub struct Session {
    name: String,
    actions: Actions,
    deps: SessionDeps,
    tables: BTreeMap<String, BoundRow>,
    bag: DataBag,
    steps: Vec<StepResult>,
}

enum Executed {
    Done,
    Skipped(String),
    Shot(Screenshot),
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        page: Box<dyn BrowserPage>,
        deps: SessionDeps,
        tables: BTreeMap<String, BoundRow>,
    ) -> Self {
        let actions = Actions::new(page, deps.env.locator_check, deps.screenshot_dir.clone());
        Self {
            name: name.into(),
            actions,
            deps,
            tables,
            bag: DataBag::default(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound fixture row for a table
    pub fn table(&self, name: &str) -> E2eResult<&BoundRow> {
        self.tables
            .get(name)
            .ok_or_else(|| E2eError::UnboundTable(name.to_string()))
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Book an appointment for a bound row and publish its identifiers
    pub async fn book_appointment(&mut self, table: &str) -> E2eResult<()> {
        let request = AppointmentRequest::from_row(self.table(table)?)?;
        let booker = self
            .deps
            .booker
            .clone()
            .ok_or_else(|| E2eError::Appointment("no appointment API configured".into()))?;

        let start = Instant::now();
        let appointment = booker.book(&request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match appointment {
            Ok(appointment) => {
                for (key, value) in appointment.bag_entries() {
                    self.bag.insert(key, value);
                }
                self.push_result("appointment", "Book appointment", StepOutcome::Passed, duration_ms, None, None);
                Ok(())
            }
            Err(e) => {
                self.push_result(
                    "appointment",
                    "Book appointment",
                    StepOutcome::Failed,
                    duration_ms,
                    Some(e.to_string()),
                    None,
                );
                Err(e)
            }
        }
    }

    /// Execute a flow; the first failing step aborts it
    pub async fn run_flow(&mut self, flow: &Flow) -> E2eResult<()> {
        info!("[{}] flow '{}' ({} step(s))", self.name, flow.name, flow.steps.len());
        self.run_steps(&flow.name, &flow.steps).await
    }

    fn run_steps<'a>(&'a mut self, flow: &'a str, steps: &'a [FlowStep]) -> BoxFuture<'a, E2eResult<()>> {
        async move {
            for step in steps {
                self.run_step(flow, step).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn run_step(&mut self, flow: &str, step: &FlowStep) -> E2eResult<()> {
        let start = Instant::now();
        debug!("[{}] {} :: {}", self.name, flow, step.description);

        let result = self.execute(flow, step).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Executed::Done) => {
                self.push_result(flow, &step.description, StepOutcome::Passed, duration_ms, None, None);
                Ok(())
            }
            Ok(Executed::Shot(shot)) => {
                self.push_result(flow, &step.description, StepOutcome::Passed, duration_ms, None, Some(shot));
                Ok(())
            }
            Ok(Executed::Skipped(reason)) => {
                debug!("[{}] skipped '{}': {}", self.name, step.description, reason);
                self.push_result(flow, &step.description, StepOutcome::Skipped, duration_ms, Some(reason), None);
                Ok(())
            }
            Err(e) => {
                self.push_result(
                    flow,
                    &step.description,
                    StepOutcome::Failed,
                    duration_ms,
                    Some(e.to_string()),
                    None,
                );
                Err(e)
            }
        }
    }

    fn push_result(
        &mut self,
        flow: &str,
        step_name: &str,
        outcome: StepOutcome,
        duration_ms: u64,
        error: Option<String>,
        screenshot: Option<Screenshot>,
    ) {
        self.steps.push(StepResult {
            flow: flow.to_string(),
            step_name: step_name.to_string(),
            outcome,
            duration_ms,
            error,
            screenshot,
        });
    }

    async fn execute(&mut self, flow: &str, step: &FlowStep) -> E2eResult<Executed> {
        match &step.action {
            StepAction::Navigate { path } => {
                let url = self.deps.env.url(path);
                self.actions.goto(&url).await?;
            }
            StepAction::Click { target } => {
                let Some(locator) = self.resolve_target(target)? else {
                    return Ok(skipped_target(target));
                };
                self.actions.click(&locator).await?;
            }
            StepAction::Fill { target, value } => {
                let Some(locator) = self.resolve_target(target)? else {
                    return Ok(skipped_target(target));
                };
                let Some(value) = self.resolve_value(value)? else {
                    return Ok(skipped_value(value));
                };
                self.actions.fill(&locator, &value).await?;
            }
            StepAction::Select { target, value } => {
                let Some(locator) = self.resolve_target(target)? else {
                    return Ok(skipped_target(target));
                };
                let Some(value) = self.resolve_value(value)? else {
                    return Ok(skipped_value(value));
                };
                self.actions.select_option(&locator, &value).await?;
            }
            StepAction::AssertText { target, expected } => {
                let Some(locator) = self.resolve_target(target)? else {
                    return Ok(skipped_target(target));
                };
                let Some(expected) = self.resolve_value(expected)? else {
                    return Ok(skipped_value(expected));
                };
                if self.deps.dry_run {
                    let actual = self.actions.text_of(&locator).await?;
                    debug!("[{}] dry run: {} reads '{}', expected '{}'", self.name, locator, actual, expected);
                } else {
                    self.actions.assert_text_match(&locator, &expected).await?;
                }
            }
            StepAction::AssertVisible { target, visible } => {
                let Some(locator) = self.resolve_target(target)? else {
                    return Ok(skipped_target(target));
                };
                self.actions.assert_button_visibility(&locator, *visible).await?;
            }
            StepAction::Wait { target, timeout_ms } => {
                let Some(locator) = self.resolve_target(target)? else {
                    return Ok(skipped_target(target));
                };
                let timeout = timeout_ms.map(Duration::from_millis);
                self.actions
                    .is_locator_present(&locator, timeout, PresenceMode::Hard)
                    .await?;
            }
            StepAction::ClickInFrame { frame, target } => {
                let (Some(frame), Some(locator)) = (self.resolve_target(frame)?, self.resolve_target(target)?) else {
                    return Ok(skipped_target(target));
                };
                self.actions.click_inside_iframe(&frame, &locator).await?;
            }
            StepAction::ArrowDown => self.actions.arrow_down().await?,
            StepAction::Enter => self.actions.enter().await?,
            StepAction::Pause { ms } => {
                self.actions.hard_pause(Duration::from_millis(*ms)).await?;
            }
            StepAction::Screenshot { title } => {
                let title = format!("{} - {}", self.name, title);
                let shot = self.actions.capture_screenshot_with_title(&title).await?;
                return Ok(Executed::Shot(shot));
            }
            StepAction::Capture { target, into } => {
                let Some(locator) = self.resolve_target(target)? else {
                    return Ok(skipped_target(target));
                };
                let mut text = self.actions.text_of(&locator).await?;
                if text.is_empty() && self.deps.dry_run {
                    text = format!("DRYRUN-{}", into);
                }
                if text.is_empty() {
                    return Err(E2eError::AssertionFailed(format!("{} has no text to capture", locator)));
                }
                info!("[{}] captured {} = {}", self.name, into, text);
                self.bag.insert(into.clone(), text);
            }
            StepAction::WriteBack { table, field, value } => {
                let Some(value) = self.resolve_value(value)? else {
                    return Ok(skipped_value(value));
                };
                if self.deps.dry_run {
                    return Ok(Executed::Skipped(format!("dry run: {}.{} = {}", table, field, value)));
                }
                let (dataset, index) = {
                    let row = self.table(table)?;
                    (row.dataset.clone(), row.index)
                };
                self.deps
                    .writer
                    .write_field(&dataset, index, field, serde_json::Value::String(value))?;
            }
            StepAction::Reload { table } => {
                let (dataset, index) = {
                    let row = self.table(table)?;
                    (row.dataset.clone(), row.index)
                };
                let fresh = self.deps.store.reload_row(&dataset, index)?;
                self.tables.insert(table.clone(), fresh);
            }
            StepAction::Optional { gate, steps } => {
                let Some(locator) = self.resolve_target(gate)? else {
                    return Ok(skipped_target(gate));
                };
                if !self
                    .actions
                    .is_locator_present(&locator, None, PresenceMode::Soft)
                    .await?
                {
                    return Ok(Executed::Skipped(format!("{} not present", locator)));
                }
                self.run_steps(flow, steps).await?;
            }
            StepAction::Retry { policy, steps } => {
                let mut attempt = 1;
                loop {
                    match self.run_steps(flow, steps).await {
                        Ok(()) => break,
                        Err(e) if policy.should_retry(attempt) => {
                            warn!(
                                "[{}] '{}' failed (attempt {}/{}): {}",
                                self.name, step.description, attempt, policy.attempts, e
                            );
                            attempt += 1;
                        }
                        Err(e) => {
                            policy.exhausted(&step.description, e)?;
                            break;
                        }
                    }
                }
            }
            StepAction::Repeat { times, between, steps } => {
                for round in 1..=*times {
                    if round > 1 {
                        self.run_steps(flow, between).await?;
                    }
                    debug!("[{}] '{}' round {}/{}", self.name, step.description, round, times);
                    self.run_steps(flow, steps).await?;
                }
            }
        }
        Ok(Executed::Done)
    }

    /// Resolve a target to a concrete selector; `None` when it depends on
    /// a bag value that is not there
    pub fn resolve_target(&self, target: &Target) -> E2eResult<Option<ConcreteLocator>> {
        match target {
            Target::Selector(raw) => Ok(Some(ConcreteLocator(raw.clone()))),
            Target::Key(key) => {
                let key: LocatorKey = key.parse()?;
                Ok(Some(self.deps.registry.resolve(&key)?.concrete()?))
            }
            Target::Param { key, token, value } => {
                let key: LocatorKey = key.parse()?;
                let Some(value) = self.resolve_value(value)? else {
                    return Ok(None);
                };
                Ok(Some(self.deps.registry.resolve_with(&key, token, &value)?))
            }
        }
    }

    /// Resolve a value; `None` only for absent bag values
    pub fn resolve_value(&self, source: &ValueSource) -> E2eResult<Option<String>> {
        match source {
            ValueSource::Literal(v) => Ok(Some(v.clone())),
            ValueSource::Row { table, field } => Ok(Some(self.table(table)?.text(field)?)),
            ValueSource::Bag(key) => Ok(self.bag.get(key).map(String::from)),
            ValueSource::Username => Ok(Some(self.deps.env.username.clone())),
            ValueSource::Password => Ok(Some(self.deps.env.password.clone())),
        }
    }

    /// Dispose of the browser context
    pub async fn close(&mut self) -> E2eResult<()> {
        self.actions.close().await
    }

    pub fn into_steps(self) -> Vec<StepResult> {
        self.steps
    }
}

fn skipped_target(target: &Target) -> Executed {
    Executed::Skipped(format!("target {:?} depends on a missing bag value", target))
}

fn skipped_value(source: &ValueSource) -> Executed {
    Executed::Skipped(format!("value {:?} not available", source))
}
