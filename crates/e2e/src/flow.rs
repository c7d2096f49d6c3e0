//! Flows: explicit, ordered step lists for one business section
//!
//! A flow is data. It is built by the functions in [`crate::flows`] from the
//! bound fixture rows, then executed step by step by a
//! [`crate::session::Session`].

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Where an element is found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Registry key, `Page.Element`
    Key(String),
    /// Registry key whose `{token}` is filled from `value`
    Param {
        key: String,
        token: String,
        value: ValueSource,
    },
    /// Raw selector, bypassing the registry
    Selector(String),
}

impl Target {
    pub fn param(key: &str, token: &str, value: ValueSource) -> Self {
        Target::Param {
            key: key.to_string(),
            token: token.to_string(),
            value,
        }
    }

    /// Registry key referenced by this target, if any
    pub fn registry_key(&self) -> Option<&str> {
        match self {
            Target::Key(key) | Target::Param { key, .. } => Some(key),
            Target::Selector(_) => None,
        }
    }
}

impl From<&str> for Target {
    fn from(key: &str) -> Self {
        Target::Key(key.to_string())
    }
}

/// Where a value typed into the page comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Literal(String),
    /// Field of a bound fixture row; absence is an error
    Row { table: String, field: String },
    /// Value discovered earlier in the same test instance; absence skips
    /// the step that needs it
    Bag(String),
    Username,
    Password,
}

impl ValueSource {
    pub fn literal(value: impl Into<String>) -> Self {
        ValueSource::Literal(value.into())
    }

    pub fn row(table: &str, field: &str) -> Self {
        ValueSource::Row {
            table: table.to_string(),
            field: field.to_string(),
        }
    }

    pub fn bag(key: &str) -> Self {
        ValueSource::Bag(key.to_string())
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// Navigate to a path relative to the environment base URL
    Navigate { path: String },
    Click { target: Target },
    Fill { target: Target, value: ValueSource },
    Select { target: Target, value: ValueSource },
    AssertText { target: Target, expected: ValueSource },
    AssertVisible { target: Target, visible: bool },
    /// Hard presence check
    Wait {
        target: Target,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    ClickInFrame { frame: Target, target: Target },
    ArrowDown,
    Enter,
    Pause { ms: u64 },
    Screenshot { title: String },
    /// Read an element's text into the data bag
    Capture { target: Target, into: String },
    /// Persist a value into the bound row's backing dataset
    WriteBack {
        table: String,
        field: String,
        value: ValueSource,
    },
    /// Re-read a bound table from the fixture store
    Reload { table: String },
    /// Run `steps` only when `gate` passes a soft presence check
    Optional { gate: Target, steps: Vec<FlowStep> },
    Retry { policy: RetryPolicy, steps: Vec<FlowStep> },
    /// Run `steps` `times` times with `between` in between
    Repeat {
        times: u32,
        #[serde(default)]
        between: Vec<FlowStep>,
        steps: Vec<FlowStep>,
    },
}

/// A described step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    pub description: String,
    #[serde(flatten)]
    pub action: StepAction,
}

/// An ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    pub steps: Vec<FlowStep>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, description: impl Into<String>, action: StepAction) -> Self {
        self.steps.push(FlowStep {
            description: description.into(),
            action,
        });
        self
    }

    /// Append every step of another flow
    pub fn extend(mut self, other: Flow) -> Self {
        self.steps.extend(other.steps);
        self
    }

    pub fn navigate(self, description: &str, path: &str) -> Self {
        self.step(description, StepAction::Navigate { path: path.to_string() })
    }

    pub fn click(self, description: &str, target: impl Into<Target>) -> Self {
        self.step(description, StepAction::Click { target: target.into() })
    }

    pub fn fill(self, description: &str, target: impl Into<Target>, value: ValueSource) -> Self {
        self.step(
            description,
            StepAction::Fill {
                target: target.into(),
                value,
            },
        )
    }

    pub fn select(self, description: &str, target: impl Into<Target>, value: ValueSource) -> Self {
        self.step(
            description,
            StepAction::Select {
                target: target.into(),
                value,
            },
        )
    }

    pub fn assert_text(self, description: &str, target: impl Into<Target>, expected: ValueSource) -> Self {
        self.step(
            description,
            StepAction::AssertText {
                target: target.into(),
                expected,
            },
        )
    }

    pub fn assert_visible(self, description: &str, target: impl Into<Target>, visible: bool) -> Self {
        self.step(
            description,
            StepAction::AssertVisible {
                target: target.into(),
                visible,
            },
        )
    }

    pub fn wait(self, description: &str, target: impl Into<Target>) -> Self {
        self.step(
            description,
            StepAction::Wait {
                target: target.into(),
                timeout_ms: None,
            },
        )
    }

    pub fn click_in_frame(self, description: &str, frame: impl Into<Target>, target: impl Into<Target>) -> Self {
        self.step(
            description,
            StepAction::ClickInFrame {
                frame: frame.into(),
                target: target.into(),
            },
        )
    }

    pub fn arrow_down(self, description: &str) -> Self {
        self.step(description, StepAction::ArrowDown)
    }

    pub fn enter(self, description: &str) -> Self {
        self.step(description, StepAction::Enter)
    }

    pub fn pause(self, description: &str, ms: u64) -> Self {
        self.step(description, StepAction::Pause { ms })
    }

    pub fn screenshot(self, title: &str) -> Self {
        self.step(
            format!("Screenshot '{}'", title),
            StepAction::Screenshot {
                title: title.to_string(),
            },
        )
    }

    pub fn capture(self, description: &str, target: impl Into<Target>, into: &str) -> Self {
        self.step(
            description,
            StepAction::Capture {
                target: target.into(),
                into: into.to_string(),
            },
        )
    }

    pub fn write_back(self, description: &str, table: &str, field: &str, value: ValueSource) -> Self {
        self.step(
            description,
            StepAction::WriteBack {
                table: table.to_string(),
                field: field.to_string(),
                value,
            },
        )
    }

    pub fn reload(self, description: &str, table: &str) -> Self {
        self.step(
            description,
            StepAction::Reload {
                table: table.to_string(),
            },
        )
    }

    /// Section present only sometimes in the live UI
    pub fn optional(self, description: &str, gate: impl Into<Target>, body: impl FnOnce(Flow) -> Flow) -> Self {
        let steps = body(Flow::new(description)).steps;
        self.step(
            description,
            StepAction::Optional {
                gate: gate.into(),
                steps,
            },
        )
    }

    pub fn retry(self, description: &str, policy: RetryPolicy, body: impl FnOnce(Flow) -> Flow) -> Self {
        let steps = body(Flow::new(description)).steps;
        self.step(description, StepAction::Retry { policy, steps })
    }

    pub fn repeat(self, description: &str, times: u32, between: Flow, body: Flow) -> Self {
        self.step(
            description,
            StepAction::Repeat {
                times,
                between: between.steps,
                steps: body.steps,
            },
        )
    }

    /// Every target used anywhere in the flow, nested steps included
    pub fn targets(&self) -> Vec<&Target> {
        let mut out = Vec::new();
        collect_targets(&self.steps, &mut out);
        out
    }
}

fn collect_targets<'a>(steps: &'a [FlowStep], out: &mut Vec<&'a Target>) {
    for step in steps {
        match &step.action {
            StepAction::Click { target }
            | StepAction::Fill { target, .. }
            | StepAction::Select { target, .. }
            | StepAction::AssertText { target, .. }
            | StepAction::AssertVisible { target, .. }
            | StepAction::Wait { target, .. }
            | StepAction::Capture { target, .. } => out.push(target),
            StepAction::ClickInFrame { frame, target } => {
                out.push(frame);
                out.push(target);
            }
            StepAction::Optional { gate, steps } => {
                out.push(gate);
                collect_targets(steps, out);
            }
            StepAction::Retry { steps, .. } => collect_targets(steps, out),
            StepAction::Repeat { between, steps, .. } => {
                collect_targets(between, out);
                collect_targets(steps, out);
            }
            StepAction::Navigate { .. }
            | StepAction::ArrowDown
            | StepAction::Enter
            | StepAction::Pause { .. }
            | StepAction::Screenshot { .. }
            | StepAction::WriteBack { .. }
            | StepAction::Reload { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_order() {
        let flow = Flow::new("login")
            .navigate("Open login page", "/login")
            .fill("Type username", "Login.username", ValueSource::Username)
            .click("Submit", "Login.submit");
        let descriptions: Vec<_> = flow.steps.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Open login page", "Type username", "Submit"]);
    }

    #[test]
    fn test_targets_include_nested_steps() {
        let flow = Flow::new("reg")
            .optional("Guardian", "Guardian.section", |f| {
                f.fill("Name", "Guardian.name", ValueSource::row("dt", "guardianName"))
            })
            .retry("Confirm", RetryPolicy::best_effort(3), |f| f.click("Ok", "Welcome.proceed"));
        let keys: Vec<_> = flow.targets().iter().filter_map(|t| t.registry_key()).collect();
        assert_eq!(keys, vec!["Guardian.section", "Guardian.name", "Welcome.proceed"]);
    }

    #[test]
    fn test_step_serializes_flat() {
        let flow = Flow::new("x").click("Save", "Registration.save");
        let json = serde_json::to_value(&flow.steps[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "description": "Save",
                "action": "click",
                "target": { "key": "Registration.save" }
            })
        );
    }
}
