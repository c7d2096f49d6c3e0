//! Error types for the E2E suite

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Environment '{name}' not defined in {path}")]
    EnvironmentNotFound { name: String, path: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Test plan not found: {0}")]
    PlanNotFound(String),

    #[error("Fixture dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Fixture dataset '{dataset}' has {len} row(s), index {index} is out of range")]
    RowOutOfRange {
        dataset: String,
        index: usize,
        len: usize,
    },

    #[error("Fixture '{dataset}'[{index}] has no field '{field}'")]
    MissingField {
        dataset: String,
        index: usize,
        field: String,
    },

    #[error("Fixture table '{0}' is not bound for this test")]
    UnboundTable(String),

    #[error("Invalid locator key '{0}' (expected Page.Element)")]
    InvalidLocatorKey(String),

    #[error("Unknown locator: {0}")]
    UnknownLocator(String),

    #[error("Locator '{key}' still has unbound placeholder '{{{placeholder}}}'")]
    UnboundPlaceholder { key: String, placeholder: String },

    #[error("Locator not present after {timeout_ms} ms: {selector}")]
    LocatorNotPresent { selector: String, timeout_ms: u64 },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("No scenario registered for {spec_file} / {test_name}")]
    ScenarioNotFound { spec_file: String, test_name: String },

    #[error("Appointment API error: {0}")]
    Appointment(String),

    #[error("Application health check failed after {0} attempts")]
    HealthCheck(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Errors that must abort suite construction instead of failing a
    /// single test instance.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            E2eError::ConfigNotFound(_)
                | E2eError::EnvironmentNotFound { .. }
                | E2eError::Config(_)
                | E2eError::PlanNotFound(_)
                | E2eError::DatasetNotFound(_)
                | E2eError::RowOutOfRange { .. }
                | E2eError::ScenarioNotFound { .. }
                | E2eError::PlaywrightNotFound
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EXIT_FATAL
        } else {
            EXIT_FAILED
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Every test instance passed
pub const EXIT_PASSED: i32 = 0;
/// At least one instance failed, or the run broke after start-up
pub const EXIT_FAILED: i32 = 1;
/// The suite could not be set up
pub const EXIT_FATAL: i32 = 2;

/// Process exit code for a run outcome. Errors that are not ours
/// (runtime creation, argument checks) count as fatal.
pub fn exit_code(outcome: &anyhow::Result<bool>) -> i32 {
    match outcome {
        Ok(true) => EXIT_PASSED,
        Ok(false) => EXIT_FAILED,
        Err(e) => e
            .chain()
            .find_map(|cause| cause.downcast_ref::<E2eError>())
            .map(E2eError::exit_code)
            .unwrap_or(EXIT_FATAL),
    }
}
