//! HMS E2E Test Suite
//!
//! Data-driven browser tests for the hospital patient-management web app:
//! - Reads a declarative JSON test plan and binds fixture rows to it
//! - Resolves symbolic `Page.Element` locators from YAML files
//! - Runs business flows (login, registration, admission, bed, discharge)
//!   as explicit step lists
//! - Drives Playwright through a Node.js driver process per browser context
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── expand(plan, spec_file, test_name) -> [TestInstance] │
//! │    ├── run_instance(scenario, instance) -> TestResult       │
//! │    └── write_results(suite) -> test-results.json            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (chain of Flows)                                  │
//! │    └── Session                                              │
//! │          ├── bound rows  (FixtureStore / FixtureWriter)     │
//! │          ├── data bag    (captured values, appointment ids) │
//! │          └── Actions ── LocatorRegistry ── BrowserEngine    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserEngine                                              │
//! │    ├── PlaywrightEngine  (node driver, JSON lines)          │
//! │    └── RecordingEngine   (dry run, tests)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod appointment;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixture;
pub mod flow;
pub mod flows;
pub mod locator;
pub mod plan;
pub mod playwright;
pub mod preflight;
pub mod recorder;
pub mod retry;
pub mod runner;
pub mod scenario;
pub mod session;

pub use error::{E2eError, E2eResult};
pub use flows::builtin_scenarios;
pub use plan::{TestCaseDescriptor, TestPlan};
pub use recorder::RecordingEngine;
pub use runner::{RunnerConfig, TestResult, TestRunner, TestSuiteResult};
