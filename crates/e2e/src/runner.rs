//! Test-case runner: plan selection, iteration expansion and per-instance
//! browser contexts

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::appointment::{AppointmentBooker, HttpAppointmentBooker};
use crate::config::GlobalConfig;
use crate::engine::BrowserEngine;
use crate::error::E2eResult;
use crate::fixture::{BoundRow, FixtureStore, FixtureWriter};
use crate::locator::LocatorRegistry;
use crate::plan::TestPlan;
use crate::scenario::{Scenario, ScenarioRegistry};
use crate::session::{Session, SessionDeps, StepResult};

/// One runnable test: a descriptor at a given iteration with its rows bound
#[derive(Debug, Clone)]
pub struct TestInstance {
    pub name: String,
    pub test_case_id: String,
    pub iteration: u32,
    pub tables: BTreeMap<String, BoundRow>,
}

/// Result of running a single test instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub test_case_id: String,
    pub iteration: u32,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

/// Result of running a set of instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub base_url: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Expand the selected descriptors of a plan into runnable instances.
///
/// Rows are bound once per descriptor, before anything runs; a binding
/// error aborts the whole expansion.
pub fn expand(
    plan: &TestPlan,
    spec_file: &str,
    test_name: &str,
    store: &FixtureStore,
) -> E2eResult<Vec<TestInstance>> {
    let mut instances = Vec::new();

    for descriptor in plan.select(spec_file, test_name) {
        let mut tables = BTreeMap::new();
        for binding in &descriptor.data_tables {
            let row = store.row(&binding.name, binding.pick_index)?;
            tables.insert(binding.name.clone(), row);
        }

        for iteration in 1..=descriptor.iteration_count {
            instances.push(TestInstance {
                name: descriptor.instance_name(iteration),
                test_case_id: descriptor.test_case_id.clone(),
                iteration,
                tables: tables.clone(),
            });
        }
    }

    debug!(
        "Expanded {} instance(s) for {} / {}",
        instances.len(),
        spec_file,
        test_name
    );
    Ok(instances)
}

/// Paths and selection for a run, built once at start-up
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub config_path: PathBuf,
    pub environment: String,
    pub plan_path: PathBuf,
    pub fixtures_dir: PathBuf,
    pub locators_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Rehearse against a recording engine instead of a live application
    pub dry_run: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/global.json"),
            environment: "local".to_string(),
            plan_path: PathBuf::from("test-plans/hms.json"),
            fixtures_dir: PathBuf::from("fixtures"),
            locators_dir: PathBuf::from("locators"),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            output_dir: PathBuf::from("test-results"),
            dry_run: false,
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    plan: TestPlan,
    engine: Arc<dyn BrowserEngine>,
    scenarios: ScenarioRegistry,
    deps: SessionDeps,
    output_dir: PathBuf,
}

impl TestRunner {
    pub fn new(
        plan: TestPlan,
        engine: Arc<dyn BrowserEngine>,
        scenarios: ScenarioRegistry,
        deps: SessionDeps,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            plan,
            engine,
            scenarios,
            deps,
            output_dir,
        }
    }

    /// Load configuration, plan and locators from disk.
    ///
    /// Without an explicit `booker`, appointments go to the environment's
    /// REST API when it has one.
    pub fn load(
        config: &RunnerConfig,
        engine: Arc<dyn BrowserEngine>,
        scenarios: ScenarioRegistry,
        booker: Option<Arc<dyn AppointmentBooker>>,
    ) -> E2eResult<Self> {
        let global = GlobalConfig::load(&config.config_path)?;
        let env = global.environment(&config.environment, &config.config_path)?;
        let registry = LocatorRegistry::load_dir(&config.locators_dir)?;
        let plan = TestPlan::from_file(&config.plan_path)?;

        let booker = match booker {
            Some(booker) => Some(booker),
            None => match &env.api_base_url {
                Some(api) => Some(Arc::new(HttpAppointmentBooker::new(api, &env.username, &env.password)?)
                    as Arc<dyn AppointmentBooker>),
                None => None,
            },
        };

        std::fs::create_dir_all(&config.screenshot_dir)?;

        info!(
            "Environment '{}' at {} ({} locator(s), {} test case(s))",
            config.environment,
            env.base_url,
            registry.len(),
            plan.test_cases.len()
        );

        let deps = SessionDeps {
            registry: Arc::new(registry),
            env: Arc::new(env),
            store: FixtureStore::new(&config.fixtures_dir),
            writer: FixtureWriter::new(&config.fixtures_dir),
            screenshot_dir: config.screenshot_dir.clone(),
            booker,
            dry_run: config.dry_run,
        };

        Ok(Self::new(plan, engine, scenarios, deps, config.output_dir.clone()))
    }

    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    pub fn expand(&self, spec_file: &str, test_name: &str) -> E2eResult<Vec<TestInstance>> {
        expand(&self.plan, spec_file, test_name, &self.deps.store)
    }

    /// Run every enabled `(spec_file, test_name)` group of the plan
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        self.run_groups(&self.plan.enabled_groups()).await
    }

    /// Run the instances of one `(spec_file, test_name)` group
    pub async fn run_suite(&self, spec_file: &str, test_name: &str) -> E2eResult<TestSuiteResult> {
        self.run_groups(&[(spec_file.to_string(), test_name.to_string())])
            .await
    }

    async fn run_groups(&self, groups: &[(String, String)]) -> E2eResult<TestSuiteResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        // Resolve and bind everything first so start-up errors abort the run
        let mut work = Vec::new();
        for (spec_file, test_name) in groups {
            let scenario = self.scenarios.get(spec_file, test_name)?;
            let instances = self.expand(spec_file, test_name)?;
            work.push((scenario, instances));
        }

        let total: usize = work.iter().map(|(_, i)| i.len()).sum();
        info!("Running {} test(s)...", total);

        let mut results = Vec::with_capacity(total);
        for (scenario, instances) in work {
            for instance in instances {
                results.push(self.run_instance(scenario.as_ref(), instance).await);
            }
        }

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!("Test Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        Ok(TestSuiteResult {
            run_id,
            started_at,
            base_url: self.deps.env.base_url.clone(),
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Run one instance in its own browser context.
    ///
    /// Never fails: scenario errors become a failed result, and the context
    /// is closed on every path once it was opened.
    pub async fn run_instance(&self, scenario: &dyn Scenario, instance: TestInstance) -> TestResult {
        let start = Instant::now();
        let TestInstance {
            name,
            test_case_id,
            iteration,
            tables,
        } = instance;
        debug!("Running test: {}", name);

        let page = match self.engine.new_context(&name).await {
            Ok(page) => page,
            Err(e) => {
                error!("✗ {} - {}", name, e);
                return TestResult {
                    name,
                    test_case_id,
                    iteration,
                    success: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                    steps: vec![],
                    error: Some(e.to_string()),
                };
            }
        };

        let mut session = Session::new(name.clone(), page, self.deps.clone(), tables);
        let outcome = scenario.run(&mut session).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser context for '{}': {}", name, e);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let error = match outcome {
            Ok(()) => {
                info!("✓ {} ({} ms)", name, duration_ms);
                None
            }
            Err(e) => {
                error!("✗ {} - {}", name, e);
                Some(e.to_string())
            }
        };

        TestResult {
            name,
            test_case_id,
            iteration,
            success: error.is_none(),
            duration_ms,
            steps: session.into_steps(),
            error,
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
