//! Scenario runs against the recording engine
//!
//! Each test copies the shipped fixtures into a scratch directory, loads the
//! shipped locator files and drives the built-in scenarios through a
//! scripted `RecordingEngine`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use test_case::test_case;

use hms_e2e::appointment::{AppointmentBooker, StaticBooker};
use hms_e2e::config::EnvironmentConfig;
use hms_e2e::fixture::{FixtureStore, FixtureWriter};
use hms_e2e::flow::Flow;
use hms_e2e::locator::LocatorRegistry;
use hms_e2e::retry::RetryPolicy;
use hms_e2e::scenario::{Scenario, ScenarioRegistry};
use hms_e2e::session::{Session, SessionDeps, StepOutcome};
use hms_e2e::{builtin_scenarios, E2eError, E2eResult, RecordingEngine, TestPlan, TestRunner};

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

struct Harness {
    dir: tempfile::TempDir,
    registry: Arc<LocatorRegistry>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixtures = dir.path().join("fixtures");
        std::fs::create_dir_all(&fixtures).unwrap();
        for entry in std::fs::read_dir(manifest_dir().join("fixtures")).unwrap() {
            let path = entry.unwrap().path();
            std::fs::copy(&path, fixtures.join(path.file_name().unwrap())).unwrap();
        }
        let registry = LocatorRegistry::load_dir(&manifest_dir().join("locators")).unwrap();
        Self {
            dir,
            registry: Arc::new(registry),
        }
    }

    fn fixtures(&self) -> PathBuf {
        self.dir.path().join("fixtures")
    }

    /// Concrete selector of a non-templated locator
    fn sel(&self, key: &str) -> String {
        let key = key.parse().unwrap();
        self.registry.resolve(&key).unwrap().concrete().unwrap().0
    }

    fn deps(&self, dry_run: bool) -> SessionDeps {
        let env: EnvironmentConfig = serde_json::from_value(json!({
            "baseUrl": "http://hms.test",
            "username": "e2e.clerk",
            "password": "changeme",
            "locatorCheck": { "defaultTimeout": 50, "retries": 0 }
        }))
        .unwrap();
        let booker: Arc<dyn AppointmentBooker> = Arc::new(StaticBooker::default());
        SessionDeps {
            registry: self.registry.clone(),
            env: Arc::new(env),
            store: FixtureStore::new(self.fixtures()),
            writer: FixtureWriter::new(self.fixtures()),
            screenshot_dir: self.dir.path().join("screenshots"),
            booker: Some(booker),
            dry_run,
        }
    }

    fn runner(&self, plan: Value, engine: &RecordingEngine) -> TestRunner {
        let plan = TestPlan::from_json(&plan.to_string()).unwrap();
        TestRunner::new(
            plan,
            Arc::new(engine.clone()),
            builtin_scenarios(),
            self.deps(false),
            self.dir.path().join("results"),
        )
    }

    fn fixture_row(&self, dataset: &str, index: usize) -> Value {
        let path = self.fixtures().join(format!("{dataset}.json"));
        let rows: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        rows[index].clone()
    }

    /// Engine where the whole app is present and status labels read as the
    /// flows expect
    fn happy_engine(&self) -> RecordingEngine {
        RecordingEngine::all_present()
            .with_text(&self.sel("Admission.status"), "Requested")
            .with_text(&self.sel("Admission.requestNo"), "RFA-000123")
            .with_text(&self.sel("Registration.mrnLabel"), "MRN0009999")
    }
}

fn single_case(id: &str, name: &str, test_name: &str, spec_file: &str, iterations: u32, table: &str, pick: usize) -> Value {
    json!({ "testCases": [{
        "testCaseID": id,
        "testCaseName": name,
        "testName": test_name,
        "specFile": spec_file,
        "iterationCount": iterations,
        "execute": true,
        "dataTables": [{ "name": table, "pickIndex": pick }]
    }]})
}

fn rfa01() -> Value {
    single_case(
        "RFA-01",
        "Create Request For Admission",
        "Create Request For Admission",
        "admission.spec",
        2,
        "dt_requestForAdmission",
        0,
    )
}

#[test_case(false ; "flow passes")]
#[test_case(true ; "flow throws")]
#[tokio::test]
async fn rfa01_runs_two_instances_in_their_own_contexts(broken_submit: bool) {
    let harness = Harness::new();
    let mut engine = harness.happy_engine();
    if broken_submit {
        engine = engine.with_broken(&harness.sel("Admission.submit"));
    }
    let runner = harness.runner(rfa01(), &engine);

    let suite = runner
        .run_suite("admission.spec", "Create Request For Admission")
        .await
        .unwrap();

    let names: Vec<_> = suite.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "RFA-01 - Create Request For Admission [iteration 1]",
            "RFA-01 - Create Request For Admission [iteration 2]",
        ]
    );
    assert_eq!(engine.contexts_opened(), 2);
    assert_eq!(engine.contexts_closed(), 2);
    assert_eq!(suite.failed, if broken_submit { 2 } else { 0 });
    assert_eq!(suite.all_passed(), !broken_submit);
}

#[tokio::test]
async fn booked_appointment_feeds_the_admission_form() {
    let harness = Harness::new();
    let engine = harness.happy_engine();
    let runner = harness.runner(rfa01(), &engine);

    let suite = runner
        .run_suite("admission.spec", "Create Request For Admission")
        .await
        .unwrap();
    assert!(suite.all_passed(), "{:?}", suite.results[0].error);

    assert_eq!(
        engine.filled(&harness.sel("Admission.appointmentRef")).as_deref(),
        Some("DRYRUN-APT-0001")
    );
    assert_eq!(engine.filled(&harness.sel("Admission.icNo")).as_deref(), Some("DRYRUN-IC-0001"));

    // captured request number is written back into the backing file
    let row = harness.fixture_row("dt_requestForAdmission", 0);
    assert_eq!(row["admissionRequestNo"], "RFA-000123");
}

#[tokio::test]
async fn no_appointment_requested_skips_booking_without_aborting() {
    let harness = Harness::new();
    let engine = harness.happy_engine();
    let plan = single_case(
        "RFA-02",
        "Request For Admission without appointment",
        "Create Request For Admission",
        "admission.spec",
        1,
        "dt_requestForAdmission",
        1,
    );
    let runner = harness.runner(plan, &engine);

    let suite = runner
        .run_suite("admission.spec", "Create Request For Admission")
        .await
        .unwrap();
    let result = &suite.results[0];
    assert!(result.success, "{:?}", result.error);

    assert!(result.steps.iter().all(|s| s.step_name != "Book appointment"));
    assert_eq!(engine.filled(&harness.sel("Admission.appointmentRef")), None);
    assert_eq!(engine.filled(&harness.sel("Admission.icNo")), None);

    let skipped: Vec<_> = result
        .steps
        .iter()
        .filter(|s| s.outcome == StepOutcome::Skipped)
        .map(|s| s.step_name.as_str())
        .collect();
    assert!(skipped.contains(&"Link booked appointment"));
    assert!(skipped.contains(&"Enter IC number from appointment"));

    // steps after the skipped ones still ran
    assert_eq!(engine.clicks_on(&harness.sel("Admission.submit")), 1);
}

#[test_case(true ; "guardian section shown")]
#[test_case(false ; "guardian section absent")]
#[tokio::test]
async fn guardian_details_follow_the_section_presence(section_shown: bool) {
    let harness = Harness::new();
    let mut engine = harness.happy_engine();
    if !section_shown {
        engine = engine.with_absent(&harness.sel("Guardian.section"));
    }
    let plan = single_case(
        "REG-03",
        "Register minor with guardian",
        "Register New Patient",
        "registration.spec",
        1,
        "dt_patientRegistration",
        2,
    );
    let runner = harness.runner(plan, &engine);

    let suite = runner.run_suite("registration.spec", "Register New Patient").await.unwrap();
    assert!(suite.all_passed(), "{:?}", suite.results[0].error);

    let guardian_name = engine.filled(&harness.sel("Guardian.name"));
    let guardian_phone = engine.filled(&harness.sel("Guardian.phone"));
    if section_shown {
        assert_eq!(guardian_name.as_deref(), Some("Lee Hock Seng"));
        assert!(guardian_phone.is_some());
    } else {
        assert_eq!(guardian_name, None);
        assert_eq!(guardian_phone, None);
    }
}

#[tokio::test]
async fn registration_records_mrn_and_reloads_fixture() {
    let harness = Harness::new();
    let engine = harness.happy_engine();
    let plan = single_case(
        "REG-01",
        "Register new adult patient",
        "Register New Patient",
        "registration.spec",
        1,
        "dt_patientRegistration",
        2,
    );
    let runner = harness.runner(plan, &engine);

    let suite = runner.run_suite("registration.spec", "Register New Patient").await.unwrap();
    assert!(suite.all_passed(), "{:?}", suite.results[0].error);

    assert_eq!(harness.fixture_row("dt_patientRegistration", 2)["mrn"], "MRN0009999");
    let screenshot = suite.results[0]
        .steps
        .iter()
        .find_map(|s| s.screenshot.as_ref())
        .unwrap();
    assert!(screenshot
        .path
        .ends_with("REG-01-Register-new-adult-patient-registration-complete.png"));
}

#[tokio::test]
async fn twin_birth_registers_both_babies() {
    let harness = Harness::new();
    let engine = harness.happy_engine();
    let plan = single_case(
        "REG-02",
        "Register newborn twins",
        "Register New Patient",
        "registration.spec",
        1,
        "dt_patientRegistration",
        1,
    );
    let runner = harness.runner(plan, &engine);

    let suite = runner.run_suite("registration.spec", "Register New Patient").await.unwrap();
    assert!(suite.all_passed(), "{:?}", suite.results[0].error);

    assert_eq!(engine.clicks_on(&harness.sel("Registration.save")), 2);
    assert_eq!(engine.clicks_on(&harness.sel("Registration.clearForm")), 1);
    assert_eq!(engine.filled(&harness.sel("Twin.motherMrn")).as_deref(), Some("MRN0000457"));
}

#[test_case(2, 4 ; "recovers within three attempts")]
#[test_case(u32::MAX, 6 ; "gives up quietly after three attempts")]
#[tokio::test]
async fn welcome_confirmation_is_retried(failures: u32, expected_clicks: usize) {
    let harness = Harness::new();
    let proceed = harness.sel("Welcome.proceed");
    let engine = harness.happy_engine().with_failing_click(&proceed, failures);
    let runner = harness.runner(rfa01(), &engine);

    let suite = runner
        .run_suite("admission.spec", "Create Request For Admission")
        .await
        .unwrap();

    // an unconfirmed welcome page does not fail the instance
    assert!(suite.all_passed());
    // two instances, each clicking until success or the third attempt
    assert_eq!(engine.clicks_on(&proceed), expected_clicks);
}

/// Welcome confirmation that must succeed within three attempts
struct StrictWelcome;

#[async_trait]
impl Scenario for StrictWelcome {
    async fn run(&self, session: &mut Session) -> E2eResult<()> {
        let flow = Flow::new("strict welcome")
            .retry("Confirm welcome page", RetryPolicy::propagate(3), |f| {
                f.click("Proceed past welcome notice", "Welcome.proceed")
            })
            .click("Open user menu", "Home.userMenu");
        session.run_flow(&flow).await
    }
}

#[tokio::test]
async fn propagating_retry_fails_the_instance_after_its_last_attempt() {
    let harness = Harness::new();
    let proceed = harness.sel("Welcome.proceed");
    let engine = harness.happy_engine().with_broken(&proceed);
    let plan = single_case(
        "WEL-01",
        "Strict welcome",
        "Strict Welcome",
        "welcome.spec",
        1,
        "dt_requestForAdmission",
        0,
    );
    let runner = TestRunner::new(
        TestPlan::from_json(&plan.to_string()).unwrap(),
        Arc::new(engine.clone()),
        ScenarioRegistry::new().with("welcome.spec", "Strict Welcome", StrictWelcome),
        harness.deps(false),
        harness.dir.path().join("results"),
    );

    let suite = runner.run_suite("welcome.spec", "Strict Welcome").await.unwrap();

    assert_eq!(suite.failed, 1);
    assert!(!suite.all_passed());
    assert_eq!(engine.clicks_on(&proceed), 3);
    // the step after the retry block never runs
    assert_eq!(engine.clicks_on(&harness.sel("Home.userMenu")), 0);
    assert_eq!(engine.contexts_opened(), 1);
    assert_eq!(engine.contexts_closed(), 1);
}

#[tokio::test]
async fn context_that_fails_to_open_fails_the_instance() {
    let harness = Harness::new();
    let engine = RecordingEngine::all_present().with_failing_open();
    let runner = harness.runner(rfa01(), &engine);

    let suite = runner
        .run_suite("admission.spec", "Create Request For Admission")
        .await
        .unwrap();
    assert_eq!(suite.failed, 2);
    assert!(suite.results[0].error.as_deref().unwrap().contains("cannot open context"));
    assert_eq!(engine.contexts_closed(), 0);
}

#[test_case(1 ; "single run")]
#[test_case(4 ; "four iterations")]
fn iterations_expand_to_numbered_instances(n: u32) {
    let harness = Harness::new();
    let plan = single_case(
        "REG-09",
        "Register run {iteration}",
        "Register New Patient",
        "registration.spec",
        n,
        "dt_patientRegistration",
        0,
    );
    let runner = harness.runner(plan, &RecordingEngine::new());

    let instances = runner.expand("registration.spec", "Register New Patient").unwrap();
    let expected: Vec<String> = (1..=n).map(|i| format!("REG-09 - Register run {i}")).collect();
    let names: Vec<String> = instances.into_iter().map(|i| i.name).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn disabled_descriptor_creates_no_instances() {
    let harness = Harness::new();
    let mut plan = rfa01();
    plan["testCases"][0]["execute"] = json!(false);
    let engine = RecordingEngine::all_present();
    let runner = harness.runner(plan, &engine);

    let suite = runner.run_all().await.unwrap();
    assert_eq!(suite.total, 0);
    assert_eq!(engine.contexts_opened(), 0);
}

#[tokio::test]
async fn unknown_scenario_aborts_the_run() {
    let harness = Harness::new();
    let plan = single_case("X-01", "Mystery", "Mystery", "mystery.spec", 1, "dt_patientRegistration", 0);
    let engine = RecordingEngine::all_present();
    let runner = harness.runner(plan, &engine);

    let err = runner.run_all().await.unwrap_err();
    assert!(matches!(err, E2eError::ScenarioNotFound { .. }));
    assert!(err.is_fatal());
    assert_eq!(engine.contexts_opened(), 0);
}

#[tokio::test]
async fn results_report_is_written() {
    let harness = Harness::new();
    let engine = harness.happy_engine();
    let runner = harness.runner(rfa01(), &engine);

    let suite = runner
        .run_suite("admission.spec", "Create Request For Admission")
        .await
        .unwrap();
    let path = runner.write_results(&suite).unwrap();

    let report: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(report["total"], 2);
    assert_eq!(report["results"][0]["test_case_id"], "RFA-01");
    assert!(report["results"][0]["steps"].as_array().unwrap().len() > 10);
    assert!(Path::new(&path).ends_with("test-results.json"));
}
