//! Consistency of the shipped plan, fixtures and locator files

use std::path::PathBuf;
use std::sync::Arc;

use test_case::test_case;

use hms_e2e::appointment::{AppointmentBooker, StaticBooker};
use hms_e2e::fixture::FixtureStore;
use hms_e2e::flow::{Flow, Target};
use hms_e2e::flows::{admission, login, registration};
use hms_e2e::locator::{LocatorKey, LocatorRegistry};
use hms_e2e::{builtin_scenarios, RecordingEngine, RunnerConfig, TestPlan, TestRunner};

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn shipped_flows() -> Vec<Flow> {
    let store = FixtureStore::new(manifest_dir().join("fixtures"));
    let single = store.row(registration::TABLE, 0).unwrap();
    let twins = store.row(registration::TABLE, 1).unwrap();
    assert!(registration::is_twin_registration(&twins));

    vec![
        login::welcome(),
        login::logout(),
        registration::new_patient(&single),
        registration::new_patient(&twins),
        registration::existing_patient(),
        admission::request_for_admission(),
        admission::allocate_bed(),
        admission::cancel_admission(),
        admission::discharge(),
    ]
}

#[test]
fn every_flow_target_is_a_shipped_locator() {
    let registry = LocatorRegistry::load_dir(&manifest_dir().join("locators")).unwrap();

    for flow in shipped_flows() {
        for target in flow.targets() {
            let key: LocatorKey = target.registry_key().unwrap().parse().unwrap();
            let template = registry
                .resolve(&key)
                .unwrap_or_else(|e| panic!("flow '{}': {}", flow.name, e));

            match target {
                Target::Param { token, .. } => assert_eq!(
                    template.placeholder(),
                    Some(token.as_str()),
                    "flow '{}': {} is substituted with '{}'",
                    flow.name,
                    key,
                    token
                ),
                _ => assert!(
                    template.placeholder().is_none(),
                    "flow '{}': {} needs a parameter",
                    flow.name,
                    key
                ),
            }
        }
    }
}

#[test]
fn every_enabled_group_has_a_scenario() {
    let plan = TestPlan::from_file(&manifest_dir().join("test-plans/hms.json")).unwrap();
    let scenarios = builtin_scenarios();

    let groups = plan.enabled_groups();
    assert!(!groups.is_empty());
    for (spec_file, test_name) in groups {
        assert!(scenarios.get(&spec_file, &test_name).is_ok(), "{spec_file} / {test_name}");
    }
}

#[test]
fn rfa01_is_shipped_with_two_iterations() {
    let plan = TestPlan::from_file(&manifest_dir().join("test-plans/hms.json")).unwrap();
    let rfa = plan
        .test_cases
        .iter()
        .find(|c| c.test_case_id == "RFA-01")
        .unwrap();
    assert!(rfa.execute);
    assert_eq!(rfa.iteration_count, 2);
    assert_eq!(rfa.data_tables[0].name, admission::TABLE);
}

#[test_case("local")]
#[test_case("qa")]
#[test_case("uat")]
#[tokio::test]
async fn dry_run_of_shipped_plan_passes_without_side_effects(environment: &str) {
    let scratch = tempfile::tempdir().unwrap();
    let fixtures = scratch.path().join("fixtures");
    std::fs::create_dir_all(&fixtures).unwrap();
    for entry in std::fs::read_dir(manifest_dir().join("fixtures")).unwrap() {
        let path = entry.unwrap().path();
        std::fs::copy(&path, fixtures.join(path.file_name().unwrap())).unwrap();
    }
    let before = std::fs::read_to_string(fixtures.join("dt_requestForAdmission.json")).unwrap();

    let config = RunnerConfig {
        config_path: manifest_dir().join("config/global.json"),
        environment: environment.to_string(),
        plan_path: manifest_dir().join("test-plans/hms.json"),
        fixtures_dir: fixtures.clone(),
        locators_dir: manifest_dir().join("locators"),
        screenshot_dir: scratch.path().join("results/screenshots"),
        output_dir: scratch.path().join("results"),
        dry_run: true,
    };
    let engine = RecordingEngine::all_present();
    let booker: Arc<dyn AppointmentBooker> = Arc::new(StaticBooker::default());
    let runner = TestRunner::load(&config, Arc::new(engine.clone()), builtin_scenarios(), Some(booker)).unwrap();

    let suite = runner.run_all().await.unwrap();
    for result in &suite.results {
        assert!(result.success, "{}: {:?}", result.name, result.error);
    }
    assert!(suite.total > 0);
    assert_eq!(engine.contexts_opened(), suite.total);
    assert_eq!(engine.contexts_closed(), suite.total);

    let after = std::fs::read_to_string(fixtures.join("dt_requestForAdmission.json")).unwrap();
    assert_eq!(before, after);
}
