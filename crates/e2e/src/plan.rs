//! Declarative JSON test plan

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// Token replaced by the iteration number in test case names
pub const ITERATION_TOKEN: &str = "{iteration}";

/// A complete test plan parsed from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPlan {
    pub test_cases: Vec<TestCaseDescriptor>,
}

/// One declarative test case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseDescriptor {
    #[serde(rename = "testCaseID")]
    pub test_case_id: String,

    /// Display name, may contain `{iteration}`
    pub test_case_name: String,

    /// Test group inside the spec file
    pub test_name: String,

    /// Spec file the case belongs to
    pub spec_file: String,

    #[serde(default = "default_iteration_count")]
    pub iteration_count: u32,

    /// Only descriptors with `execute = true` are instantiated
    #[serde(default)]
    pub execute: bool,

    #[serde(default)]
    pub data_tables: Vec<DataTableBinding>,
}

fn default_iteration_count() -> u32 {
    1
}

/// Fixture row bound to a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTableBinding {
    pub name: String,
    #[serde(default)]
    pub pick_index: usize,
}

impl TestPlan {
    /// Parse a test plan from a JSON string
    pub fn from_json(json: &str) -> E2eResult<Self> {
        let plan: Self = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Load a plan from file. A missing plan is fatal.
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        if !path.exists() {
            return Err(E2eError::PlanNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Check the structural rules the JSON schema cannot express
    pub fn validate(&self) -> E2eResult<()> {
        let mut seen = HashSet::new();

        for case in &self.test_cases {
            if case.test_case_id.trim().is_empty() {
                return Err(E2eError::Config("test case with empty testCaseID".into()));
            }
            if !seen.insert(case.test_case_id.as_str()) {
                return Err(E2eError::Config(format!(
                    "duplicate testCaseID '{}'",
                    case.test_case_id
                )));
            }
            if case.spec_file.trim().is_empty() || case.test_name.trim().is_empty() {
                return Err(E2eError::Config(format!(
                    "test case '{}' needs both specFile and testName",
                    case.test_case_id
                )));
            }
            if case.iteration_count == 0 {
                return Err(E2eError::Config(format!(
                    "test case '{}' has iterationCount 0",
                    case.test_case_id
                )));
            }
            let mut tables = HashSet::new();
            for table in &case.data_tables {
                if !tables.insert(table.name.as_str()) {
                    return Err(E2eError::Config(format!(
                        "test case '{}' binds data table '{}' twice",
                        case.test_case_id, table.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Descriptors a runner for `(spec_file, test_name)` instantiates
    pub fn select<'a>(&'a self, spec_file: &str, test_name: &str) -> Vec<&'a TestCaseDescriptor> {
        self.test_cases
            .iter()
            .filter(|c| c.is_selected(spec_file, test_name))
            .collect()
    }

    /// Distinct `(spec_file, test_name)` groups with at least one enabled case
    pub fn enabled_groups(&self) -> Vec<(String, String)> {
        let mut groups: Vec<(String, String)> = Vec::new();
        for case in self.test_cases.iter().filter(|c| c.execute) {
            let key = (case.spec_file.clone(), case.test_name.clone());
            if !groups.contains(&key) {
                groups.push(key);
            }
        }
        groups
    }
}

impl TestCaseDescriptor {
    pub fn is_selected(&self, spec_file: &str, test_name: &str) -> bool {
        self.execute && self.spec_file == spec_file && self.test_name == test_name
    }

    /// Name of the instance for a 1-based iteration
    pub fn instance_name(&self, iteration: u32) -> String {
        let base = format!("{} - {}", self.test_case_id, self.test_case_name);
        if base.contains(ITERATION_TOKEN) {
            base.replace(ITERATION_TOKEN, &iteration.to_string())
        } else if self.iteration_count > 1 {
            format!("{} [iteration {}]", base, iteration)
        } else {
            base
        }
    }
}
