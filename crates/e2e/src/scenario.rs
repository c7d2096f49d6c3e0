//! Scenarios: the flow chain a selected test case runs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{E2eError, E2eResult};
use crate::session::Session;

#[async_trait]
pub trait Scenario: Send + Sync {
    /// Drive one test instance. Any error fails the instance.
    async fn run(&self, session: &mut Session) -> E2eResult<()>;
}

/// Maps `(spec_file, test_name)` to a scenario
#[derive(Clone, Default)]
pub struct ScenarioRegistry {
    entries: HashMap<(String, String), Arc<dyn Scenario>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec_file: &str, test_name: &str, scenario: Arc<dyn Scenario>) {
        self.entries
            .insert((spec_file.to_string(), test_name.to_string()), scenario);
    }

    pub fn with(mut self, spec_file: &str, test_name: &str, scenario: impl Scenario + 'static) -> Self {
        self.register(spec_file, test_name, Arc::new(scenario));
        self
    }

    pub fn get(&self, spec_file: &str, test_name: &str) -> E2eResult<Arc<dyn Scenario>> {
        self.entries
            .get(&(spec_file.to_string(), test_name.to_string()))
            .cloned()
            .ok_or_else(|| E2eError::ScenarioNotFound {
                spec_file: spec_file.to_string(),
                test_name: test_name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{builtin_scenarios, ADMISSION_SPEC};

    #[test]
    fn test_builtin_lookup() {
        let registry = builtin_scenarios();
        assert_eq!(registry.len(), 6);
        assert!(registry.get(ADMISSION_SPEC, "Allocate Bed").is_ok());

        let err = registry.get(ADMISSION_SPEC, "Transfer Ward").err().unwrap();
        assert!(matches!(err, E2eError::ScenarioNotFound { ref test_name, .. } if test_name == "Transfer Ward"));
        assert!(err.is_fatal());
    }
}
