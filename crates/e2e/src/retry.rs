//! Fixed-depth retry policy for flaky UI steps

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{E2eError, E2eResult};

/// What happens once every attempt has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exhaustion {
    /// Surface the last error
    Propagate,
    /// Log the last error and carry on as if the step passed
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    pub on_exhaustion: Exhaustion,
}

impl RetryPolicy {
    pub fn propagate(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            on_exhaustion: Exhaustion::Propagate,
        }
    }

    /// Best-effort: the final failure is logged and swallowed
    pub fn best_effort(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            on_exhaustion: Exhaustion::Suppress,
        }
    }

    /// Whether a failure on `attempt` (1-based) earns another try
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts
    }

    /// Settle the outcome after the last attempt failed
    pub fn exhausted(&self, label: &str, error: E2eError) -> E2eResult<()> {
        match self.on_exhaustion {
            Exhaustion::Propagate => Err(error),
            Exhaustion::Suppress => {
                warn!(
                    "'{}' still failing after {} attempt(s), continuing: {}",
                    label, self.attempts, error
                );
                Ok(())
            }
        }
    }
}
