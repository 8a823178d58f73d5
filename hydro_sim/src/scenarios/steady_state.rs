//! Normal operation: every hook is the baseline.

use super::{Scenario, ScenarioKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct SteadyState;

impl Scenario for SteadyState {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::SteadyState
    }
}
