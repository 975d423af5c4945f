//! Scheduler knobs, grouped so tests can vary them.

use serde::{Deserialize, Serialize};

use crate::tier::{Tier, TierCatalog};

/// All tunables consulted by the allocator and the executors. The
/// defaults are the reference values; every property of the cascade and
/// the ROI rule should hold for other settings too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub catalog: TierCatalog,
    /// Judge score at or above which no upgrade is attempted.
    pub quality_threshold: f64,
    /// Minimum expected-lift-per-dollar to authorise an escalation.
    pub min_roi: f64,
    /// Fraction of the post-planning budget held back for the terminal
    /// subtask.
    pub synthesis_reserve_fraction: f64,
    /// Smallest per-subtask output cap the allocator may scale down to.
    pub token_floor: u32,
    pub lift_fast_to_verify: f64,
    pub lift_verify_to_deep: f64,
    pub lift_fast_to_deep: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            catalog: TierCatalog::default(),
            quality_threshold: 6.0,
            min_roi: 50.0,
            synthesis_reserve_fraction: 0.35,
            token_floor: 128,
            lift_fast_to_verify: 2.0,
            lift_verify_to_deep: 1.5,
            lift_fast_to_deep: 3.0,
        }
    }
}

impl SchedulerConfig {
    /// Expected quality lift for a tier escalation. Point estimates, not
    /// calibrated per task.
    pub fn expected_lift(&self, from: Tier, to: Tier) -> f64 {
        match (from, to) {
            (Tier::Fast, Tier::Verify) => self.lift_fast_to_verify,
            (Tier::Verify, Tier::Deep) => self.lift_verify_to_deep,
            (Tier::Fast, Tier::Deep) => self.lift_fast_to_deep,
            // Downgrades and no-ops carry no expected lift.
            _ => 0.0,
        }
    }
}
