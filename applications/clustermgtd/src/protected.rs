//! Partial-failure accounting (§4.6 step 4): consecutive iterations with at
//! least `protected_failure_count` bootstrap failures on dynamic nodes trip
//! the fleet into `Protected`, which halts further launches until an
//! operator clears it.

#[derive(Debug, Default)]
pub struct ProtectedModeCounter {
    consecutive_failing_iterations: u32,
}

impl ProtectedModeCounter {
    /// Records this iteration's dynamic-node bootstrap-failure count and
    /// returns true iff the threshold has now been met for a consecutive
    /// run of iterations.
    pub fn record(&mut self, dynamic_bootstrap_failures: usize, threshold: u32) -> bool {
        if dynamic_bootstrap_failures as u32 >= threshold {
            self.consecutive_failing_iterations += 1;
        } else {
            self.consecutive_failing_iterations = 0;
        }
        self.consecutive_failing_iterations >= threshold
    }

    pub fn reset(&mut self) {
        self.consecutive_failing_iterations = 0;
    }
}
