use crate::config::LimitsConfig;
use crate::engine::state::{Counters, StopReason};

/// Tracks the idle streak and safety budget of one run.
pub struct LoopController {
    idle_limit: u32,
    safety_limit: u32,
    counters: Counters,
}

impl LoopController {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            idle_limit: limits.idle_limit,
            safety_limit: limits.safety_limit,
            counters: Counters::default(),
        }
    }

    pub fn record_empty_scan(&mut self) {
        self.counters.idle_streak += 1;
        self.counters.safety_budget += 1;
    }

    /// Spends one iteration of the safety budget on a candidate, before it
    /// is handed to the executor.
    pub fn begin_attempt(&mut self) {
        self.counters.idle_streak = 0;
        self.counters.safety_budget += 1;
    }

    pub fn record_result(&mut self, success: bool) {
        if success {
            self.counters.successes += 1;
        } else {
            self.counters.failures += 1;
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.counters.idle_streak >= self.idle_limit {
            Some(StopReason::IdleExhausted)
        } else if self.counters.safety_budget >= self.safety_limit {
            Some(StopReason::SafetyCap)
        } else {
            None
        }
    }

    pub fn idle_limit(&self) -> u32 {
        self.idle_limit
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(idle_limit: u32, safety_limit: u32) -> LimitsConfig {
        LimitsConfig {
            idle_limit,
            safety_limit,
            ..LimitsConfig::default()
        }
    }

    #[test]
    fn idle_streak_resets_on_attempts() {
        let mut ctrl = LoopController::new(&limits(2, 100));
        ctrl.record_empty_scan();
        assert_eq!(ctrl.stop_reason(), None);
        ctrl.begin_attempt();
        ctrl.record_result(true);
        ctrl.record_empty_scan();
        assert_eq!(ctrl.stop_reason(), None);
        ctrl.record_empty_scan();
        assert_eq!(ctrl.stop_reason(), Some(StopReason::IdleExhausted));

        let c = ctrl.counters();
        assert_eq!((c.safety_budget, c.successes, c.failures), (4, 1, 0));
    }

    #[test]
    fn safety_cap_bounds_busy_runs() {
        let mut ctrl = LoopController::new(&limits(2, 5));
        let mut iterations = 0;
        while ctrl.stop_reason().is_none() {
            ctrl.begin_attempt();
            ctrl.record_result(iterations % 2 == 0);
            iterations += 1;
        }
        assert_eq!(iterations, 5);
        assert_eq!(ctrl.stop_reason(), Some(StopReason::SafetyCap));
        assert_eq!(ctrl.counters().successes + ctrl.counters().failures, 5);
    }

    #[test]
    fn budget_is_spent_when_an_attempt_starts() {
        let mut ctrl = LoopController::new(&limits(3, 1));
        ctrl.record_empty_scan();
        ctrl.begin_attempt();
        let c = ctrl.counters();
        assert_eq!((c.idle_streak, c.safety_budget), (0, 2));
        assert_eq!((c.successes, c.failures), (0, 0));
        assert_eq!(ctrl.stop_reason(), Some(StopReason::SafetyCap));
    }
}
