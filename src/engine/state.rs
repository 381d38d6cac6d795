use serde::Serialize;

/// Phase of an expansion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Scanning,
    Expanding,
    Done,
}

/// Per-run counters; discarded when the run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Consecutive scans that found nothing.
    pub idle_streak: u32,
    /// Loop iterations used so far.
    pub safety_budget: u32,
    pub successes: u32,
    pub failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    IdleExhausted,
    SafetyCap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    NothingToExpand,
    Completed { expanded: u32 },
    SafetyStop { expanded: u32 },
    Failed { error: String },
}

impl RunOutcome {
    pub fn from_stop(stop: StopReason, counters: &Counters) -> Self {
        if counters.successes == 0 && counters.failures == 0 {
            return RunOutcome::NothingToExpand;
        }
        match stop {
            StopReason::IdleExhausted => RunOutcome::Completed {
                expanded: counters.successes,
            },
            StopReason::SafetyCap => RunOutcome::SafetyStop {
                expanded: counters.successes,
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }

    /// Terminal status line handed to the status presenter.
    pub fn message(&self) -> String {
        match self {
            RunOutcome::NothingToExpand => "Expander: nothing to expand.".into(),
            RunOutcome::Completed { expanded } => {
                format!("Expander: done. Expanded {expanded} {}.", plural(*expanded, "control", "controls"))
            }
            RunOutcome::SafetyStop { expanded } => format!(
                "Expander: safety stop after {expanded} {}.",
                plural(*expanded, "expansion", "expansions")
            ),
            RunOutcome::Failed { .. } => "Expander: error, see logs for details.".into(),
        }
    }
}

pub(crate) fn plural<'s>(count: u32, one: &'s str, many: &'s str) -> &'s str {
    if count == 1 {
        one
    } else {
        many
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub outcome: RunOutcome,
    pub counters: Counters,
}
