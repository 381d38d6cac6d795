use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ExpanderConfig;
use crate::engine::loop_control::LoopController;
use crate::engine::state::{plural, RunOutcome, RunPhase, RunReport, StopReason};
use crate::engine::status::{StatusBus, StatusPhase};
use crate::errors::{ExpanderError, ExpanderResult};
use crate::executor::ExpansionExecutor;
use crate::perception::classifier::{Classifier, LabelRules};
use crate::perception::scanner::scan;
use crate::perception::selector::Selectors;
use crate::perception::traits::Page;
use crate::perception::types::{ProcessedSet, ScrollPosition};

/// Clears the running flag when the run ends, however it ends.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Expansion scheduler for one page. At most one run is active per
/// instance; overlapping invocations are dropped, not queued.
pub struct Expander {
    page: Arc<dyn Page>,
    config: ExpanderConfig,
    selectors: Selectors,
    rules: LabelRules,
    status: StatusBus,
    phase: watch::Sender<RunPhase>,
    running: AtomicBool,
}

impl Expander {
    pub fn new(page: Arc<dyn Page>, config: ExpanderConfig) -> ExpanderResult<Self> {
        if config.limits.idle_limit == 0 || config.limits.safety_limit == 0 {
            return Err(ExpanderError::Config(
                "idle_limit and safety_limit must be at least 1".into(),
            ));
        }
        let selectors = Selectors::compile(&config.selectors)?;
        let rules = LabelRules::compile(&config.labels)?;
        let (phase, _) = watch::channel(RunPhase::Idle);
        Ok(Self {
            page,
            config,
            selectors,
            rules,
            status: StatusBus::new(),
            phase,
            running: AtomicBool::new(false),
        })
    }

    pub fn status(&self) -> &StatusBus {
        &self.status
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one expansion pass over the page. Returns `None` without doing
    /// anything when a pass is already in progress.
    pub async fn run(&self) -> Option<RunReport> {
        let Some(guard) = RunGuard::acquire(&self.running) else {
            tracing::debug!("expansion run already in progress; ignoring invocation");
            return None;
        };

        let run_id = Uuid::new_v4();
        let report = self
            .run_guarded(run_id)
            .instrument(tracing::info_span!("expansion_run", %run_id))
            .await;
        drop(guard);

        let phase = if report.outcome.is_error() {
            StatusPhase::Error
        } else {
            StatusPhase::Finish
        };
        self.status.publish(run_id, phase, report.outcome.message());
        Some(report)
    }

    async fn run_guarded(&self, run_id: Uuid) -> RunReport {
        self.status.publish(run_id, StatusPhase::Show, "Expander: starting…");
        let origin = self.page.scroll_position();
        let mut ctrl = LoopController::new(&self.config.limits);

        let result = self.drive(run_id, &mut ctrl).await;

        if let Err(e) = self.page.scroll_to(origin) {
            tracing::warn!(error = %e, "failed to restore scroll position");
        }
        self.phase.send_replace(RunPhase::Done);

        let counters = *ctrl.counters();
        let outcome = match result {
            Ok(stop) => RunOutcome::from_stop(stop, &counters),
            Err(e) => {
                tracing::error!(error = %e, "expansion run failed");
                RunOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        tracing::info!(
            ?outcome,
            successes = counters.successes,
            failures = counters.failures,
            iterations = counters.safety_budget,
            "expansion run finished"
        );
        RunReport {
            run_id,
            outcome,
            counters,
        }
    }

    async fn drive(&self, run_id: Uuid, ctrl: &mut LoopController) -> ExpanderResult<StopReason> {
        let page = self.page.as_ref();
        let timing = &self.config.timing;
        let count_unverified = self.config.confirmation.count_unverified_as_success;

        page.scroll_to(ScrollPosition::default())?;
        tokio::time::sleep(timing.scroll_delay() * 2).await;

        let classifier = Classifier::new(page, &self.selectors, &self.rules);
        let executor = ExpansionExecutor::new(page, &self.selectors, &self.config);
        let mut processed = ProcessedSet::new();

        loop {
            if let Some(stop) = ctrl.stop_reason() {
                return Ok(stop);
            }

            self.phase.send_replace(RunPhase::Scanning);
            let candidates = scan(page, &self.selectors, &classifier, &processed);

            // One control per iteration; the page reflows after every expansion.
            let Some(candidate) = candidates.into_iter().next() else {
                ctrl.record_empty_scan();
                let idle = ctrl.counters().idle_streak;
                self.status.publish(
                    run_id,
                    StatusPhase::Update,
                    format!("Expander: scanning ({idle}/{})…", ctrl.idle_limit()),
                );
                tokio::time::sleep(timing.idle_delay()).await;
                continue;
            };

            self.phase.send_replace(RunPhase::Expanding);
            processed.insert(candidate.element);
            ctrl.begin_attempt();
            let outcome = executor.expand(&candidate, &mut processed).await?;
            let success = outcome.is_success(count_unverified);
            ctrl.record_result(success);

            let counters = ctrl.counters();
            let text = if success {
                format!(
                    "Expander: expanded {} {}…",
                    counters.successes,
                    plural(counters.successes, "control", "controls")
                )
            } else {
                format!(
                    "Expander: retrying ({} slow {})…",
                    counters.failures,
                    plural(counters.failures, "control", "controls")
                )
            };
            self.status.publish(run_id, StatusPhase::Update, text);
        }
    }
}
