use crate::config::{ConfirmationConfig, ExpanderConfig, LimitsConfig, TimingConfig};
use crate::errors::{ExpanderResult, PageError};
use crate::executor::mutation::trigger_and_watch;
use crate::executor::outcome::{Evidence, ExpandOutcome};
use crate::executor::polling::wait_for_state_change;
use crate::perception::filters::is_on_screen;
use crate::perception::label::resolve_label;
use crate::perception::selector::Selectors;
use crate::perception::traits::Page;
use crate::perception::types::{Candidate, ControlKind, NodeId, ProcessedSet};

/// Brings one candidate into view, triggers it and confirms the effect.
pub struct ExpansionExecutor<'a> {
    page: &'a dyn Page,
    selectors: &'a Selectors,
    limits: &'a LimitsConfig,
    timing: &'a TimingConfig,
    confirmation: &'a ConfirmationConfig,
}

impl<'a> ExpansionExecutor<'a> {
    pub fn new(page: &'a dyn Page, selectors: &'a Selectors, config: &'a ExpanderConfig) -> Self {
        Self {
            page,
            selectors,
            limits: &config.limits,
            timing: &config.timing,
            confirmation: &config.confirmation,
        }
    }

    /// Errors are reserved for page failures that should end the run;
    /// everything else is reported through the outcome. Unsuccessful
    /// candidates are removed from `processed` so a later scan may retry them.
    pub async fn expand(
        &self,
        candidate: &Candidate,
        processed: &mut ProcessedSet,
    ) -> ExpanderResult<ExpandOutcome> {
        let node = candidate.element;

        if !self.bring_into_view(node).await? {
            tracing::debug!(node = %node, kind = ?candidate.kind, "control not in view after scroll");
            processed.remove(node);
            return Ok(ExpandOutcome::NotInView);
        }

        let evidence = match candidate.kind {
            ControlKind::TextExpander => {
                let baseline = resolve_label(self.page, node);
                self.click(node);
                self.poll_state(node, &baseline).await
            }
            ControlKind::RepliesExpander => {
                let scope = self.replies_scope(node);
                let structural = trigger_and_watch(
                    self.page,
                    node,
                    scope,
                    self.selectors,
                    self.timing.mutation_timeout(),
                    || self.click(node),
                )
                .await;
                match structural {
                    Some(evidence) => Some(evidence),
                    None => {
                        let baseline = resolve_label(self.page, node);
                        self.poll_state(node, &baseline).await
                    }
                }
            }
        };

        tokio::time::sleep(self.timing.post_click_delay()).await;

        let outcome = match evidence {
            Some(evidence) => ExpandOutcome::Confirmed(evidence),
            None => ExpandOutcome::Unverified,
        };
        if !outcome.is_success(self.confirmation.count_unverified_as_success) {
            processed.remove(node);
        }
        tracing::debug!(node = %node, kind = ?candidate.kind, ?outcome, "expansion attempted");
        Ok(outcome)
    }

    /// Centers the control, lets the scroll settle, then re-checks it.
    async fn bring_into_view(&self, node: NodeId) -> ExpanderResult<bool> {
        match self.page.scroll_into_view(node) {
            Ok(()) => {}
            Err(PageError::Detached) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(self.timing.scroll_delay()).await;
        Ok(is_on_screen(self.page, node, true))
    }

    /// A throwing click still counts as triggered; confirmation decides.
    fn click(&self, node: NodeId) {
        if let Err(e) = self.page.click(node) {
            tracing::debug!(node = %node, error = %e, "click failed");
        }
    }

    async fn poll_state(&self, node: NodeId, baseline: &str) -> Option<Evidence> {
        wait_for_state_change(
            self.page,
            node,
            baseline,
            self.limits.state_checks,
            self.timing.state_check_interval(),
        )
        .await
    }

    /// Parent of the enclosing post, else the primary column, else the document.
    fn replies_scope(&self, node: NodeId) -> NodeId {
        self.selectors
            .post
            .closest(self.page, node)
            .and_then(|post| self.page.parent(post))
            .unwrap_or_else(|| self.selectors.primary_scope(self.page))
    }
}
