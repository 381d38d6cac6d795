use std::time::Duration;

use crate::executor::outcome::Evidence;
use crate::perception::label::resolve_label;
use crate::perception::traits::Page;
use crate::perception::types::NodeId;

/// Single check of the control's own state against the pre-trigger label.
pub fn observe_state(page: &dyn Page, node: NodeId, baseline: &str) -> Option<Evidence> {
    if !page.is_connected(node) {
        return Some(Evidence::Detached);
    }
    if page.attribute(node, "disabled").is_some() {
        return Some(Evidence::Disabled);
    }
    if page.attribute(node, "aria-expanded").as_deref() == Some("true") {
        return Some(Evidence::Expanded);
    }
    if !baseline.is_empty() && resolve_label(page, node) != baseline {
        return Some(Evidence::LabelChanged);
    }
    None
}

/// Polls up to `checks` times, `interval` apart, for a state change.
/// `None` means the control never visibly reacted.
pub async fn wait_for_state_change(
    page: &dyn Page,
    node: NodeId,
    baseline: &str,
    checks: u32,
    interval: Duration,
) -> Option<Evidence> {
    for attempt in 0..checks {
        if let Some(evidence) = observe_state(page, node, baseline) {
            tracing::trace!(node = %node, attempt, ?evidence, "state change observed");
            return Some(evidence);
        }
        tokio::time::sleep(interval).await;
    }
    (!page.is_connected(node)).then_some(Evidence::Detached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::memory::{MemoryPage, NodeSpec};

    const INTERVAL: Duration = Duration::from_millis(150);

    fn page() -> (MemoryPage, NodeId) {
        let page = MemoryPage::new(vec![NodeSpec::new("button").dom_id("b").text("Show more")]);
        let b = page.find("b").unwrap();
        (page, b)
    }

    #[test]
    fn state_checks_in_order() {
        let (page, b) = page();
        assert_eq!(observe_state(&page, b, "Show more"), None);
        assert_eq!(observe_state(&page, b, ""), None);

        page.mutate(|e| e.set_text(b, "Show less"));
        assert_eq!(observe_state(&page, b, "Show more"), Some(Evidence::LabelChanged));

        page.mutate(|e| e.set_attribute(b, "aria-expanded", "true"));
        assert_eq!(observe_state(&page, b, "Show more"), Some(Evidence::Expanded));

        page.mutate(|e| e.set_attribute(b, "disabled", ""));
        assert_eq!(observe_state(&page, b, "Show more"), Some(Evidence::Disabled));

        page.mutate(|e| e.remove(b));
        assert_eq!(observe_state(&page, b, "Show more"), Some(Evidence::Detached));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_checks() {
        let (page, b) = page();
        let start = tokio::time::Instant::now();
        let result = wait_for_state_change(&page, b, "Show more", 12, INTERVAL).await;
        assert_eq!(result, None);
        assert_eq!(start.elapsed(), INTERVAL * 12);
    }

    #[tokio::test(start_paused = true)]
    async fn notices_a_late_change() {
        let (page, b) = page();
        let late = page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            late.mutate(|e| e.set_attribute(b, "aria-expanded", "true"));
        });

        let start = tokio::time::Instant::now();
        let result = wait_for_state_change(&page, b, "Show more", 12, INTERVAL).await;
        assert_eq!(result, Some(Evidence::Expanded));
        assert!(start.elapsed() < INTERVAL * 12);
    }
}
