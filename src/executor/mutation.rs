use std::time::Duration;

use crate::executor::outcome::Evidence;
use crate::perception::selector::Selectors;
use crate::perception::traits::{MutationWatch, Page};
use crate::perception::types::NodeId;

/// Arms a mutation subscription on `scope`, runs `trigger`, then races the
/// first qualifying notification batch against `timeout`. The subscription is
/// disconnected whichever side wins.
///
/// A batch qualifies when it adds a post container or an inline show-more
/// marker, or when `node` itself has left the page.
pub async fn trigger_and_watch(
    page: &dyn Page,
    node: NodeId,
    scope: NodeId,
    selectors: &Selectors,
    timeout: Duration,
    trigger: impl FnOnce(),
) -> Option<Evidence> {
    let mut watch = match page.observe(scope) {
        Ok(watch) => watch,
        Err(e) => {
            tracing::debug!(node = %node, scope = %scope, error = %e, "mutation watch unavailable");
            trigger();
            return None;
        }
    };

    trigger();

    let evidence = tokio::select! {
        evidence = first_structural_change(&mut watch, page, node, selectors) => evidence,
        _ = tokio::time::sleep(timeout) => {
            tracing::debug!(node = %node, timeout_ms = timeout.as_millis() as u64, "no structural change before timeout");
            None
        }
    };
    watch.disconnect();
    evidence
}

async fn first_structural_change(
    watch: &mut MutationWatch,
    page: &dyn Page,
    node: NodeId,
    selectors: &Selectors,
) -> Option<Evidence> {
    while let Some(batch) = watch.next_batch().await {
        if !page.is_connected(node) {
            return Some(Evidence::Detached);
        }
        let found = batch
            .iter()
            .flat_map(|record| record.added.iter().copied())
            .find_map(|added| classify_added(page, selectors, added));
        if found.is_some() {
            return found;
        }
    }
    tracing::debug!(node = %node, "mutation watch closed by page");
    None
}

fn classify_added(page: &dyn Page, selectors: &Selectors, added: NodeId) -> Option<Evidence> {
    if selectors.post.matches(page, added) {
        Some(Evidence::PostInserted)
    } else if selectors.show_more_text.matches_within(page, added) {
        Some(Evidence::MarkerInserted)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;
    use crate::perception::memory::{MemoryPage, NodeSpec};

    const TIMEOUT: Duration = Duration::from_millis(6500);

    fn setup() -> (MemoryPage, Selectors, NodeId, NodeId) {
        let page = MemoryPage::new(vec![
            NodeSpec::new("section").dom_id("thread").child(
                NodeSpec::new("article")
                    .dom_id("post")
                    .child(NodeSpec::new("button").dom_id("btn").text("Show replies")),
            ),
            NodeSpec::new("aside").dom_id("sidebar"),
        ]);
        let selectors = Selectors::compile(&SelectorConfig::default()).unwrap();
        let thread = page.find("thread").unwrap();
        let btn = page.find("btn").unwrap();
        (page, selectors, thread, btn)
    }

    async fn watch_click(page: &MemoryPage, selectors: &Selectors, scope: NodeId, btn: NodeId) -> Option<Evidence> {
        trigger_and_watch(page, btn, scope, selectors, TIMEOUT, || {
            let _ = page.click(btn);
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_inserted_posts() {
        let (page, selectors, thread, btn) = setup();
        page.on_click(btn, move |e, _| {
            e.append(thread, NodeSpec::new("article").text("reply one"));
            e.append(thread, NodeSpec::new("article").text("reply two"));
        });

        let start = tokio::time::Instant::now();
        let evidence = watch_click(&page, &selectors, thread, btn).await;
        assert_eq!(evidence, Some(Evidence::PostInserted));
        assert!(start.elapsed() < TIMEOUT);
        assert_eq!(page.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_nested_marker() {
        let (page, selectors, thread, btn) = setup();
        page.on_click(btn, move |e, _| {
            e.append(
                thread,
                NodeSpec::new("div").child(
                    NodeSpec::new("button").attr("data-testid", "tweet-text-show-more-link"),
                ),
            );
        });
        assert_eq!(
            watch_click(&page, &selectors, thread, btn).await,
            Some(Evidence::MarkerInserted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_when_control_is_removed() {
        let (page, selectors, thread, btn) = setup();
        page.on_click(btn, |e, me| e.remove(me));
        assert_eq!(
            watch_click(&page, &selectors, thread, btn).await,
            Some(Evidence::Detached)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_irrelevant_and_out_of_scope_changes() {
        let (page, selectors, thread, btn) = setup();
        let sidebar = page.find("sidebar").unwrap();
        page.on_click(btn, move |e, _| {
            e.append(thread, NodeSpec::new("span").text("spinner"));
            e.append(sidebar, NodeSpec::new("article"));
        });

        let start = tokio::time::Instant::now();
        assert_eq!(watch_click(&page, &selectors, thread, btn).await, None);
        assert_eq!(start.elapsed(), TIMEOUT);
        assert_eq!(page.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn still_triggers_when_observer_fails() {
        let (page, selectors, thread, btn) = setup();
        page.set_fail_observers(true);
        assert_eq!(watch_click(&page, &selectors, thread, btn).await, None);
        assert_eq!(page.click_count(btn), 1);
    }
}
