use std::collections::HashSet;

use crate::perception::classifier::Classifier;
use crate::perception::selector::Selectors;
use crate::perception::traits::Page;
use crate::perception::types::{Candidate, ProcessedSet};

/// One-shot query for unprocessed expand controls, topmost first.
///
/// Looks inside the primary column (or the whole document when the page has
/// none) at every inline marker and generic control, classifies each once,
/// and orders matches by their current viewport position. Ties keep document
/// order.
pub fn scan(
    page: &dyn Page,
    selectors: &Selectors,
    classifier: &Classifier<'_>,
    processed: &ProcessedSet,
) -> Vec<Candidate> {
    let scope = selectors.primary_scope(page);
    let mut seen = HashSet::new();
    let mut matches = Vec::new();

    for node in page.descendants(scope) {
        if !(selectors.show_more_text.matches(page, node) || selectors.control.matches(page, node)) {
            continue;
        }
        if processed.contains(node) || !seen.insert(node) {
            continue;
        }
        let Some(kind) = classifier.classify(node) else {
            continue;
        };
        let Some(layout) = page.layout(node) else {
            continue;
        };
        matches.push(Candidate {
            element: node,
            kind,
            top: layout.rect.top,
        });
    }

    matches.sort_by(|a, b| a.top.total_cmp(&b.top));
    tracing::trace!(
        scope = %scope,
        found = matches.len(),
        processed = processed.len(),
        "scan complete"
    );
    matches
}
