use crate::perception::traits::Page;
use crate::perception::types::NodeId;

/// Collapses whitespace runs to a single space and trims.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Accessible label of `node`: `aria-label`, `title`, the text of every
/// `aria-labelledby` target and finally the element's own text, normalized.
/// Absent sources contribute nothing.
pub fn resolve_label(page: &dyn Page, node: NodeId) -> String {
    let aria = page.attribute(node, "aria-label").unwrap_or_default();
    let title = page.attribute(node, "title").unwrap_or_default();
    let labelled_by = page
        .attribute(node, "aria-labelledby")
        .map(|ids| referenced_text(page, &ids))
        .unwrap_or_default();
    let text = match page.rendered_text(node) {
        Some(rendered) if !rendered.trim().is_empty() => rendered,
        _ => page.text_content(node).unwrap_or_default(),
    };
    normalize(&[aria, title, labelled_by, text].join(" "))
}

fn referenced_text(page: &dyn Page, ids: &str) -> String {
    ids.split_whitespace()
        .filter_map(|id| page.element_by_dom_id(id))
        .filter_map(|el| page.text_content(el))
        .collect::<Vec<_>>()
        .join(" ")
}
