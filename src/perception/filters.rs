use crate::perception::selector::Selectors;
use crate::perception::traits::Page;
use crate::perception::types::{NodeId, Visibility};

/// Whether `node` can be seen and interacted with. With `require_viewport`
/// it must also intersect the vertical viewport.
pub fn is_on_screen(page: &dyn Page, node: NodeId, require_viewport: bool) -> bool {
    let Some(layout) = page.layout(node) else {
        return false;
    };
    if layout.visibility != Visibility::Visible || !layout.pointer_events {
        return false;
    }
    let rect = layout.rect;
    if !rect.has_area() {
        return false;
    }
    !require_viewport || (rect.bottom() > 0.0 && rect.top < page.viewport_height())
}

pub fn is_in_primary_column(page: &dyn Page, selectors: &Selectors, node: NodeId) -> bool {
    selectors.post.closest(page, node).is_some()
        || selectors.primary_column.closest(page, node).is_some()
}

/// Inside a quoted-post container, or inside a post that is itself nested in
/// another post.
pub fn is_inside_quoted_content(page: &dyn Page, selectors: &Selectors, node: NodeId) -> bool {
    if selectors.quoted_post.closest(page, node).is_some() {
        return true;
    }
    selectors
        .post
        .closest(page, node)
        .and_then(|post| page.parent(post))
        .and_then(|parent| selectors.post.closest(page, parent))
        .is_some()
}
