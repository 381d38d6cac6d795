use tokio::sync::mpsc;

use crate::errors::PageError;
use crate::perception::types::{LayoutBox, MutationRecord, NodeId, ScrollPosition};

/// The live page being expanded.
///
/// The host page mutates concurrently, so every call resolves the handle
/// afresh: a removed element reads as detached (`None` / `false`) instead of
/// failing. Only actions return errors.
pub trait Page: Send + Sync {
    /// The document node, root of every query.
    fn document(&self) -> NodeId;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Every element below `scope`, in document order, excluding `scope`.
    fn descendants(&self, scope: NodeId) -> Vec<NodeId>;

    /// Lowercase tag name.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Resolves a document-level `id` attribute.
    fn element_by_dom_id(&self, dom_id: &str) -> Option<NodeId>;

    /// Raw concatenated text of the subtree.
    fn text_content(&self, node: NodeId) -> Option<String>;

    /// Text as rendered, or `None` when the element has no rendered view.
    fn rendered_text(&self, node: NodeId) -> Option<String>;

    fn is_connected(&self, node: NodeId) -> bool;

    /// `None` when the element has no layout box (detached, or hidden by
    /// itself or an ancestor).
    fn layout(&self, node: NodeId) -> Option<LayoutBox>;

    fn viewport_height(&self) -> f64;

    fn scroll_position(&self) -> ScrollPosition;

    fn scroll_to(&self, position: ScrollPosition) -> Result<(), PageError>;

    /// Scrolls so the element sits at the vertical center of the viewport.
    fn scroll_into_view(&self, node: NodeId) -> Result<(), PageError>;

    fn click(&self, node: NodeId) -> Result<(), PageError>;

    /// Subscribes to child additions/removals anywhere below `scope`.
    fn observe(&self, scope: NodeId) -> Result<MutationWatch, PageError>;
}

/// A live mutation subscription. Dropping it disconnects the observer.
pub struct MutationWatch {
    rx: mpsc::UnboundedReceiver<Vec<MutationRecord>>,
    disconnect: Option<Box<dyn FnOnce() + Send>>,
}

impl MutationWatch {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Vec<MutationRecord>>,
        disconnect: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            disconnect: Some(Box::new(disconnect)),
        }
    }

    /// Next notification batch, or `None` once the page dropped the observer.
    pub async fn next_batch(&mut self) -> Option<Vec<MutationRecord>> {
        self.rx.recv().await
    }

    pub fn disconnect(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
        self.rx.close();
    }
}

impl Drop for MutationWatch {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MutationWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationWatch")
            .field("connected", &self.disconnect.is_some())
            .finish()
    }
}
