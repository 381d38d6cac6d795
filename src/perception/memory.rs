/// In-memory page: an element tree with geometry, computed visibility,
/// scrolling, scripted click reactions and subtree mutation subscriptions.
///
/// Used as an offline replay target and by the test suite. Geometry is given
/// in document coordinates; `layout()` reports it relative to the viewport.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::{ExpanderResult, PageError};
use crate::perception::traits::{MutationWatch, Page};
use crate::perception::types::{
    LayoutBox, MutationRecord, NodeId, Rect, ScrollPosition, Visibility,
};

const DEFAULT_VIEWPORT_HEIGHT: f64 = 800.0;

fn default_width() -> f64 {
    600.0
}

fn default_height() -> f64 {
    20.0
}

fn default_viewport_height() -> f64 {
    DEFAULT_VIEWPORT_HEIGHT
}

/// Declarative description of an element subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    /// Document-space top edge.
    #[serde(default)]
    pub top: f64,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    /// `display: none`
    #[serde(default)]
    pub hidden: bool,
    /// Inherited by descendants unless overridden.
    #[serde(default)]
    pub visibility: Option<Visibility>,
    /// Inherited by descendants unless overridden.
    #[serde(default)]
    pub pointer_events: Option<bool>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            text: String::new(),
            top: 0.0,
            width: default_width(),
            height: default_height(),
            hidden: false,
            visibility: None,
            pointer_events: None,
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn dom_id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn at(mut self, top: f64) -> Self {
        self.top = top;
        self
    }

    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn pointer_events(mut self, enabled: bool) -> Self {
        self.pointer_events = Some(enabled);
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// JSON fixture: a viewport height plus the document's top-level elements.
#[derive(Debug, Clone, Deserialize)]
pub struct PageFixture {
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f64,
    pub nodes: Vec<NodeSpec>,
}

type Reaction = Arc<dyn Fn(&mut PageEditor<'_>, NodeId) + Send + Sync>;

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    top: f64,
    left: f64,
    width: f64,
    height: f64,
    hidden: bool,
    visibility: Option<Visibility>,
    pointer_events: Option<bool>,
}

struct ObserverEntry {
    id: u64,
    scope: NodeId,
    tx: mpsc::UnboundedSender<Vec<MutationRecord>>,
}

struct PageState {
    nodes: HashMap<NodeId, NodeData>,
    document: NodeId,
    next_id: u64,
    scroll: ScrollPosition,
    viewport_height: f64,
    max_scroll: Option<f64>,
    fail_scrolls: bool,
    fail_observers: bool,
    failing_clicks: HashSet<NodeId>,
    observers: Vec<ObserverEntry>,
    next_observer: u64,
    reactions: HashMap<NodeId, Reaction>,
    clicks: HashMap<NodeId, u32>,
}

impl PageState {
    fn new(viewport_height: f64) -> Self {
        let document = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            document,
            NodeData {
                tag: "#document".into(),
                attrs: BTreeMap::new(),
                text: String::new(),
                parent: None,
                children: Vec::new(),
                top: 0.0,
                left: 0.0,
                width: 0.0,
                height: 0.0,
                hidden: false,
                visibility: None,
                pointer_events: None,
            },
        );
        Self {
            nodes,
            document,
            next_id: 1,
            scroll: ScrollPosition::default(),
            viewport_height,
            max_scroll: None,
            fail_scrolls: false,
            fail_observers: false,
            failing_clicks: HashSet::new(),
            observers: Vec::new(),
            next_observer: 0,
            reactions: HashMap::new(),
            clicks: HashMap::new(),
        }
    }

    fn insert(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let NodeSpec {
            tag,
            attrs,
            text,
            top,
            width,
            height,
            hidden,
            visibility,
            pointer_events,
            children,
        } = spec;
        self.nodes.insert(
            id,
            NodeData {
                tag: tag.to_ascii_lowercase(),
                attrs,
                text,
                parent: Some(parent),
                children: Vec::new(),
                top,
                left: 0.0,
                width,
                height,
                hidden,
                visibility,
                pointer_events,
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        for child in children {
            self.insert(id, child);
        }
        id
    }

    /// Ancestor chain starting at `node` itself, ending at the topmost node.
    fn ancestors_or_self(&self, node: NodeId) -> impl Iterator<Item = &NodeData> + '_ {
        std::iter::successors(self.nodes.get(&node), move |n| {
            n.parent.and_then(|p| self.nodes.get(&p))
        })
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.document {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn has_layout_box(&self, node: NodeId) -> bool {
        self.is_connected(node) && !self.ancestors_or_self(node).any(|n| n.hidden)
    }

    fn collect_descendants(&self, scope: NodeId, out: &mut Vec<NodeId>) {
        if let Some(n) = self.nodes.get(&scope) {
            for &child in &n.children {
                out.push(child);
                self.collect_descendants(child, out);
            }
        }
    }

    fn text_of(&self, node: NodeId, rendered_only: bool, out: &mut String) {
        let Some(n) = self.nodes.get(&node) else { return };
        if rendered_only && n.hidden {
            return;
        }
        out.push_str(&n.text);
        for &child in &n.children {
            self.text_of(child, rendered_only, out);
        }
    }

    fn max_scroll_y(&self) -> f64 {
        if let Some(limit) = self.max_scroll {
            return limit.max(0.0);
        }
        let extent = self
            .nodes
            .keys()
            .filter(|&&id| self.has_layout_box(id))
            .filter_map(|id| self.nodes.get(id))
            .map(|n| n.top + n.height)
            .fold(0.0_f64, f64::max);
        (extent - self.viewport_height).max(0.0)
    }

    fn dispatch(&mut self, records: Vec<MutationRecord>) {
        if records.is_empty() {
            return;
        }
        let batches: Vec<(usize, Vec<MutationRecord>)> = self
            .observers
            .iter()
            .enumerate()
            .filter_map(|(i, o)| {
                let batch: Vec<MutationRecord> = records
                    .iter()
                    .filter(|r| self.is_inclusive_ancestor(o.scope, r.target))
                    .cloned()
                    .collect();
                (!batch.is_empty()).then_some((i, batch))
            })
            .collect();
        for (i, batch) in batches {
            if self.observers[i].tx.send(batch).is_err() {
                tracing::trace!(observer = self.observers[i].id, "observer receiver dropped");
            }
        }
    }
}

/// Mutation handle given to click reactions and `MemoryPage::mutate`.
/// Child-list changes are delivered to observers when the edit completes.
pub struct PageEditor<'a> {
    state: &'a mut PageState,
    records: Vec<MutationRecord>,
}

impl<'a> PageEditor<'a> {
    fn new(state: &'a mut PageState) -> Self {
        Self {
            state,
            records: Vec::new(),
        }
    }

    pub fn document(&self) -> NodeId {
        self.state.document
    }

    pub fn append(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = self.state.insert(parent, spec);
        self.records.push(MutationRecord {
            target: parent,
            added: vec![id],
            removed: Vec::new(),
        });
        id
    }

    pub fn remove(&mut self, node: NodeId) {
        let Some(parent) = self.state.nodes.get_mut(&node).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.state.nodes.get_mut(&parent) {
            p.children.retain(|&c| c != node);
        }
        self.records.push(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![node],
        });
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.state.nodes.get_mut(&node) {
            n.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(n) = self.state.nodes.get_mut(&node) {
            n.attrs.remove(name);
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(n) = self.state.nodes.get_mut(&node) {
            n.text = text.to_string();
        }
    }

    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) {
        if let Some(n) = self.state.nodes.get_mut(&node) {
            n.hidden = hidden;
        }
    }

    pub fn set_top(&mut self, node: NodeId, top: f64) {
        if let Some(n) = self.state.nodes.get_mut(&node) {
            n.top = top;
        }
    }

    /// Scripts a click reaction for an element created during this edit.
    pub fn on_click(
        &mut self,
        node: NodeId,
        reaction: impl Fn(&mut PageEditor<'_>, NodeId) + Send + Sync + 'static,
    ) {
        self.state.reactions.insert(node, Arc::new(reaction));
    }

    fn into_records(self) -> Vec<MutationRecord> {
        self.records
    }
}

#[derive(Clone)]
pub struct MemoryPage {
    state: Arc<Mutex<PageState>>,
}

impl MemoryPage {
    pub fn new(nodes: Vec<NodeSpec>) -> Self {
        Self::with_viewport(nodes, DEFAULT_VIEWPORT_HEIGHT)
    }

    pub fn with_viewport(nodes: Vec<NodeSpec>, viewport_height: f64) -> Self {
        let mut state = PageState::new(viewport_height);
        let document = state.document;
        for spec in nodes {
            state.insert(document, spec);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn from_fixture(fixture: PageFixture) -> Self {
        Self::with_viewport(fixture.nodes, fixture.viewport_height)
    }

    pub fn from_json(json: &str) -> ExpanderResult<Self> {
        let fixture: PageFixture = serde_json::from_str(json)?;
        Ok(Self::from_fixture(fixture))
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connected element carrying `id="dom_id"`.
    pub fn find(&self, dom_id: &str) -> Option<NodeId> {
        self.element_by_dom_id(dom_id)
    }

    /// Applies a host-page edit and notifies observers.
    pub fn mutate<R>(&self, edit: impl FnOnce(&mut PageEditor<'_>) -> R) -> R {
        let mut state = self.lock();
        let mut editor = PageEditor::new(&mut state);
        let out = edit(&mut editor);
        let records = editor.into_records();
        state.dispatch(records);
        out
    }

    /// Scripts what happens when `node` is clicked.
    pub fn on_click(
        &self,
        node: NodeId,
        reaction: impl Fn(&mut PageEditor<'_>, NodeId) + Send + Sync + 'static,
    ) {
        self.lock().reactions.insert(node, Arc::new(reaction));
    }

    pub fn click_count(&self, node: NodeId) -> u32 {
        self.lock().clicks.get(&node).copied().unwrap_or(0)
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Caps how far the page can scroll, simulating a locked container.
    pub fn set_max_scroll(&self, limit: Option<f64>) {
        self.lock().max_scroll = limit;
    }

    pub fn set_fail_scrolls(&self, fail: bool) {
        self.lock().fail_scrolls = fail;
    }

    pub fn set_fail_observers(&self, fail: bool) {
        self.lock().fail_observers = fail;
    }

    pub fn fail_clicks_on(&self, node: NodeId) {
        self.lock().failing_clicks.insert(node);
    }
}

fn detach_observer(state: &Weak<Mutex<PageState>>, id: u64) {
    if let Some(state) = state.upgrade() {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.observers.retain(|o| o.id != id);
    }
}

impl Page for MemoryPage {
    fn document(&self) -> NodeId {
        self.lock().document
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.lock().nodes.get(&node).and_then(|n| n.parent)
    }

    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let state = self.lock();
        let mut out = Vec::new();
        state.collect_descendants(scope, &mut out);
        out
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.lock().nodes.get(&node).map(|n| n.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.lock()
            .nodes
            .get(&node)
            .and_then(|n| n.attrs.get(name).cloned())
    }

    fn element_by_dom_id(&self, dom_id: &str) -> Option<NodeId> {
        let state = self.lock();
        let mut all = Vec::new();
        state.collect_descendants(state.document, &mut all);
        all.into_iter().find(|id| {
            state
                .nodes
                .get(id)
                .and_then(|n| n.attrs.get("id"))
                .is_some_and(|v| v == dom_id)
        })
    }

    fn text_content(&self, node: NodeId) -> Option<String> {
        let state = self.lock();
        state.nodes.get(&node)?;
        let mut out = String::new();
        state.text_of(node, false, &mut out);
        Some(out)
    }

    fn rendered_text(&self, node: NodeId) -> Option<String> {
        let state = self.lock();
        if !state.has_layout_box(node) {
            return None;
        }
        let mut out = String::new();
        state.text_of(node, true, &mut out);
        Some(out)
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.lock().is_connected(node)
    }

    fn layout(&self, node: NodeId) -> Option<LayoutBox> {
        let state = self.lock();
        if !state.has_layout_box(node) {
            return None;
        }
        let n = state.nodes.get(&node)?;
        let visibility = state
            .ancestors_or_self(node)
            .find_map(|a| a.visibility)
            .unwrap_or_default();
        let pointer_events = state
            .ancestors_or_self(node)
            .find_map(|a| a.pointer_events)
            .unwrap_or(true);
        Some(LayoutBox {
            rect: Rect {
                top: n.top - state.scroll.y,
                left: n.left - state.scroll.x,
                width: n.width,
                height: n.height,
            },
            visibility,
            pointer_events,
        })
    }

    fn viewport_height(&self) -> f64 {
        self.lock().viewport_height
    }

    fn scroll_position(&self) -> ScrollPosition {
        self.lock().scroll
    }

    fn scroll_to(&self, position: ScrollPosition) -> Result<(), PageError> {
        let mut state = self.lock();
        if state.fail_scrolls {
            return Err(PageError::Script("scrollTo rejected".into()));
        }
        let max_y = state.max_scroll_y();
        state.scroll = ScrollPosition {
            x: position.x.max(0.0),
            y: position.y.clamp(0.0, max_y),
        };
        Ok(())
    }

    fn scroll_into_view(&self, node: NodeId) -> Result<(), PageError> {
        let mut state = self.lock();
        if state.fail_scrolls {
            return Err(PageError::Script("scrollIntoView rejected".into()));
        }
        if !state.is_connected(node) {
            return Err(PageError::Detached);
        }
        if !state.has_layout_box(node) {
            return Ok(());
        }
        let Some(n) = state.nodes.get(&node) else {
            return Err(PageError::Detached);
        };
        let target = n.top + n.height / 2.0 - state.viewport_height / 2.0;
        let max_y = state.max_scroll_y();
        state.scroll.y = target.clamp(0.0, max_y);
        Ok(())
    }

    fn click(&self, node: NodeId) -> Result<(), PageError> {
        let mut state = self.lock();
        if !state.is_connected(node) {
            return Err(PageError::Detached);
        }
        *state.clicks.entry(node).or_insert(0) += 1;
        if state.failing_clicks.contains(&node) {
            return Err(PageError::Script("click handler threw".into()));
        }
        let reaction = state.reactions.get(&node).cloned();
        if let Some(reaction) = reaction {
            let mut editor = PageEditor::new(&mut state);
            reaction(&mut editor, node);
            let records = editor.into_records();
            state.dispatch(records);
        }
        Ok(())
    }

    fn observe(&self, scope: NodeId) -> Result<MutationWatch, PageError> {
        let mut state = self.lock();
        if state.fail_observers {
            return Err(PageError::Observer("observe() rejected".into()));
        }
        if !state.nodes.contains_key(&scope) {
            return Err(PageError::Detached);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.next_observer;
        state.next_observer += 1;
        state.observers.push(ObserverEntry { id, scope, tx });

        let weak = Arc::downgrade(&self.state);
        Ok(MutationWatch::new(rx, move || detach_observer(&weak, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryPage {
        MemoryPage::with_viewport(
            vec![NodeSpec::new("main")
                .size(600.0, 3000.0)
                .child(
                    NodeSpec::new("article")
                        .dom_id("post")
                        .at(100.0)
                        .child(NodeSpec::new("span").text("Hello "))
                        .child(NodeSpec::new("span").text("secret").hidden())
                        .child(NodeSpec::new("button").dom_id("btn").at(1500.0).text("Show more")),
                )],
            800.0,
        )
    }

    #[test]
    fn text_views_differ_on_hidden_content() {
        let page = sample();
        let post = page.find("post").unwrap();
        assert_eq!(page.text_content(post).as_deref(), Some("Hello secretShow more"));
        assert_eq!(page.rendered_text(post).as_deref(), Some("Hello Show more"));
    }

    #[test]
    fn layout_is_viewport_relative_and_scroll_is_clamped() {
        let page = sample();
        let btn = page.find("btn").unwrap();
        assert_eq!(page.layout(btn).unwrap().rect.top, 1500.0);

        page.scroll_into_view(btn).unwrap();
        let top = page.layout(btn).unwrap().rect.top;
        assert!((top - (400.0 - 10.0)).abs() < f64::EPSILON);

        page.scroll_to(ScrollPosition { x: 0.0, y: 99_999.0 }).unwrap();
        assert_eq!(page.scroll_position().y, 3000.0 - 800.0);

        page.set_max_scroll(Some(100.0));
        page.scroll_into_view(btn).unwrap();
        assert_eq!(page.scroll_position().y, 100.0);
    }

    #[test]
    fn removed_nodes_read_as_detached() {
        let page = sample();
        let post = page.find("post").unwrap();
        let btn = page.find("btn").unwrap();
        page.mutate(|e| e.remove(post));

        assert!(!page.is_connected(btn));
        assert!(page.layout(btn).is_none());
        assert!(page.find("btn").is_none());
        assert_eq!(page.click(btn), Err(PageError::Detached));
    }

    #[test]
    fn editor_updates_layout_attributes_and_tree() {
        let page = sample();
        let btn = page.find("btn").unwrap();

        page.mutate(|e| {
            e.set_attribute(btn, "aria-expanded", "true");
            e.set_top(btn, 200.0);
        });
        assert_eq!(page.attribute(btn, "aria-expanded").as_deref(), Some("true"));
        assert_eq!(page.layout(btn).unwrap().rect.top, 200.0);

        page.mutate(|e| {
            e.remove_attribute(btn, "aria-expanded");
            e.set_hidden(btn, true);
        });
        assert_eq!(page.attribute(btn, "aria-expanded"), None);
        assert!(page.layout(btn).is_none());
        assert!(page.is_connected(btn));

        let aside = page.mutate(|e| {
            let document = e.document();
            e.append(document, NodeSpec::new("aside").dom_id("side"))
        });
        assert_eq!(page.find("side"), Some(aside));
        assert_eq!(page.parent(aside), Some(page.document()));
    }

    #[tokio::test]
    async fn observers_receive_scoped_batches_and_detach_on_drop() {
        let page = sample();
        let post = page.find("post").unwrap();
        let btn = page.find("btn").unwrap();
        page.on_click(btn, move |e, _| {
            e.append(post, NodeSpec::new("article").text("reply"));
        });

        let mut inside = page.observe(post).unwrap();
        let outside = page.observe(btn).unwrap();
        assert_eq!(page.observer_count(), 2);

        page.click(btn).unwrap();
        let batch = inside.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].target, post);
        assert_eq!(batch[0].added.len(), 1);
        assert_eq!(page.click_count(btn), 1);

        drop(outside);
        inside.disconnect();
        assert_eq!(page.observer_count(), 0);
    }

    #[test]
    fn fixture_from_json() {
        let page = MemoryPage::from_json(
            r#"{
                "viewport_height": 600,
                "nodes": [
                    {"tag": "div", "attrs": {"data-testid": "primaryColumn"}, "height": 2000,
                     "children": [{"tag": "button", "attrs": {"id": "b"}, "text": "Show replies", "top": 900}]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(page.viewport_height(), 600.0);
        let b = page.find("b").unwrap();
        assert_eq!(page.tag_name(b).as_deref(), Some("button"));
        assert_eq!(page.layout(b).unwrap().rect.top, 900.0);
    }
}
