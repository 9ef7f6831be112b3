//! Arena-based live tree.
//!
//! The live tree is the retained, mutable side of the engine. All nodes
//! live in one indextree [`Arena`]; a [`NodeId`] is the only handle the
//! rest of the crate ever holds. The public methods form a deliberately
//! narrow surface: the patch applier and custom widgets can only mutate
//! the tree through these primitives, never by reaching into the arena.

use compact_str::{CompactString, format_compact};
use indexmap::IndexMap;
use indextree::{Arena, NodeId};

use smallvec::SmallVec;

use crate::facts::{Fact, Handler, HandlerKind, NsAttr, PropValue};
use crate::trace;
use crate::vnode::{Namespace, TaggerStack, VNode};

/// Errors from live-tree primitives.
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    /// An element primitive was aimed at a text node.
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    /// A text primitive was aimed at an element.
    #[error("node {0:?} is not a text node")]
    NotAText(NodeId),
}

/// What goes in each arena slot.
pub struct LiveNode<Msg> {
    /// Text or element payload.
    pub kind: LiveKind<Msg>,
    /// Mapper chains attached to this node, outermost layer first. Event
    /// dispatch walks these from the firing node up to the root.
    pub taggers: TaggerStack<Msg>,
}

/// Live node variants.
pub enum LiveKind<Msg> {
    /// Text content.
    Text(CompactString),
    /// Element with per-category fact state.
    Element(LiveElement<Msg>),
}

/// Retained element state, mirroring the fact categories.
pub struct LiveElement<Msg> {
    pub tag: CompactString,
    pub ns: Namespace,
    pub attrs: IndexMap<CompactString, CompactString>,
    pub attrs_ns: IndexMap<CompactString, NsAttr>,
    pub props: IndexMap<CompactString, PropValue>,
    pub styles: IndexMap<CompactString, CompactString>,
    pub events: IndexMap<CompactString, Handler<Msg>>,
}

/// The live tree plus a counter of listener registrations torn down and
/// recreated, used to observe that unchanged handlers stay in place.
pub struct LiveDom<Msg> {
    arena: Arena<LiveNode<Msg>>,
    listener_churn: u64,
}

impl<Msg> Default for LiveDom<Msg> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Msg> LiveDom<Msg> {
    pub fn new() -> Self {
        LiveDom {
            arena: Arena::new(),
            listener_churn: 0,
        }
    }

    /// Get immutable reference to node data.
    pub fn get(&self, id: NodeId) -> &LiveNode<Msg> {
        self.arena[id].get()
    }

    /// Get mutable reference to node data.
    pub fn get_mut(&mut self, id: NodeId) -> &mut LiveNode<Msg> {
        self.arena[id].get_mut()
    }

    /// Iterate children of a node.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].parent()
    }

    /// Registrations torn down or created so far, excluding in-place
    /// rebinds.
    pub fn listener_churn(&self) -> u64 {
        self.listener_churn
    }

    fn element(&self, id: NodeId) -> Result<&LiveElement<Msg>, DomError> {
        match &self.get(id).kind {
            LiveKind::Element(el) => Ok(el),
            LiveKind::Text(_) => Err(DomError::NotAnElement(id)),
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut LiveElement<Msg>, DomError> {
        match &mut self.get_mut(id).kind {
            LiveKind::Element(el) => Ok(el),
            LiveKind::Text(_) => Err(DomError::NotAnElement(id)),
        }
    }

    // --- creation and structure ---

    pub fn create_element(&mut self, tag: impl Into<CompactString>, ns: Namespace) -> NodeId {
        self.arena.new_node(LiveNode {
            kind: LiveKind::Element(LiveElement {
                tag: tag.into(),
                ns,
                attrs: IndexMap::new(),
                attrs_ns: IndexMap::new(),
                props: IndexMap::new(),
                styles: IndexMap::new(),
                events: IndexMap::new(),
            }),
            taggers: SmallVec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<CompactString>) -> NodeId {
        self.arena.new_node(LiveNode {
            kind: LiveKind::Text(text.into()),
            taggers: SmallVec::new(),
        })
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<CompactString>) -> Result<(), DomError> {
        match &mut self.get_mut(id).kind {
            LiveKind::Text(existing) => {
                *existing = text.into();
                Ok(())
            }
            LiveKind::Element(_) => Err(DomError::NotAText(id)),
        }
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        parent.append(child, &mut self.arena);
    }

    /// Insert `child` so it ends up at `position` among `parent`'s
    /// children. Out-of-range positions append.
    pub fn insert_at(&mut self, parent: NodeId, position: usize, child: NodeId) {
        let children: Vec<_> = parent.children(&self.arena).collect();
        trace!(
            "insert_at: parent={:?}, position={}, children.len()={}",
            parent,
            position,
            children.len()
        );
        if position >= children.len() {
            parent.append(child, &mut self.arena);
        } else {
            children[position].insert_before(child, &mut self.arena);
        }
    }

    /// Detach `child` and its subtree from the tree.
    pub fn remove_child(&mut self, child: NodeId) {
        child.detach(&mut self.arena);
    }

    /// Replace `old` with `new` in place. `old`'s subtree is detached.
    pub fn replace_child(&mut self, old: NodeId, new: NodeId) {
        old.insert_after(new, &mut self.arena);
        old.detach(&mut self.arena);
    }

    // --- fact primitives ---

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: impl Into<CompactString>,
        value: impl Into<CompactString>,
    ) -> Result<(), DomError> {
        self.element_mut(id)?.attrs.insert(name.into(), value.into());
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(id)?.attrs.shift_remove(name);
        Ok(())
    }

    pub fn set_attribute_ns(
        &mut self,
        id: NodeId,
        name: impl Into<CompactString>,
        value: NsAttr,
    ) -> Result<(), DomError> {
        self.element_mut(id)?.attrs_ns.insert(name.into(), value);
        Ok(())
    }

    pub fn remove_attribute_ns(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(id)?.attrs_ns.shift_remove(name);
        Ok(())
    }

    pub fn set_property(
        &mut self,
        id: NodeId,
        name: impl Into<CompactString>,
        value: PropValue,
    ) -> Result<(), DomError> {
        self.element_mut(id)?.props.insert(name.into(), value);
        Ok(())
    }

    pub fn remove_property(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(id)?.props.shift_remove(name);
        Ok(())
    }

    pub fn set_style(
        &mut self,
        id: NodeId,
        name: impl Into<CompactString>,
        value: impl Into<CompactString>,
    ) -> Result<(), DomError> {
        self.element_mut(id)?.styles.insert(name.into(), value.into());
        Ok(())
    }

    pub fn remove_style(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(id)?.styles.shift_remove(name);
        Ok(())
    }

    // --- listeners ---

    /// Register a listener, counting it as churn.
    pub fn add_listener(
        &mut self,
        id: NodeId,
        event: impl Into<CompactString>,
        handler: Handler<Msg>,
    ) -> Result<(), DomError> {
        self.element_mut(id)?.events.insert(event.into(), handler);
        self.listener_churn += 1;
        Ok(())
    }

    /// Tear a listener down, counting it as churn.
    pub fn remove_listener(&mut self, id: NodeId, event: &str) -> Result<(), DomError> {
        self.element_mut(id)?.events.shift_remove(event);
        self.listener_churn += 1;
        Ok(())
    }

    /// Swap a listener's decode function without re-registering. Only
    /// valid when the handler kind is unchanged.
    pub fn rebind_listener(
        &mut self,
        id: NodeId,
        event: impl Into<CompactString>,
        handler: Handler<Msg>,
    ) -> Result<(), DomError> {
        self.element_mut(id)?.events.insert(event.into(), handler);
        Ok(())
    }

    pub fn listener_kind(&self, id: NodeId, event: &str) -> Option<HandlerKind> {
        match &self.get(id).kind {
            LiveKind::Element(el) => el.events.get(event).map(|h| h.kind),
            LiveKind::Text(_) => None,
        }
    }

    // --- events ---

    /// Deliver an event fired on `target`.
    ///
    /// Walks from the target to the root. At each element carrying a
    /// listener for `event`, the payload is decoded and the resulting
    /// message is threaded through every mapper chain between that
    /// element and the root, innermost chain entries first. Bubbling
    /// stops after a handler whose kind can halt propagation.
    pub fn dispatch(&self, target: NodeId, event: &str, payload: &str, mut deliver: impl FnMut(Msg)) {
        let mut current = Some(target);
        while let Some(id) = current {
            let mut halt = false;
            if let LiveKind::Element(el) = &self.get(id).kind {
                if let Some(handler) = el.events.get(event) {
                    if let Some(msg) = (handler.callback)(payload) {
                        deliver(self.map_to_root(id, msg));
                    }
                    halt = handler.may_stop_propagation();
                }
            }
            if halt {
                break;
            }
            current = self.parent(id);
        }
    }

    fn map_to_root(&self, from: NodeId, mut msg: Msg) -> Msg {
        let mut current = Some(from);
        while let Some(id) = current {
            for chain in self.get(id).taggers.iter().rev() {
                for mapper in chain.iter().rev() {
                    msg = mapper(msg);
                }
            }
            current = self.parent(id);
        }
        msg
    }

    // --- serialization ---

    /// Serialize a subtree to an HTML string.
    ///
    /// Attributes are emitted in sorted name order and styles as one
    /// sorted `style` attribute, so two trees holding the same facts
    /// serialize identically regardless of mutation history. Properties
    /// and listeners have no markup form and are skipped.
    pub fn to_html(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.serialize_node(&mut out, root);
        out
    }

    fn serialize_node(&self, out: &mut String, id: NodeId) {
        match &self.get(id).kind {
            LiveKind::Text(text) => {
                for c in text.chars() {
                    match c {
                        '&' => out.push_str("&amp;"),
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        _ => out.push(c),
                    }
                }
            }
            LiveKind::Element(el) => self.serialize_element(out, id, el),
        }
    }

    fn serialize_element(&self, out: &mut String, id: NodeId, el: &LiveElement<Msg>) {
        out.push('<');
        out.push_str(&el.tag);

        let mut attrs: Vec<(CompactString, CompactString)> = el
            .attrs
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, attr) in &el.attrs_ns {
            attrs.push((name.clone(), attr.value.clone()));
        }
        if !el.styles.is_empty() {
            let mut styles: Vec<_> = el.styles.iter().collect();
            styles.sort_by(|a, b| a.0.cmp(b.0));
            let mut css = CompactString::default();
            for (name, value) in styles {
                if !css.is_empty() {
                    css.push_str("; ");
                }
                css.push_str(&format_compact!("{name}: {value}"));
            }
            attrs.push(("style".into(), css));
        }
        attrs.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, value) in &attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            for c in value.chars() {
                match c {
                    '&' => out.push_str("&amp;"),
                    '"' => out.push_str("&quot;"),
                    '<' => out.push_str("&lt;"),
                    '>' => out.push_str("&gt;"),
                    _ => out.push(c),
                }
            }
            out.push('"');
        }

        if el.ns == Namespace::Html && is_void_element(&el.tag) {
            out.push('>');
            return;
        }

        out.push('>');
        for child in id.children(&self.arena) {
            self.serialize_node(out, child);
        }
        out.push_str("</");
        out.push_str(&el.tag);
        out.push('>');
    }
}

impl<Msg: 'static> LiveDom<Msg> {
    /// Snapshot a live subtree as a virtual tree.
    ///
    /// Only statically recoverable state survives: tag, namespace,
    /// attributes and styles, and text content. Properties and listeners
    /// cannot be reconstructed and are dropped; diffing the snapshot
    /// against the next render re-establishes them.
    pub fn virtualize(&self, id: NodeId) -> VNode<Msg> {
        match &self.get(id).kind {
            LiveKind::Text(text) => VNode::text(text.clone()),
            LiveKind::Element(el) => {
                let mut facts: Vec<Fact<Msg>> = Vec::new();
                for (name, value) in &el.attrs {
                    facts.push(Fact::Attr(name.clone(), value.clone()));
                }
                for (name, attr) in &el.attrs_ns {
                    facts.push(Fact::AttrNs(name.clone(), attr.clone()));
                }
                for (name, value) in &el.styles {
                    facts.push(Fact::Style(name.clone(), value.clone()));
                }
                let children: Vec<VNode<Msg>> =
                    self.children(id).map(|c| self.virtualize(c)).collect();
                VNode::element_ns(el.ns, el.tag.clone(), facts, children)
            }
        }
    }
}

/// HTML5 void elements that never have closing tags.
fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use std::rc::Rc;

    #[test]
    fn test_insert_at_positions() {
        let mut dom: LiveDom<()> = LiveDom::new();
        let parent = dom.create_element("ul", Namespace::Html);
        let a = dom.create_text("a");
        let c = dom.create_text("c");
        dom.append(parent, a);
        dom.append(parent, c);

        let b = dom.create_text("b");
        dom.insert_at(parent, 1, b);
        let far = dom.create_text("z");
        dom.insert_at(parent, 99, far);

        assert_eq!(dom.to_html(parent), "<ul>abcz</ul>");
    }

    #[test]
    fn test_replace_child() {
        let mut dom: LiveDom<()> = LiveDom::new();
        let parent = dom.create_element("div", Namespace::Html);
        let old = dom.create_text("old");
        dom.append(parent, old);
        let new = dom.create_element("span", Namespace::Html);
        dom.replace_child(old, new);
        assert_eq!(dom.to_html(parent), "<div><span></span></div>");
    }

    #[test]
    fn test_serialization_is_order_independent() {
        let mut dom: LiveDom<()> = LiveDom::new();
        let a = dom.create_element("p", Namespace::Html);
        dom.set_attribute(a, "id", "x").unwrap();
        dom.set_attribute(a, "class", "y").unwrap();
        let b = dom.create_element("p", Namespace::Html);
        dom.set_attribute(b, "class", "y").unwrap();
        dom.set_attribute(b, "id", "x").unwrap();
        assert_eq!(dom.to_html(a), dom.to_html(b));
        assert_eq!(dom.to_html(a), "<p class=\"y\" id=\"x\"></p>");
    }

    #[test]
    fn test_text_and_attr_escaping() {
        let mut dom: LiveDom<()> = LiveDom::new();
        let el = dom.create_element("span", Namespace::Html);
        dom.set_attribute(el, "title", "a\"b<c&d").unwrap();
        let text = dom.create_text("1 < 2 & 3 > 2");
        dom.append(el, text);
        assert_eq!(
            dom.to_html(el),
            "<span title=\"a&quot;b&lt;c&amp;d\">1 &lt; 2 &amp; 3 &gt; 2</span>"
        );
    }

    #[test]
    fn test_void_elements_have_no_closing_tag() {
        let mut dom: LiveDom<()> = LiveDom::new();
        let div = dom.create_element("div", Namespace::Html);
        let br = dom.create_element("br", Namespace::Html);
        dom.append(div, br);
        assert_eq!(dom.to_html(div), "<div><br></div>");
    }

    #[test]
    fn test_dispatch_bubbles_and_maps() {
        let mut dom: LiveDom<i32> = LiveDom::new();
        let outer = dom.create_element("div", Namespace::Html);
        let inner = dom.create_element("button", Namespace::Html);
        dom.append(outer, inner);

        dom.get_mut(outer).taggers.push(smallvec![Rc::new(|m: i32| m * 10) as _]);
        dom.add_listener(outer, "click", Handler::normal(|_| Some(1)))
            .unwrap();
        dom.add_listener(inner, "click", Handler::normal(|_| Some(2)))
            .unwrap();

        let mut seen = Vec::new();
        dom.dispatch(inner, "click", "{}", |msg| seen.push(msg));
        // inner handler is below the tagger, outer handler above it fires too
        assert_eq!(seen, vec![20, 10]);
    }

    #[test]
    fn test_dispatch_stop_propagation() {
        let mut dom: LiveDom<i32> = LiveDom::new();
        let outer = dom.create_element("div", Namespace::Html);
        let inner = dom.create_element("button", Namespace::Html);
        dom.append(outer, inner);

        dom.add_listener(outer, "click", Handler::normal(|_| Some(1)))
            .unwrap();
        dom.add_listener(
            inner,
            "click",
            Handler::new(HandlerKind::MayStopPropagation, |_| Some(2)),
        )
        .unwrap();

        let mut seen = Vec::new();
        dom.dispatch(inner, "click", "{}", |msg| seen.push(msg));
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn test_listener_churn_counts_add_and_remove_only() {
        let mut dom: LiveDom<()> = LiveDom::new();
        let el = dom.create_element("button", Namespace::Html);
        dom.add_listener(el, "click", Handler::normal(|_| Some(())))
            .unwrap();
        assert_eq!(dom.listener_churn(), 1);
        dom.rebind_listener(el, "click", Handler::normal(|_| None))
            .unwrap();
        assert_eq!(dom.listener_churn(), 1);
        dom.remove_listener(el, "click").unwrap();
        assert_eq!(dom.listener_churn(), 2);
    }

    #[test]
    fn test_virtualize_round_trips_markup() {
        let mut dom: LiveDom<()> = LiveDom::new();
        let div = dom.create_element("div", Namespace::Html);
        dom.set_attribute(div, "id", "root").unwrap();
        dom.set_style(div, "color", "red").unwrap();
        let text = dom.create_text("hi");
        dom.append(div, text);

        let vnode = dom.virtualize(div);
        // re-render the snapshot and compare markup
        let mut fresh: LiveDom<()> = LiveDom::new();
        let root = crate::diff::apply::render(&mut fresh, &vnode);
        assert_eq!(fresh.to_html(root), dom.to_html(div));
    }
}
