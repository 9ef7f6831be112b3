//! Immutable virtual node model.
//!
//! Virtual trees are produced fresh each render cycle and structurally
//! shared: [`VNode`] is a cheap-to-clone `Rc` handle, and [`VNode::ptr_eq`]
//! is the differ's fast path. Each node's descendant count is fixed at
//! construction and never recomputed; the patch applier uses it to prune
//! index-range searches without a second full tree walk.

use compact_str::CompactString;
use indextree::NodeId;
use smallvec::SmallVec;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dom::LiveDom;
use crate::facts::{Fact, Facts};

/// XML/HTML namespace for elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    /// HTML namespace (default)
    #[default]
    Html,
    /// SVG namespace
    Svg,
    /// MathML namespace
    MathMl,
}

impl Namespace {
    /// Returns the namespace URI.
    pub fn uri(&self) -> &'static str {
        match self {
            Namespace::Html => "http://www.w3.org/1999/xhtml",
            Namespace::Svg => "http://www.w3.org/2000/svg",
            Namespace::MathMl => "http://www.w3.org/1998/Math/MathML",
        }
    }
}

/// A single event-remapping function.
pub type MapperFn<Msg> = Rc<dyn Fn(Msg) -> Msg>;

/// Flattened chain of mappers, outermost first.
///
/// Most subtrees are wrapped by at most a couple of mappers, so the chain
/// lives inline.
pub type TaggerChain<Msg> = SmallVec<[MapperFn<Msg>; 2]>;

/// Mapper chains layered on one live node, outermost first.
///
/// Several tagged layers can share a single live node when a tagger's
/// child is a memoized subtree that itself starts with a tagger. Each
/// layer keeps its own segment so one can be swapped or torn down without
/// disturbing the others.
pub type TaggerStack<Msg> = SmallVec<[TaggerChain<Msg>; 1]>;

/// One entry of a lazy node's identity key, compared by pointer.
pub type LazyRef = Rc<dyn Any>;

/// Renders a custom widget's model into the live tree.
pub type CustomRender<Msg> = Rc<dyn Fn(&dyn Any, &mut LiveDom<Msg>) -> NodeId>;

/// Diffs two custom widget models into an optional widget patch.
pub type CustomDiff<Msg> = Rc<dyn Fn(&dyn Any, &dyn Any) -> Option<CustomPatch<Msg>>>;

/// Applies a custom widget patch to its live node.
pub type CustomPatch<Msg> = Rc<dyn Fn(&mut LiveDom<Msg>, NodeId)>;

/// An immutable description of desired UI state.
///
/// `Msg` is the caller's message type; event handlers below this node
/// produce it, and [`VNode::map`] remaps it on the way up.
pub struct VNode<Msg> {
    kind: Rc<VKind<Msg>>,
}

impl<Msg> Clone for VNode<Msg> {
    fn clone(&self) -> Self {
        VNode {
            kind: Rc::clone(&self.kind),
        }
    }
}

/// The closed set of virtual node variants.
pub enum VKind<Msg> {
    /// A text node.
    Text(CompactString),
    /// An element with ordered children.
    Element(ElementNode<Msg>),
    /// An element whose children carry stable identity keys.
    Keyed(KeyedNode<Msg>),
    /// Events below this point get remapped through a mapper chain.
    Tagged(TaggedNode<Msg>),
    /// Memoized subtree construction.
    Lazy(LazyNode<Msg>),
    /// An externally-rendered widget.
    Custom(CustomNode<Msg>),
}

/// Element payload: tag, facts, ordered children.
pub struct ElementNode<Msg> {
    /// Tag name.
    pub tag: CompactString,
    /// Element namespace.
    pub ns: Namespace,
    /// Normalized facts (attributes, properties, styles, events).
    pub facts: Facts<Msg>,
    /// Ordered children.
    pub children: Vec<VNode<Msg>>,
    /// Number of virtual nodes below this one, fixed at construction.
    pub descendants: u32,
}

/// Keyed element payload: like [`ElementNode`] but each child carries an
/// identity key used to match across renders, independent of position.
pub struct KeyedNode<Msg> {
    /// Tag name.
    pub tag: CompactString,
    /// Element namespace.
    pub ns: Namespace,
    /// Normalized facts.
    pub facts: Facts<Msg>,
    /// Ordered `(key, child)` pairs.
    pub children: Vec<(CompactString, VNode<Msg>)>,
    /// Number of virtual nodes below this one, fixed at construction.
    pub descendants: u32,
}

/// Tagged subtree payload.
pub struct TaggedNode<Msg> {
    /// Flattened mapper chain, outermost first.
    pub taggers: TaggerChain<Msg>,
    /// The wrapped subtree.
    pub child: VNode<Msg>,
    /// Number of virtual nodes below this one (`1 + child subtree`).
    pub descendants: u32,
}

/// Lazy subtree payload.
///
/// Two lazy nodes are considered equal when their identity keys are
/// pairwise reference-equal; in that case neither thunk is ever invoked.
pub struct LazyNode<Msg> {
    /// Identity key, compared entry-by-entry with `Rc::ptr_eq`.
    pub refs: Vec<LazyRef>,
    thunk: Rc<dyn Fn() -> VNode<Msg>>,
    cached: RefCell<Option<VNode<Msg>>>,
}

impl<Msg> LazyNode<Msg> {
    /// Forces the thunk, memoizing its result.
    pub fn force(&self) -> VNode<Msg> {
        if let Some(node) = self.cached.borrow().as_ref() {
            return node.clone();
        }
        let node = (self.thunk)();
        *self.cached.borrow_mut() = Some(node.clone());
        node
    }

    /// Returns the memoized result without forcing.
    pub fn cached(&self) -> Option<VNode<Msg>> {
        self.cached.borrow().clone()
    }

    /// Carries the other node's memoized result over, so the reused subtree
    /// never forces its own thunk.
    pub(crate) fn adopt(&self, other: &LazyNode<Msg>) {
        if self.cached.borrow().is_none() {
            *self.cached.borrow_mut() = other.cached();
        }
    }
}

/// Custom widget payload: an opaque model plus caller-supplied render and
/// diff functions, treated as a trusted boundary.
pub struct CustomNode<Msg> {
    /// Normalized facts applied to the widget's root live node.
    pub facts: Facts<Msg>,
    /// Opaque widget state.
    pub model: Rc<dyn Any>,
    /// Builds the widget's live subtree from the model.
    pub render: CustomRender<Msg>,
    /// Diffs two models into an optional widget patch.
    pub diff: CustomDiff<Msg>,
}

impl<Msg: 'static> VNode<Msg> {
    /// A text node.
    pub fn text(text: impl Into<CompactString>) -> Self {
        Self::from_kind(VKind::Text(text.into()))
    }

    /// An HTML element.
    pub fn element(
        tag: impl Into<CompactString>,
        facts: Vec<Fact<Msg>>,
        children: Vec<VNode<Msg>>,
    ) -> Self {
        Self::element_ns(Namespace::Html, tag, facts, children)
    }

    /// An element in an explicit namespace.
    pub fn element_ns(
        ns: Namespace,
        tag: impl Into<CompactString>,
        facts: Vec<Fact<Msg>>,
        children: Vec<VNode<Msg>>,
    ) -> Self {
        let descendants = children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum::<u32>();
        Self::from_kind(VKind::Element(ElementNode {
            tag: tag.into(),
            ns,
            facts: Facts::collect(facts),
            children,
            descendants,
        }))
    }

    /// An HTML element with keyed children.
    pub fn keyed(
        tag: impl Into<CompactString>,
        facts: Vec<Fact<Msg>>,
        children: Vec<(impl Into<CompactString>, VNode<Msg>)>,
    ) -> Self {
        Self::keyed_ns(Namespace::Html, tag, facts, children)
    }

    /// A keyed element in an explicit namespace.
    pub fn keyed_ns(
        ns: Namespace,
        tag: impl Into<CompactString>,
        facts: Vec<Fact<Msg>>,
        children: Vec<(impl Into<CompactString>, VNode<Msg>)>,
    ) -> Self {
        let children: Vec<(CompactString, VNode<Msg>)> = children
            .into_iter()
            .map(|(key, child)| (key.into(), child))
            .collect();
        let descendants = children
            .iter()
            .map(|(_, c)| 1 + c.descendant_count())
            .sum::<u32>();
        Self::from_kind(VKind::Keyed(KeyedNode {
            tag: tag.into(),
            ns,
            facts: Facts::collect(facts),
            children,
            descendants,
        }))
    }

    /// Remaps every message produced below `child`.
    ///
    /// Mapping an already-tagged child flattens into a single node with a
    /// longer chain, so nested taggers never exist and the differ can
    /// compare chains by length plus pairwise pointer equality.
    pub fn map(mapper: impl Fn(Msg) -> Msg + 'static, child: VNode<Msg>) -> Self {
        let mut taggers: TaggerChain<Msg> = SmallVec::new();
        taggers.push(Rc::new(mapper) as MapperFn<Msg>);
        let child = match child.kind() {
            VKind::Tagged(inner) => {
                taggers.extend(inner.taggers.iter().cloned());
                inner.child.clone()
            }
            _ => child.clone(),
        };
        let descendants = 1 + child.descendant_count();
        Self::from_kind(VKind::Tagged(TaggedNode {
            taggers,
            child,
            descendants,
        }))
    }

    /// Memoizes an expensive subtree construction.
    ///
    /// The thunk must be pure: as long as `refs` are pairwise
    /// reference-equal across renders, the previous result is reused and
    /// the thunk is never invoked.
    pub fn lazy(refs: Vec<LazyRef>, thunk: impl Fn() -> VNode<Msg> + 'static) -> Self {
        Self::from_kind(VKind::Lazy(LazyNode {
            refs,
            thunk: Rc::new(thunk),
            cached: RefCell::new(None),
        }))
    }

    /// An externally-rendered widget with caller-supplied render/diff.
    pub fn custom(
        facts: Vec<Fact<Msg>>,
        model: Rc<dyn Any>,
        render: CustomRender<Msg>,
        diff: CustomDiff<Msg>,
    ) -> Self {
        Self::from_kind(VKind::Custom(CustomNode {
            facts: Facts::collect(facts),
            model,
            render,
            diff,
        }))
    }

    fn from_kind(kind: VKind<Msg>) -> Self {
        VNode {
            kind: Rc::new(kind),
        }
    }
}

impl<Msg> VNode<Msg> {
    /// The variant payload.
    pub fn kind(&self) -> &VKind<Msg> {
        &self.kind
    }

    /// Reference equality: both handles point at the same node.
    pub fn ptr_eq(&self, other: &VNode<Msg>) -> bool {
        Rc::ptr_eq(&self.kind, &other.kind)
    }

    /// Number of virtual nodes strictly below this one.
    ///
    /// Lazy and custom nodes occupy a single index slot: patches inside a
    /// lazy subtree are indexed relative to it, and custom subtrees are
    /// opaque.
    pub fn descendant_count(&self) -> u32 {
        match self.kind() {
            VKind::Text(_) => 0,
            VKind::Element(el) => el.descendants,
            VKind::Keyed(el) => el.descendants,
            VKind::Tagged(tagged) => tagged.descendants,
            VKind::Lazy(_) => 0,
            VKind::Custom(_) => 0,
        }
    }
}

/// Strips keys off a keyed element so it can be compared as a plain one.
/// Children are shared, not copied; the descendant count is unchanged.
pub(crate) fn dekey<Msg>(keyed: &KeyedNode<Msg>) -> ElementNode<Msg> {
    ElementNode {
        tag: keyed.tag.clone(),
        ns: keyed.ns,
        facts: keyed.facts.clone(),
        children: keyed.children.iter().map(|(_, c)| c.clone()).collect(),
        descendants: keyed.descendants,
    }
}

impl<Msg> fmt::Debug for VNode<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            VKind::Text(text) => write!(f, "Text({text:?})"),
            VKind::Element(el) => f
                .debug_struct("Element")
                .field("tag", &el.tag)
                .field("children", &el.children)
                .finish_non_exhaustive(),
            VKind::Keyed(el) => f
                .debug_struct("Keyed")
                .field("tag", &el.tag)
                .field("children", &el.children)
                .finish_non_exhaustive(),
            VKind::Tagged(tagged) => f
                .debug_struct("Tagged")
                .field("taggers", &tagged.taggers.len())
                .field("child", &tagged.child)
                .finish(),
            VKind::Lazy(lazy) => f
                .debug_struct("Lazy")
                .field("refs", &lazy.refs.len())
                .field("forced", &lazy.cached.borrow().is_some())
                .finish(),
            VKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
