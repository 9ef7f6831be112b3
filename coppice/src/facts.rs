//! Facts: everything declared on an element besides its tag and children.
//!
//! Callers hand constructors a flat `Vec<Fact>`; [`Facts::collect`]
//! normalizes it into per-category insertion-ordered maps once, at
//! construction, so the differ only ever compares maps.

use compact_str::CompactString;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// How an event handler interacts with propagation defaults.
///
/// The kind is part of handler identity: a handler whose kind changed must
/// be re-registered on the live node, not just swapped in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Plain handler.
    Normal,
    /// Handler decides per event whether to stop propagation.
    MayStopPropagation,
    /// Handler decides per event whether to prevent the default action.
    MayPreventDefault,
    /// Handler controls both.
    Custom,
}

/// Decodes an event payload into a message, or ignores the event.
pub type HandlerFn<Msg> = Rc<dyn Fn(&str) -> Option<Msg>>;

/// An event handler: decode function plus propagation behavior.
pub struct Handler<Msg> {
    /// Propagation behavior.
    pub kind: HandlerKind,
    /// Payload decoder.
    pub callback: HandlerFn<Msg>,
}

impl<Msg> Handler<Msg> {
    pub fn new(kind: HandlerKind, callback: impl Fn(&str) -> Option<Msg> + 'static) -> Self {
        Handler {
            kind,
            callback: Rc::new(callback),
        }
    }

    /// A [`HandlerKind::Normal`] handler.
    pub fn normal(callback: impl Fn(&str) -> Option<Msg> + 'static) -> Self {
        Self::new(HandlerKind::Normal, callback)
    }

    /// Same kind and same callback, by pointer.
    ///
    /// Callbacks are closures with no useful structural equality; a fresh
    /// closure each render reads as "changed" even if behaviorally
    /// identical.
    pub fn matches(&self, other: &Handler<Msg>) -> bool {
        self.kind == other.kind && Rc::ptr_eq(&self.callback, &other.callback)
    }

    /// Whether this handler's kind lets it halt event bubbling.
    pub(crate) fn may_stop_propagation(&self) -> bool {
        matches!(
            self.kind,
            HandlerKind::MayStopPropagation | HandlerKind::Custom
        )
    }
}

impl<Msg> Clone for Handler<Msg> {
    fn clone(&self) -> Self {
        Handler {
            kind: self.kind,
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<Msg> fmt::Debug for Handler<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:?})", self.kind)
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    String(CompactString),
    Bool(bool),
    Number(f64),
}

/// A namespaced attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsAttr {
    /// Namespace URI.
    pub ns: CompactString,
    /// Attribute value.
    pub value: CompactString,
}

/// One declared fact, as written by the caller.
pub enum Fact<Msg> {
    /// Plain attribute.
    Attr(CompactString, CompactString),
    /// Namespaced attribute.
    AttrNs(CompactString, NsAttr),
    /// Property.
    Prop(CompactString, PropValue),
    /// Inline style entry.
    Style(CompactString, CompactString),
    /// Event listener.
    Event(CompactString, Handler<Msg>),
}

impl<Msg> Fact<Msg> {
    pub fn attr(name: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        Fact::Attr(name.into(), value.into())
    }

    pub fn attr_ns(
        name: impl Into<CompactString>,
        ns: impl Into<CompactString>,
        value: impl Into<CompactString>,
    ) -> Self {
        Fact::AttrNs(
            name.into(),
            NsAttr {
                ns: ns.into(),
                value: value.into(),
            },
        )
    }

    pub fn prop(name: impl Into<CompactString>, value: PropValue) -> Self {
        Fact::Prop(name.into(), value)
    }

    pub fn style(name: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        Fact::Style(name.into(), value.into())
    }

    pub fn on(event: impl Into<CompactString>, handler: Handler<Msg>) -> Self {
        Fact::Event(event.into(), handler)
    }
}

/// Normalized facts, one insertion-ordered map per category.
pub struct Facts<Msg> {
    pub attrs: IndexMap<CompactString, CompactString>,
    pub attrs_ns: IndexMap<CompactString, NsAttr>,
    pub props: IndexMap<CompactString, PropValue>,
    pub styles: IndexMap<CompactString, CompactString>,
    pub events: IndexMap<CompactString, Handler<Msg>>,
}

impl<Msg> Facts<Msg> {
    /// Normalizes a declared fact list.
    ///
    /// Within a category, a repeated name overwrites the earlier entry.
    /// The `class` attribute and `className` string property instead
    /// accumulate: repeated declarations are joined with a single space,
    /// in declaration order.
    pub fn collect(facts: Vec<Fact<Msg>>) -> Self {
        let mut out = Facts {
            attrs: IndexMap::new(),
            attrs_ns: IndexMap::new(),
            props: IndexMap::new(),
            styles: IndexMap::new(),
            events: IndexMap::new(),
        };
        for fact in facts {
            match fact {
                Fact::Attr(name, value) => {
                    if name == "class" {
                        append_class(out.attrs.entry(name).or_default(), &value);
                    } else {
                        out.attrs.insert(name, value);
                    }
                }
                Fact::AttrNs(name, value) => {
                    out.attrs_ns.insert(name, value);
                }
                Fact::Prop(name, value) => {
                    let mut pending = Some(value);
                    if name == "className" {
                        if let (Some(PropValue::String(existing)), Some(PropValue::String(addition))) =
                            (out.props.get_mut(&name), pending.as_ref())
                        {
                            append_class(existing, addition);
                            pending = None;
                        }
                    }
                    if let Some(value) = pending {
                        out.props.insert(name, value);
                    }
                }
                Fact::Style(name, value) => {
                    out.styles.insert(name, value);
                }
                Fact::Event(name, handler) => {
                    out.events.insert(name, handler);
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
            && self.attrs_ns.is_empty()
            && self.props.is_empty()
            && self.styles.is_empty()
            && self.events.is_empty()
    }
}

fn append_class(existing: &mut CompactString, addition: &str) {
    if !existing.is_empty() {
        existing.push(' ');
    }
    existing.push_str(addition);
}

impl<Msg> Clone for Facts<Msg> {
    fn clone(&self) -> Self {
        Facts {
            attrs: self.attrs.clone(),
            attrs_ns: self.attrs_ns.clone(),
            props: self.props.clone(),
            styles: self.styles.clone(),
            events: self.events.clone(),
        }
    }
}

impl<Msg> Default for Facts<Msg> {
    fn default() -> Self {
        Facts::collect(Vec::new())
    }
}

impl<Msg> fmt::Debug for Facts<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facts")
            .field("attrs", &self.attrs)
            .field("attrs_ns", &self.attrs_ns)
            .field("props", &self.props)
            .field("styles", &self.styles)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-category changes between two [`Facts`].
///
/// `None` means "remove"; the applier maps it to the category's removal
/// primitive. Untouched names never appear.
pub struct FactsDelta<Msg> {
    pub attrs: IndexMap<CompactString, Option<CompactString>>,
    pub attrs_ns: IndexMap<CompactString, Option<NsAttr>>,
    pub props: IndexMap<CompactString, Option<PropValue>>,
    pub styles: IndexMap<CompactString, Option<CompactString>>,
    pub events: IndexMap<CompactString, Option<Handler<Msg>>>,
}

impl<Msg> FactsDelta<Msg> {
    pub(crate) fn new() -> Self {
        FactsDelta {
            attrs: IndexMap::new(),
            attrs_ns: IndexMap::new(),
            props: IndexMap::new(),
            styles: IndexMap::new(),
            events: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
            && self.attrs_ns.is_empty()
            && self.props.is_empty()
            && self.styles.is_empty()
            && self.events.is_empty()
    }
}

impl<Msg> Clone for FactsDelta<Msg> {
    fn clone(&self) -> Self {
        FactsDelta {
            attrs: self.attrs.clone(),
            attrs_ns: self.attrs_ns.clone(),
            props: self.props.clone(),
            styles: self.styles.clone(),
            events: self.events.clone(),
        }
    }
}

impl<Msg> fmt::Debug for FactsDelta<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactsDelta")
            .field("attrs", &self.attrs)
            .field("attrs_ns", &self.attrs_ns)
            .field("props", &self.props)
            .field("styles", &self.styles)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
    }
}
