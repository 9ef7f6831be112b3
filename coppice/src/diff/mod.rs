//! Tree differ: two virtual trees in, an index-addressed patch list out.
//!
//! Patches address old-tree nodes by pre-order index. The differ never
//! touches the live tree; [`apply`] resolves indices to live nodes in a
//! second guided traversal. Indices advance by each old child's stored
//! descendant count, so unchanged subtrees are skipped in O(1).

use compact_str::CompactString;
use std::fmt;
use std::rc::Rc;

use crate::facts::{Facts, FactsDelta};
use crate::trace;
use crate::vnode::{CustomPatch, TaggerChain, VKind, VNode, dekey};

pub mod apply;
mod keyed;

pub use apply::{ApplyError, apply_patches, render, update};

/// One mutation, addressed by the old tree's pre-order index.
pub enum Patch<Msg> {
    /// Tear the node down and render `new` in its place.
    Redraw { index: u32, new: VNode<Msg> },
    /// Apply a fact delta to the element.
    Facts { index: u32, delta: FactsDelta<Msg> },
    /// Replace a text node's content.
    Text { index: u32, text: CompactString },
    /// Swap one tagger layer's mapper chain on the subtree root.
    Taggers { index: u32, chain: TaggerChain<Msg> },
    /// Drop every child at position `from` or later.
    RemoveChildren { index: u32, from: usize },
    /// Render `children` and append them.
    AppendChildren { index: u32, children: Vec<VNode<Msg>> },
    /// Keyed reorder: removals, then position-addressed inserts.
    Reorder { index: u32, ops: ReorderOps<Msg> },
    /// Remove one keyed child. When `entry` is set the detached node is
    /// stashed for re-insertion, after `patches` have updated it in place.
    RemoveNode {
        index: u32,
        entry: Option<usize>,
        patches: Vec<Patch<Msg>>,
    },
    /// Patches inside a memoized subtree, indexed relative to it.
    /// `old` is the forced old subtree that guides index resolution.
    Lazy {
        index: u32,
        old: VNode<Msg>,
        patches: Vec<Patch<Msg>>,
    },
    /// Widget-supplied patch for a custom node.
    Custom { index: u32, patch: CustomPatch<Msg> },
}

impl<Msg> Patch<Msg> {
    /// Old-tree index this patch addresses.
    pub fn index(&self) -> u32 {
        match self {
            Patch::Redraw { index, .. }
            | Patch::Facts { index, .. }
            | Patch::Text { index, .. }
            | Patch::Taggers { index, .. }
            | Patch::RemoveChildren { index, .. }
            | Patch::AppendChildren { index, .. }
            | Patch::Reorder { index, .. }
            | Patch::RemoveNode { index, .. }
            | Patch::Lazy { index, .. }
            | Patch::Custom { index, .. } => *index,
        }
    }
}

impl<Msg> fmt::Display for Patch<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Redraw { index, .. } => write!(f, "redraw @{index}"),
            Patch::Facts { index, .. } => write!(f, "facts @{index}"),
            Patch::Text { index, text } => write!(f, "text @{index} {text:?}"),
            Patch::Taggers { index, .. } => write!(f, "taggers @{index}"),
            Patch::RemoveChildren { index, from } => {
                write!(f, "remove-children @{index} from {from}")
            }
            Patch::AppendChildren { index, children } => {
                write!(f, "append-children @{index} (+{})", children.len())
            }
            Patch::Reorder { index, ops } => write!(
                f,
                "reorder @{index} ({} local, {} inserts, {} end-inserts)",
                ops.local.len(),
                ops.inserts.len(),
                ops.end_inserts.len()
            ),
            Patch::RemoveNode { index, entry, .. } => match entry {
                Some(entry) => write!(f, "remove-node @{index} (stash as entry {entry})"),
                None => write!(f, "remove-node @{index}"),
            },
            Patch::Lazy { index, patches, .. } => {
                write!(f, "lazy @{index} ({} subpatches)", patches.len())
            }
            Patch::Custom { index, .. } => write!(f, "custom @{index}"),
        }
    }
}

impl<Msg> fmt::Debug for Patch<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Payload of a [`Patch::Reorder`].
pub struct ReorderOps<Msg> {
    /// In-place diffs and [`Patch::RemoveNode`] removals for this child
    /// list, old-tree indexed. Applied before any insert, so insert
    /// positions need no adjustment.
    pub local: Vec<Patch<Msg>>,
    /// Inserts at positions in the new child list, ascending.
    pub inserts: Vec<KeyedInsert>,
    /// Entries appended after every positioned insert.
    pub end_inserts: Vec<usize>,
    /// Shared insert/move records referenced by index.
    pub entries: Vec<ReorderEntry<Msg>>,
}

/// One positioned insert inside a reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyedInsert {
    /// Position in the new child list.
    pub position: usize,
    /// Index into [`ReorderOps::entries`].
    pub entry: usize,
}

/// Where an inserted child comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Render the entry's virtual node from scratch.
    Fresh,
    /// Reuse the live node stashed by the paired removal.
    Moved,
}

/// A child entering the list, fresh or moved.
pub struct ReorderEntry<Msg> {
    pub kind: EntryKind,
    /// The new virtual node. For moves the paired removal's subpatches
    /// already bring the live node up to date with this.
    pub node: VNode<Msg>,
}

/// Diffs two virtual trees.
///
/// The returned patches are only meaningful against a live tree rendered
/// from `old` (or already patched up to it).
pub fn diff<Msg>(old: &VNode<Msg>, new: &VNode<Msg>) -> Vec<Patch<Msg>> {
    let mut patches = Vec::new();
    diff_help(old, new, &mut patches, 0);
    patches
}

pub(crate) fn push_patch<Msg>(patches: &mut Vec<Patch<Msg>>, patch: Patch<Msg>) {
    trace!("emit {patch}");
    patches.push(patch);
}

pub(crate) fn diff_help<Msg>(
    old: &VNode<Msg>,
    new: &VNode<Msg>,
    patches: &mut Vec<Patch<Msg>>,
    index: u32,
) {
    if old.ptr_eq(new) {
        return;
    }

    match (old.kind(), new.kind()) {
        (VKind::Text(old_text), VKind::Text(new_text)) => {
            if old_text != new_text {
                push_patch(
                    patches,
                    Patch::Text {
                        index,
                        text: new_text.clone(),
                    },
                );
            }
        }

        (VKind::Lazy(old_lazy), VKind::Lazy(new_lazy)) => {
            let same = old_lazy.refs.len() == new_lazy.refs.len()
                && old_lazy
                    .refs
                    .iter()
                    .zip(&new_lazy.refs)
                    .all(|(a, b)| Rc::ptr_eq(a, b));
            if same {
                // reuse without ever invoking the new thunk
                new_lazy.adopt(old_lazy);
                return;
            }
            let old_forced = old_lazy.force();
            let new_forced = new_lazy.force();
            let mut sub = Vec::new();
            diff_help(&old_forced, &new_forced, &mut sub, 0);
            if !sub.is_empty() {
                push_patch(
                    patches,
                    Patch::Lazy {
                        index,
                        old: old_forced,
                        patches: sub,
                    },
                );
            }
        }

        (VKind::Tagged(old_tagged), VKind::Tagged(new_tagged)) => {
            // chains are pre-flattened; a different length means the
            // message pipeline changed shape and nothing can be reused
            if old_tagged.taggers.len() != new_tagged.taggers.len() {
                push_patch(
                    patches,
                    Patch::Redraw {
                        index,
                        new: new.clone(),
                    },
                );
                return;
            }
            let same = old_tagged
                .taggers
                .iter()
                .zip(&new_tagged.taggers)
                .all(|(a, b)| Rc::ptr_eq(a, b));
            if !same {
                push_patch(
                    patches,
                    Patch::Taggers {
                        index,
                        chain: new_tagged.taggers.clone(),
                    },
                );
            }
            diff_help(&old_tagged.child, &new_tagged.child, patches, index + 1);
        }

        (VKind::Element(old_el), VKind::Element(new_el)) => {
            if old_el.tag != new_el.tag || old_el.ns != new_el.ns {
                push_patch(
                    patches,
                    Patch::Redraw {
                        index,
                        new: new.clone(),
                    },
                );
                return;
            }
            diff_facts_into(&old_el.facts, &new_el.facts, patches, index);
            diff_children(&old_el.children, &new_el.children, patches, index);
        }

        (VKind::Keyed(old_el), VKind::Keyed(new_el)) => {
            if old_el.tag != new_el.tag || old_el.ns != new_el.ns {
                push_patch(
                    patches,
                    Patch::Redraw {
                        index,
                        new: new.clone(),
                    },
                );
                return;
            }
            diff_facts_into(&old_el.facts, &new_el.facts, patches, index);
            keyed::diff_keyed_children(&old_el.children, &new_el.children, patches, index);
        }

        // a plain element growing keys is compared key-blind this cycle;
        // keys take effect on the next diff
        (VKind::Element(old_el), VKind::Keyed(new_keyed)) => {
            let dekeyed = dekey(new_keyed);
            if old_el.tag != dekeyed.tag || old_el.ns != dekeyed.ns {
                push_patch(
                    patches,
                    Patch::Redraw {
                        index,
                        new: new.clone(),
                    },
                );
                return;
            }
            diff_facts_into(&old_el.facts, &dekeyed.facts, patches, index);
            diff_children(&old_el.children, &dekeyed.children, patches, index);
        }

        (VKind::Custom(old_custom), VKind::Custom(new_custom)) => {
            let same_widget = Rc::ptr_eq(&old_custom.render, &new_custom.render)
                && Rc::ptr_eq(&old_custom.diff, &new_custom.diff);
            if !same_widget {
                push_patch(
                    patches,
                    Patch::Redraw {
                        index,
                        new: new.clone(),
                    },
                );
                return;
            }
            diff_facts_into(&old_custom.facts, &new_custom.facts, patches, index);
            if let Some(patch) = (new_custom.diff)(&*old_custom.model, &*new_custom.model) {
                push_patch(patches, Patch::Custom { index, patch });
            }
        }

        _ => {
            push_patch(
                patches,
                Patch::Redraw {
                    index,
                    new: new.clone(),
                },
            );
        }
    }
}

/// Pairwise child diff for unkeyed elements.
///
/// At most one structural patch is emitted per list: trailing removals
/// or trailing appends, never interior edits. Interior changes surface
/// as per-child patches at shifted content.
fn diff_children<Msg>(
    old: &[VNode<Msg>],
    new: &[VNode<Msg>],
    patches: &mut Vec<Patch<Msg>>,
    mut index: u32,
) {
    if old.len() > new.len() {
        push_patch(
            patches,
            Patch::RemoveChildren {
                index,
                from: new.len(),
            },
        );
    } else if old.len() < new.len() {
        push_patch(
            patches,
            Patch::AppendChildren {
                index,
                children: new[old.len()..].to_vec(),
            },
        );
    }

    for (old_child, new_child) in old.iter().zip(new) {
        index += 1;
        diff_help(old_child, new_child, patches, index);
        index += old_child.descendant_count();
    }
}

fn diff_facts_into<Msg>(
    old: &Facts<Msg>,
    new: &Facts<Msg>,
    patches: &mut Vec<Patch<Msg>>,
    index: u32,
) {
    let delta = diff_facts(old, new);
    if !delta.is_empty() {
        push_patch(patches, Patch::Facts { index, delta });
    }
}

/// Per-category delta between two fact sets. Only touched names appear;
/// `None` marks removal.
pub fn diff_facts<Msg>(old: &Facts<Msg>, new: &Facts<Msg>) -> FactsDelta<Msg> {
    let mut delta = FactsDelta::new();

    for (name, old_value) in &old.attrs {
        match new.attrs.get(name) {
            None => {
                delta.attrs.insert(name.clone(), None);
            }
            Some(new_value) if new_value != old_value => {
                delta.attrs.insert(name.clone(), Some(new_value.clone()));
            }
            Some(_) => {}
        }
    }
    for (name, value) in &new.attrs {
        if !old.attrs.contains_key(name) {
            delta.attrs.insert(name.clone(), Some(value.clone()));
        }
    }

    for (name, old_value) in &old.attrs_ns {
        match new.attrs_ns.get(name) {
            None => {
                delta.attrs_ns.insert(name.clone(), None);
            }
            Some(new_value) if new_value != old_value => {
                delta.attrs_ns.insert(name.clone(), Some(new_value.clone()));
            }
            Some(_) => {}
        }
    }
    for (name, value) in &new.attrs_ns {
        if !old.attrs_ns.contains_key(name) {
            delta.attrs_ns.insert(name.clone(), Some(value.clone()));
        }
    }

    for (name, old_value) in &old.props {
        match new.props.get(name) {
            None => {
                delta.props.insert(name.clone(), None);
            }
            Some(new_value) if new_value != old_value => {
                delta.props.insert(name.clone(), Some(new_value.clone()));
            }
            Some(_) => {}
        }
    }
    for (name, value) in &new.props {
        if !old.props.contains_key(name) {
            delta.props.insert(name.clone(), Some(value.clone()));
        }
    }

    for (name, old_value) in &old.styles {
        match new.styles.get(name) {
            None => {
                delta.styles.insert(name.clone(), None);
            }
            Some(new_value) if new_value != old_value => {
                delta.styles.insert(name.clone(), Some(new_value.clone()));
            }
            Some(_) => {}
        }
    }
    for (name, value) in &new.styles {
        if !old.styles.contains_key(name) {
            delta.styles.insert(name.clone(), Some(value.clone()));
        }
    }

    for (name, old_handler) in &old.events {
        match new.events.get(name) {
            None => {
                delta.events.insert(name.clone(), None);
            }
            Some(new_handler) if !new_handler.matches(old_handler) => {
                delta.events.insert(name.clone(), Some(new_handler.clone()));
            }
            Some(_) => {}
        }
    }
    for (name, handler) in &new.events {
        if !old.events.contains_key(name) {
            delta.events.insert(name.clone(), Some(handler.clone()));
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Fact;

    fn text(s: &str) -> VNode<()> {
        VNode::text(s)
    }

    fn div(children: Vec<VNode<()>>) -> VNode<()> {
        VNode::element("div", vec![], children)
    }

    #[test]
    fn test_identical_handles_produce_no_patches() {
        let tree = div(vec![text("a"), text("b")]);
        assert!(diff(&tree, &tree.clone()).is_empty());
    }

    #[test]
    fn test_shared_subtree_is_skipped() {
        let shared = div(vec![text("expensive")]);
        let old = div(vec![shared.clone(), text("x")]);
        let new = div(vec![shared, text("y")]);
        let patches = diff(&old, &new);
        assert_eq!(patches.len(), 1);
        // shared child occupies indices 1..=2, text lands at 3
        match &patches[0] {
            Patch::Text { index, text } => {
                assert_eq!(*index, 3);
                assert_eq!(text, "y");
            }
            other => panic!("expected text patch, got {other}"),
        }
    }

    #[test]
    fn test_tag_change_redraws() {
        let old = div(vec![]);
        let new: VNode<()> = VNode::element("span", vec![], vec![]);
        let patches = diff(&old, &new);
        assert!(matches!(patches[0], Patch::Redraw { index: 0, .. }));
    }

    #[test]
    fn test_variant_change_redraws() {
        let old = text("a");
        let new = div(vec![]);
        let patches = diff(&old, &new);
        assert!(matches!(patches[0], Patch::Redraw { index: 0, .. }));
    }

    #[test]
    fn test_children_grow_appends_suffix() {
        let old = div(vec![text("a")]);
        let new = div(vec![text("a"), text("b"), text("c")]);
        let patches = diff(&old, &new);
        assert_eq!(patches.len(), 1);
        match &patches[0] {
            Patch::AppendChildren { index: 0, children } => assert_eq!(children.len(), 2),
            other => panic!("expected append, got {other}"),
        }
    }

    #[test]
    fn test_children_shrink_removes_suffix() {
        let old = div(vec![text("a"), text("b"), text("c")]);
        let new = div(vec![text("a")]);
        let patches = diff(&old, &new);
        assert_eq!(patches.len(), 1);
        assert!(matches!(
            patches[0],
            Patch::RemoveChildren { index: 0, from: 1 }
        ));
    }

    #[test]
    fn test_facts_delta_only_touched_names() {
        let old: VNode<()> = VNode::element(
            "div",
            vec![
                Fact::attr("id", "x"),
                Fact::attr("title", "old"),
                Fact::attr("lang", "en"),
            ],
            vec![],
        );
        let new: VNode<()> = VNode::element(
            "div",
            vec![
                Fact::attr("id", "x"),
                Fact::attr("title", "new"),
                Fact::attr("dir", "ltr"),
            ],
            vec![],
        );
        let patches = diff(&old, &new);
        assert_eq!(patches.len(), 1);
        let Patch::Facts { delta, .. } = &patches[0] else {
            panic!("expected facts patch");
        };
        assert_eq!(delta.attrs.get("title"), Some(&Some("new".into())));
        assert_eq!(delta.attrs.get("lang"), Some(&None));
        assert_eq!(delta.attrs.get("dir"), Some(&Some("ltr".into())));
        assert!(!delta.attrs.contains_key("id"));
    }

    #[test]
    fn test_element_to_keyed_compares_key_blind() {
        let old = div(vec![text("a"), text("b")]);
        let new: VNode<()> = VNode::keyed(
            "div",
            vec![],
            vec![("k1", text("a")), ("k2", text("changed"))],
        );
        let patches = diff(&old, &new);
        assert_eq!(patches.len(), 1);
        assert!(matches!(patches[0], Patch::Text { index: 2, .. }));
    }

    #[test]
    fn test_lazy_same_refs_short_circuits() {
        let key: Rc<dyn std::any::Any> = Rc::new(42u32);
        let old: VNode<()> = VNode::lazy(vec![Rc::clone(&key)], || VNode::text("body"));
        // force old, as rendering would
        let VKind::Lazy(old_lazy) = old.kind() else {
            panic!()
        };
        old_lazy.force();

        let new: VNode<()> = VNode::lazy(vec![key], || panic!("thunk must not run"));
        let patches = diff(&old, &new);
        assert!(patches.is_empty());
        let VKind::Lazy(new_lazy) = new.kind() else {
            panic!()
        };
        // cache adopted from the old node
        assert!(new_lazy.cached().is_some());
    }

    #[test]
    fn test_lazy_changed_refs_diffs_forced_trees() {
        let old: VNode<()> = VNode::lazy(vec![Rc::new(1u32) as Rc<dyn std::any::Any>], || {
            div(vec![text("one")])
        });
        let VKind::Lazy(old_lazy) = old.kind() else {
            panic!()
        };
        old_lazy.force();
        let new: VNode<()> = VNode::lazy(vec![Rc::new(2u32) as Rc<dyn std::any::Any>], || {
            div(vec![text("two")])
        });

        let patches = diff(&old, &new);
        assert_eq!(patches.len(), 1);
        let Patch::Lazy { index, patches: sub, .. } = &patches[0] else {
            panic!("expected lazy patch");
        };
        assert_eq!(*index, 0);
        // subpatch indexed relative to the lazy subtree
        assert!(matches!(sub[0], Patch::Text { index: 1, .. }));
    }

    #[test]
    fn test_tagger_chain_same_functions_no_patch() {
        let mapper: Rc<dyn Fn(i32) -> i32> = Rc::new(|m| m + 1);
        let m1 = Rc::clone(&mapper);
        let m2 = Rc::clone(&mapper);
        let old: VNode<i32> = VNode::map(move |m| m1(m), VNode::text("x"));
        let new: VNode<i32> = VNode::map(move |m| m2(m), VNode::text("x"));
        // closures differ even though they wrap the same function
        let patches = diff(&old, &new);
        assert_eq!(patches.len(), 1);
        assert!(matches!(patches[0], Patch::Taggers { index: 0, .. }));

        // identical chain, no patch
        let same = diff(&old, &old.clone());
        assert!(same.is_empty());
    }

    #[test]
    fn test_tagger_chain_length_change_redraws() {
        let old: VNode<i32> = VNode::map(|m| m, VNode::text("x"));
        let new: VNode<i32> = VNode::map(|m| m, VNode::map(|m| m, VNode::text("x")));
        let patches = diff(&old, &new);
        assert!(matches!(patches[0], Patch::Redraw { index: 0, .. }));
    }
}
