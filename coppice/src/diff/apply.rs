//! Rendering virtual trees into the live arena and applying patch lists.
//!
//! Patches address old-tree pre-order indices. Before execution, a guided
//! traversal walks the old virtual tree and the live tree side by side and
//! binds each needed index to its live node, skipping any subtree whose
//! index range holds no pending patch. The executor then runs patches in
//! list order against the binding table.
//!
//! Tagged virtual nodes share their child's live node, so a binding also
//! records which tagger layer of that live node the index addresses.

use indextree::NodeId;
use rapidhash::RapidHashMap;

use super::{EntryKind, Patch, ReorderOps, diff};
use crate::debug;
use crate::dom::{DomError, LiveDom};
use crate::facts::{Facts, FactsDelta};
use crate::vnode::{TaggerStack, VKind, VNode};

/// Errors from patch application.
///
/// These surface only when a patch list is applied against a live tree it
/// was not diffed for.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// No live node was bound for a patch index.
    #[error("no live node bound for index {index}")]
    MissingNode { index: u32 },
    /// A patch addressed a live node of the wrong kind.
    #[error("live node at index {index} has the wrong kind")]
    WrongKind {
        index: u32,
        #[source]
        source: DomError,
    },
    /// A reorder referenced an entry that does not exist or was already
    /// consumed.
    #[error("reorder entry {entry} missing or already consumed")]
    MissingEntry { entry: usize },
    /// A removal patch appeared outside a reorder.
    #[error("remove-node patch outside a reorder at index {index}")]
    MisplacedPatch { index: u32 },
}

/// Renders a virtual tree into fresh live nodes. The returned node is
/// detached; the caller decides where it goes.
pub fn render<Msg: 'static>(dom: &mut LiveDom<Msg>, vnode: &VNode<Msg>) -> NodeId {
    match vnode.kind() {
        VKind::Text(text) => dom.create_text(text.clone()),
        VKind::Element(el) => {
            let node = dom.create_element(el.tag.clone(), el.ns);
            if let Err(err) = apply_facts(dom, node, &el.facts) {
                debug!("dropping facts: {err}");
            }
            for child in &el.children {
                let rendered = render(dom, child);
                dom.append(node, rendered);
            }
            node
        }
        VKind::Keyed(el) => {
            let node = dom.create_element(el.tag.clone(), el.ns);
            if let Err(err) = apply_facts(dom, node, &el.facts) {
                debug!("dropping facts: {err}");
            }
            for (_, child) in &el.children {
                let rendered = render(dom, child);
                dom.append(node, rendered);
            }
            node
        }
        VKind::Tagged(tagged) => {
            let node = render(dom, &tagged.child);
            // outer mappers run last, so the layer goes in front
            dom.get_mut(node).taggers.insert(0, tagged.taggers.clone());
            node
        }
        VKind::Lazy(lazy) => {
            let forced = lazy.force();
            render(dom, &forced)
        }
        VKind::Custom(custom) => {
            let node = (custom.render)(&*custom.model, dom);
            if let Err(err) = apply_facts(dom, node, &custom.facts) {
                debug!("dropping facts on custom root: {err}");
            }
            node
        }
    }
}

/// Diffs `old` against `new` and applies the result in one step.
/// Returns the live root, which changes only on a root redraw.
pub fn update<Msg: 'static>(
    dom: &mut LiveDom<Msg>,
    root: NodeId,
    old: &VNode<Msg>,
    new: &VNode<Msg>,
) -> Result<NodeId, ApplyError> {
    let patches = diff(old, new);
    apply_patches(dom, root, old, &patches)
}

/// Applies a patch list produced by diffing `old` against some new tree.
/// `root` must be the live rendering of `old`.
pub fn apply_patches<Msg: 'static>(
    dom: &mut LiveDom<Msg>,
    root: NodeId,
    old: &VNode<Msg>,
    patches: &[Patch<Msg>],
) -> Result<NodeId, ApplyError> {
    apply_patches_at(dom, root, old, patches, 0)
}

/// A resolved patch target: the live node plus the number of tagger
/// layers sitting above the addressed virtual node on that same live
/// node.
#[derive(Clone, Copy)]
struct Binding {
    node: NodeId,
    layer: usize,
}

/// `layer` is the tagger depth of `old`'s root on the live node; non-zero
/// when recursing into a memoized subtree below taggers.
fn apply_patches_at<Msg: 'static>(
    dom: &mut LiveDom<Msg>,
    root: NodeId,
    old: &VNode<Msg>,
    patches: &[Patch<Msg>],
    layer: usize,
) -> Result<NodeId, ApplyError> {
    if patches.is_empty() {
        return Ok(root);
    }

    let mut needed = Vec::new();
    collect_indices(patches, &mut needed);
    needed.sort_unstable();
    needed.dedup();

    let mut bindings = RapidHashMap::default();
    add_bindings(dom, old, root, 0, layer, &needed, &mut bindings);

    let mut current_root = root;
    for patch in patches {
        if let Some((replaced, replacement)) = apply_patch(dom, patch, &bindings)? {
            if replaced == current_root {
                current_root = replacement;
            }
        }
    }
    Ok(current_root)
}

/// Every index the binding pass must resolve. Reorder internals count;
/// lazy subpatches do not, they are rebound relative to their subtree.
fn collect_indices<Msg>(patches: &[Patch<Msg>], out: &mut Vec<u32>) {
    for patch in patches {
        out.push(patch.index());
        match patch {
            Patch::Reorder { ops, .. } => collect_indices(&ops.local, out),
            Patch::RemoveNode { patches, .. } => collect_indices(patches, out),
            _ => {}
        }
    }
}

fn range_has_target(needed: &[u32], low: u32, high: u32) -> bool {
    match needed.binary_search(&low) {
        Ok(_) => true,
        Err(pos) => needed.get(pos).is_some_and(|&idx| idx <= high),
    }
}

/// Walks the old virtual tree and the live tree in lockstep, binding each
/// needed index to its live node and tagger layer. A subtree whose index
/// range contains no needed index is skipped whole.
fn add_bindings<Msg>(
    dom: &LiveDom<Msg>,
    vnode: &VNode<Msg>,
    node: NodeId,
    index: u32,
    layer: usize,
    needed: &[u32],
    bindings: &mut RapidHashMap<u32, Binding>,
) {
    if !range_has_target(needed, index, index + vnode.descendant_count()) {
        return;
    }
    if needed.binary_search(&index).is_ok() {
        bindings.insert(index, Binding { node, layer });
    }
    match vnode.kind() {
        VKind::Text(_) | VKind::Lazy(_) | VKind::Custom(_) => {}
        // a tagged node shares its child's live node, one layer down
        VKind::Tagged(tagged) => {
            add_bindings(dom, &tagged.child, node, index + 1, layer + 1, needed, bindings);
        }
        VKind::Element(el) => {
            let mut child_index = index;
            for (vchild, lchild) in el.children.iter().zip(dom.children(node)) {
                child_index += 1;
                add_bindings(dom, vchild, lchild, child_index, 0, needed, bindings);
                child_index += vchild.descendant_count();
            }
        }
        VKind::Keyed(el) => {
            let mut child_index = index;
            for ((_, vchild), lchild) in el.children.iter().zip(dom.children(node)) {
                child_index += 1;
                add_bindings(dom, vchild, lchild, child_index, 0, needed, bindings);
                child_index += vchild.descendant_count();
            }
        }
    }
}

/// Applies one patch. `Ok(Some((old, new)))` reports that `old` was
/// replaced by `new` in the tree, so callers can track their root.
fn apply_patch<Msg: 'static>(
    dom: &mut LiveDom<Msg>,
    patch: &Patch<Msg>,
    bindings: &RapidHashMap<u32, Binding>,
) -> Result<Option<(NodeId, NodeId)>, ApplyError> {
    let index = patch.index();
    let Binding { node, layer } = *bindings
        .get(&index)
        .ok_or(ApplyError::MissingNode { index })?;

    match patch {
        Patch::Text { text, .. } => {
            dom.set_text(node, text.clone())
                .map_err(|source| ApplyError::WrongKind { index, source })?;
            Ok(None)
        }
        Patch::Facts { delta, .. } => {
            apply_facts_delta(dom, node, delta)
                .map_err(|source| ApplyError::WrongKind { index, source })?;
            Ok(None)
        }
        Patch::Taggers { chain, .. } => {
            // swap only this layer's segment; other layers sharing the
            // live node keep theirs
            let stack = &mut dom.get_mut(node).taggers;
            match stack.get_mut(layer) {
                Some(slot) => *slot = chain.clone(),
                None => stack.push(chain.clone()),
            }
            Ok(None)
        }
        Patch::Redraw { new, .. } => {
            let fresh = render(dom, new);
            // tagger layers above the redrawn node survive the teardown,
            // stacked over whatever the replacement installed for itself
            let outer: TaggerStack<Msg> =
                dom.get(node).taggers.iter().take(layer).cloned().collect();
            if !outer.is_empty() {
                dom.get_mut(fresh).taggers.insert_many(0, outer);
            }
            dom.replace_child(node, fresh);
            Ok(Some((node, fresh)))
        }
        Patch::RemoveChildren { from, .. } => {
            let children: Vec<NodeId> = dom.children(node).collect();
            for child in children.into_iter().skip(*from) {
                dom.remove_child(child);
            }
            Ok(None)
        }
        Patch::AppendChildren { children, .. } => {
            for vchild in children {
                let fresh = render(dom, vchild);
                dom.append(node, fresh);
            }
            Ok(None)
        }
        Patch::Reorder { ops, .. } => {
            apply_reorder(dom, node, ops, bindings)?;
            Ok(None)
        }
        Patch::Lazy { old, patches, .. } => {
            let replacement = apply_patches_at(dom, node, old, patches, layer)?;
            Ok((replacement != node).then_some((node, replacement)))
        }
        Patch::Custom { patch, .. } => {
            (patch)(dom, node);
            Ok(None)
        }
        Patch::RemoveNode { .. } => Err(ApplyError::MisplacedPatch { index }),
    }
}

/// Reorder execution: all in-place updates and removals first, then
/// positioned inserts in ascending order, then end inserts. Removal-first
/// keeps the recorded new-list positions valid as-is.
fn apply_reorder<Msg: 'static>(
    dom: &mut LiveDom<Msg>,
    parent: NodeId,
    ops: &ReorderOps<Msg>,
    bindings: &RapidHashMap<u32, Binding>,
) -> Result<(), ApplyError> {
    let mut stash: Vec<Option<NodeId>> = vec![None; ops.entries.len()];

    for patch in &ops.local {
        match patch {
            Patch::RemoveNode {
                index,
                entry,
                patches,
            } => {
                let node = bindings
                    .get(index)
                    .ok_or(ApplyError::MissingNode { index: *index })?
                    .node;
                match entry {
                    Some(entry) => {
                        // bring the node up to date before it moves
                        let mut moved = node;
                        for sub in patches {
                            if let Some((replaced, replacement)) =
                                apply_patch(dom, sub, bindings)?
                            {
                                if replaced == moved {
                                    moved = replacement;
                                }
                            }
                        }
                        dom.remove_child(moved);
                        let slot = stash
                            .get_mut(*entry)
                            .ok_or(ApplyError::MissingEntry { entry: *entry })?;
                        *slot = Some(moved);
                    }
                    None => dom.remove_child(node),
                }
            }
            other => {
                apply_patch(dom, other, bindings)?;
            }
        }
    }

    for insert in &ops.inserts {
        let node = take_entry(dom, ops, &mut stash, insert.entry)?;
        dom.insert_at(parent, insert.position, node);
    }

    for &entry in &ops.end_inserts {
        let node = take_entry(dom, ops, &mut stash, entry)?;
        dom.append(parent, node);
    }

    Ok(())
}

fn take_entry<Msg: 'static>(
    dom: &mut LiveDom<Msg>,
    ops: &ReorderOps<Msg>,
    stash: &mut [Option<NodeId>],
    entry: usize,
) -> Result<NodeId, ApplyError> {
    let record = ops
        .entries
        .get(entry)
        .ok_or(ApplyError::MissingEntry { entry })?;
    match record.kind {
        EntryKind::Fresh => Ok(render(dom, &record.node)),
        EntryKind::Moved => stash
            .get_mut(entry)
            .and_then(Option::take)
            .ok_or(ApplyError::MissingEntry { entry }),
    }
}

/// Initial fact application while rendering.
fn apply_facts<Msg>(
    dom: &mut LiveDom<Msg>,
    node: NodeId,
    facts: &Facts<Msg>,
) -> Result<(), DomError> {
    for (name, value) in &facts.attrs {
        dom.set_attribute(node, name.clone(), value.clone())?;
    }
    for (name, value) in &facts.attrs_ns {
        dom.set_attribute_ns(node, name.clone(), value.clone())?;
    }
    for (name, value) in &facts.props {
        dom.set_property(node, name.clone(), value.clone())?;
    }
    for (name, value) in &facts.styles {
        dom.set_style(node, name.clone(), value.clone())?;
    }
    for (name, handler) in &facts.events {
        dom.add_listener(node, name.clone(), handler.clone())?;
    }
    Ok(())
}

fn apply_facts_delta<Msg>(
    dom: &mut LiveDom<Msg>,
    node: NodeId,
    delta: &FactsDelta<Msg>,
) -> Result<(), DomError> {
    for (name, value) in &delta.attrs {
        match value {
            Some(value) => dom.set_attribute(node, name.clone(), value.clone())?,
            None => dom.remove_attribute(node, name)?,
        }
    }
    for (name, value) in &delta.attrs_ns {
        match value {
            Some(value) => dom.set_attribute_ns(node, name.clone(), value.clone())?,
            None => dom.remove_attribute_ns(node, name)?,
        }
    }
    for (name, value) in &delta.props {
        match value {
            Some(value) => dom.set_property(node, name.clone(), value.clone())?,
            None => dom.remove_property(node, name)?,
        }
    }
    for (name, value) in &delta.styles {
        match value {
            Some(value) => dom.set_style(node, name.clone(), value.clone())?,
            None => dom.remove_style(node, name)?,
        }
    }
    for (name, handler) in &delta.events {
        match handler {
            Some(handler) => {
                // same kind swaps the decoder in place, anything else
                // re-registers
                if dom.listener_kind(node, name) == Some(handler.kind) {
                    dom.rebind_listener(node, name.clone(), handler.clone())?;
                } else {
                    if dom.listener_kind(node, name).is_some() {
                        dom.remove_listener(node, name)?;
                    }
                    dom.add_listener(node, name.clone(), handler.clone())?;
                }
            }
            None => dom.remove_listener(node, name)?,
        }
    }
    Ok(())
}
