//! Keyed child list differ.
//!
//! Two cursors walk the old and new lists with a lookahead of one on
//! each side, which resolves a swap, a single insert, a single remove,
//! or a remove-then-insert without losing cursor sync. Anything messier
//! drops to the drain step: remaining old children become removals,
//! remaining new children become end inserts, and the per-invocation
//! `seen` map pairs a removal with an insert of the same key into a
//! move, wherever the two were recorded.
//!
//! Everything lands in one [`Patch::Reorder`] at the parent, so the
//! applier can run all removals before any positioned insert.

use compact_str::{CompactString, format_compact};
use rapidhash::RapidHashMap;

use super::{EntryKind, KeyedInsert, Patch, ReorderEntry, ReorderOps, diff_help, push_patch};
use crate::debug;
use crate::vnode::VNode;

pub(crate) fn diff_keyed_children<Msg>(
    old: &[(CompactString, VNode<Msg>)],
    new: &[(CompactString, VNode<Msg>)],
    patches: &mut Vec<Patch<Msg>>,
    root_index: u32,
) {
    let mut state = KeyedDiff::new();
    let mut index = root_index;
    let mut i = 0;
    let mut j = 0;

    while i < old.len() && j < new.len() {
        let (x_key, x_node) = &old[i];
        let (y_key, y_node) = &new[j];

        if x_key == y_key {
            index += 1;
            diff_help(x_node, y_node, &mut state.local, index);
            index += x_node.descendant_count();
            i += 1;
            j += 1;
            continue;
        }

        let x_next = old.get(i + 1);
        let y_next = new.get(j + 1);
        let old_match = matches!(x_next, Some((k, _)) if k == y_key);
        let new_match = matches!(y_next, Some((k, _)) if k == x_key);

        // swap: both lookaheads hit
        if new_match && old_match {
            let (_, y_next_node) = &new[j + 1];
            let (_, x_next_node) = &old[i + 1];

            index += 1;
            diff_help(x_node, y_next_node, &mut state.local, index);
            state.insert(y_key.clone(), y_node, Some(j));
            index += x_node.descendant_count();

            index += 1;
            state.remove(y_key.clone(), x_next_node, index);
            index += x_next_node.descendant_count();

            i += 2;
            j += 2;
            continue;
        }

        // one new child slotted in front of x
        if new_match {
            let (_, y_next_node) = &new[j + 1];

            index += 1;
            state.insert(y_key.clone(), y_node, Some(j));
            diff_help(x_node, y_next_node, &mut state.local, index);
            index += x_node.descendant_count();

            i += 1;
            j += 2;
            continue;
        }

        // x disappeared, its successor lines up with y
        if old_match {
            let (_, x_next_node) = &old[i + 1];

            index += 1;
            state.remove(x_key.clone(), x_node, index);
            index += x_node.descendant_count();

            index += 1;
            diff_help(x_next_node, y_node, &mut state.local, index);
            index += x_next_node.descendant_count();

            i += 2;
            j += 1;
            continue;
        }

        // x replaced by y, successors line up with each other
        if let (Some((x_next_key, x_next_node)), Some((y_next_key, y_next_node))) =
            (x_next, y_next)
        {
            if x_next_key == y_next_key {
                index += 1;
                state.remove(x_key.clone(), x_node, index);
                state.insert(y_key.clone(), y_node, Some(j));
                index += x_node.descendant_count();

                index += 1;
                diff_help(x_next_node, y_next_node, &mut state.local, index);
                index += x_next_node.descendant_count();

                i += 2;
                j += 2;
                continue;
            }
        }

        // lookahead exhausted, drain the rest
        break;
    }

    while i < old.len() {
        let (x_key, x_node) = &old[i];
        index += 1;
        state.remove(x_key.clone(), x_node, index);
        index += x_node.descendant_count();
        i += 1;
    }

    for (y_key, y_node) in &new[j..] {
        state.insert(y_key.clone(), y_node, None);
    }

    if !state.local.is_empty() || !state.inserts.is_empty() || !state.end_inserts.is_empty() {
        push_patch(
            patches,
            Patch::Reorder {
                index: root_index,
                ops: ReorderOps {
                    local: state.local,
                    inserts: state.inserts,
                    end_inserts: state.end_inserts,
                    entries: state.entries,
                },
            },
        );
    }
}

/// What happened to a key so far in this invocation.
enum Slot<Msg> {
    /// Inserted (entry id), waiting for a removal to claim it.
    Inserted { entry: usize },
    /// Removed, waiting for an insert to claim it. `local_slot` is the
    /// position of its removal patch, backpatched on a match.
    Removed {
        node: VNode<Msg>,
        index: u32,
        local_slot: usize,
    },
    /// Both sides seen, already a move.
    Matched,
}

struct KeyedDiff<Msg> {
    seen: RapidHashMap<CompactString, Slot<Msg>>,
    local: Vec<Patch<Msg>>,
    inserts: Vec<KeyedInsert>,
    end_inserts: Vec<usize>,
    entries: Vec<ReorderEntry<Msg>>,
}

impl<Msg> KeyedDiff<Msg> {
    fn new() -> Self {
        KeyedDiff {
            seen: RapidHashMap::default(),
            local: Vec::new(),
            inserts: Vec::new(),
            end_inserts: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn push_entry(&mut self, kind: EntryKind, node: &VNode<Msg>) -> usize {
        self.entries.push(ReorderEntry {
            kind,
            node: node.clone(),
        });
        self.entries.len() - 1
    }

    fn push_insert(&mut self, position: Option<usize>, entry: usize) {
        match position {
            Some(position) => self.inserts.push(KeyedInsert { position, entry }),
            None => self.end_inserts.push(entry),
        }
    }

    /// Record that `node` enters the list; `position` is its slot in the
    /// new child list, or `None` to append after all positioned inserts.
    fn insert(&mut self, key: CompactString, node: &VNode<Msg>, position: Option<usize>) {
        match self.seen.remove(&key) {
            None => {
                let entry = self.push_entry(EntryKind::Fresh, node);
                self.push_insert(position, entry);
                self.seen.insert(key, Slot::Inserted { entry });
            }
            // this key was removed earlier: a move
            Some(Slot::Removed {
                node: old_node,
                index,
                local_slot,
            }) => {
                let entry = self.push_entry(EntryKind::Moved, node);
                self.push_insert(position, entry);

                let mut sub = Vec::new();
                diff_help(&old_node, node, &mut sub, index);
                if let Patch::RemoveNode {
                    entry: removal_entry,
                    patches: removal_patches,
                    ..
                } = &mut self.local[local_slot]
                {
                    *removal_entry = Some(entry);
                    *removal_patches = sub;
                }
                self.seen.insert(key, Slot::Matched);
            }
            // already inserted or moved: a duplicate key
            Some(slot) => {
                self.seen.insert(key.clone(), slot);
                debug!("duplicate key {:?} among keyed children", key);
                self.insert(suffixed(&key), node, position);
            }
        }
    }

    /// Record that the old child at `index` leaves the list.
    fn remove(&mut self, key: CompactString, node: &VNode<Msg>, index: u32) {
        match self.seen.remove(&key) {
            None => {
                let local_slot = self.local.len();
                self.local.push(Patch::RemoveNode {
                    index,
                    entry: None,
                    patches: Vec::new(),
                });
                self.seen.insert(
                    key,
                    Slot::Removed {
                        node: node.clone(),
                        index,
                        local_slot,
                    },
                );
            }
            // this key was inserted earlier: a move
            Some(Slot::Inserted { entry }) => {
                self.entries[entry].kind = EntryKind::Moved;
                let new_node = self.entries[entry].node.clone();
                let mut sub = Vec::new();
                diff_help(node, &new_node, &mut sub, index);
                self.local.push(Patch::RemoveNode {
                    index,
                    entry: Some(entry),
                    patches: sub,
                });
                self.seen.insert(key, Slot::Matched);
            }
            // already removed or moved: a duplicate key
            Some(slot) => {
                self.seen.insert(key.clone(), slot);
                debug!("duplicate key {:?} among keyed children", key);
                self.remove(suffixed(&key), node, index);
            }
        }
    }
}

/// Private disambiguation suffix for duplicate keys. NUL cannot appear
/// in caller keys coming from sensible sources, and even a collision
/// only costs an extra recreation.
fn suffixed(key: &str) -> CompactString {
    format_compact!("{key}\u{0}")
}
