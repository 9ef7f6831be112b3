//! Retained-tree UI reconciliation.
//!
//! coppice provides:
//! - **Virtual trees**: Immutable, structurally shared node descriptions
//!   with keyed children, message mapping, memoized subtrees, and custom
//!   widgets
//! - **Diffing**: Two trees in, a compact index-addressed patch list out,
//!   with reference-equality short-circuits and move detection for keyed
//!   lists
//! - **Patching**: A guided traversal binds patch indices to live nodes,
//!   then applies the minimal set of mutations
//! - **Live tree**: An arena-backed retained tree with event dispatch
//!   through mapper chains, plus a virtualizer to re-adopt existing
//!   content
//!
//! # Example
//!
//! ```rust
//! use coppice::{Fact, LiveDom, VNode, render, update};
//!
//! let old: VNode<()> = VNode::element(
//!     "div",
//!     vec![Fact::attr("class", "counter")],
//!     vec![VNode::text("count: 0")],
//! );
//! let new: VNode<()> = VNode::element(
//!     "div",
//!     vec![Fact::attr("class", "counter")],
//!     vec![VNode::text("count: 1")],
//! );
//!
//! let mut dom = LiveDom::new();
//! let root = render(&mut dom, &old);
//! assert_eq!(dom.to_html(root), "<div class=\"counter\">count: 0</div>");
//!
//! // only the text node is touched
//! let root = update(&mut dom, root, &old, &new)?;
//! assert_eq!(dom.to_html(root), "<div class=\"counter\">count: 1</div>");
//! # Ok::<(), coppice::ApplyError>(())
//! ```

mod tracing_macros;

pub(crate) use tracing_macros::{debug, trace};

pub mod diff;
pub mod dom;
pub mod facts;
pub mod vnode;

// Re-export indextree so callers name live nodes without a direct dep
pub use indextree;

// Re-export the working surface at the crate root
pub use diff::{ApplyError, Patch, apply_patches, diff, render, update};
pub use dom::{DomError, LiveDom};
pub use facts::{Fact, Facts, Handler, HandlerKind, PropValue};
pub use vnode::{Namespace, VNode};
