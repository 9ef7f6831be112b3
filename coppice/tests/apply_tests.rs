//! Full render → diff → apply cycles over unkeyed trees.

use coppice::diff::Patch;
use coppice::{Fact, LiveDom, VNode, diff, render, update};

fn text(s: &str) -> VNode<()> {
    VNode::text(s)
}

/// Renders `new` from scratch and checks the patched tree serializes the
/// same way.
fn check_convergence(old: VNode<()>, new: VNode<()>) {
    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    let root = update(&mut dom, root, &old, &new).unwrap();

    let mut fresh = LiveDom::new();
    let fresh_root = render(&mut fresh, &new);
    assert_eq!(dom.to_html(root), fresh.to_html(fresh_root));
}

#[test]
fn test_text_update_in_place() {
    let old = VNode::element("p", vec![], vec![text("one")]);
    let new = VNode::element("p", vec![], vec![text("two")]);

    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    let inner = dom.children(root).next().unwrap();

    let root = update(&mut dom, root, &old, &new).unwrap();
    assert_eq!(dom.to_html(root), "<p>two</p>");
    // same text node, mutated in place
    assert_eq!(dom.children(root).next().unwrap(), inner);
}

#[test]
fn test_attribute_update_touches_only_delta() {
    let old = VNode::element(
        "div",
        vec![Fact::attr("id", "box"), Fact::attr("title", "old")],
        vec![],
    );
    let new = VNode::element(
        "div",
        vec![Fact::attr("id", "box"), Fact::attr("lang", "en")],
        vec![],
    );
    let patches = diff(&old, &new);
    assert_eq!(patches.len(), 1);
    assert!(matches!(patches[0], Patch::Facts { index: 0, .. }));
    check_convergence(old, new);
}

#[test]
fn test_styles_applied_and_removed() {
    let old = VNode::element(
        "div",
        vec![Fact::style("color", "red"), Fact::style("margin", "0")],
        vec![],
    );
    let new = VNode::element(
        "div",
        vec![Fact::style("color", "blue")],
        vec![],
    );
    let mut dom: LiveDom<()> = LiveDom::new();
    let root = render(&mut dom, &old);
    assert_eq!(
        dom.to_html(root),
        "<div style=\"color: red; margin: 0\"></div>"
    );
    let root = update(&mut dom, root, &old, &new).unwrap();
    assert_eq!(dom.to_html(root), "<div style=\"color: blue\"></div>");
}

#[test]
fn test_class_accumulation_renders_joined() {
    let tree: VNode<()> = VNode::element(
        "button",
        vec![Fact::attr("class", "btn"), Fact::attr("class", "primary")],
        vec![],
    );
    let mut dom = LiveDom::new();
    let root = render(&mut dom, &tree);
    assert_eq!(dom.to_html(root), "<button class=\"btn primary\"></button>");
}

#[test]
fn test_children_appended_and_removed() {
    let a = VNode::element("ul", vec![], vec![text("1")]);
    let b = VNode::element("ul", vec![], vec![text("1"), text("2"), text("3")]);
    check_convergence(a.clone(), b.clone());
    check_convergence(b, a);
}

#[test]
fn test_deep_change_leaves_siblings_alone() {
    let old = VNode::element(
        "div",
        vec![],
        vec![
            VNode::element("header", vec![], vec![text("title")]),
            VNode::element(
                "main",
                vec![],
                vec![VNode::element("p", vec![], vec![text("body")])],
            ),
        ],
    );
    let new = VNode::element(
        "div",
        vec![],
        vec![
            VNode::element("header", vec![], vec![text("title")]),
            VNode::element(
                "main",
                vec![],
                vec![VNode::element("p", vec![], vec![text("edited")])],
            ),
        ],
    );

    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    let header = dom.children(root).next().unwrap();

    let patches = diff(&old, &new);
    // one text patch, nothing structural
    assert_eq!(patches.len(), 1);

    let root = update(&mut dom, root, &old, &new).unwrap();
    assert_eq!(dom.children(root).next().unwrap(), header);
    assert_eq!(
        dom.to_html(root),
        "<div><header>title</header><main><p>edited</p></main></div>"
    );
}

#[test]
fn test_tag_change_redraws_subtree() {
    let old = VNode::element(
        "div",
        vec![],
        vec![VNode::element("span", vec![], vec![text("x")])],
    );
    let new = VNode::element(
        "div",
        vec![],
        vec![VNode::element("strong", vec![], vec![text("x")])],
    );
    check_convergence(old, new);
}

#[test]
fn test_update_is_idempotent_per_cycle() {
    // applying the same target twice leaves the tree unchanged
    let old = VNode::element("p", vec![Fact::attr("id", "a")], vec![text("x")]);
    let new = VNode::element("p", vec![Fact::attr("id", "b")], vec![text("y")]);

    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    let root = update(&mut dom, root, &old, &new).unwrap();
    let after_first = dom.to_html(root);

    // a second diff from the new tree finds nothing to do
    assert!(diff(&new, &new.clone()).is_empty());
    let root = update(&mut dom, root, &new, &new.clone()).unwrap();
    assert_eq!(dom.to_html(root), after_first);
}

#[test]
fn test_lazy_thunk_not_rerun_when_refs_match() {
    use std::cell::Cell;
    use std::rc::Rc;

    let runs = Rc::new(Cell::new(0u32));
    let make = |runs: Rc<Cell<u32>>, refs: Rc<dyn std::any::Any>| -> VNode<()> {
        VNode::lazy(vec![refs], move || {
            runs.set(runs.get() + 1);
            VNode::element("section", vec![], vec![VNode::text("cached")])
        })
    };

    let key: Rc<dyn std::any::Any> = Rc::new(7u32);
    let old = make(Rc::clone(&runs), Rc::clone(&key));
    let new = make(Rc::clone(&runs), Rc::clone(&key));

    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    assert_eq!(runs.get(), 1);

    let root = update(&mut dom, root, &old, &new).unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(dom.to_html(root), "<section>cached</section>");
}

#[test]
fn test_lazy_changed_refs_patches_subtree() {
    use std::rc::Rc;

    let build = |n: u32| -> VNode<()> {
        VNode::lazy(vec![Rc::new(n) as Rc<dyn std::any::Any>], move || {
            VNode::element("section", vec![], vec![VNode::text(format!("v{n}"))])
        })
    };

    let old = build(1);
    let new = build(2);

    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    let root = update(&mut dom, root, &old, &new).unwrap();
    assert_eq!(dom.to_html(root), "<section>v2</section>");
}

#[test]
fn test_virtualize_then_update_adopts_content() {
    // server-rendered markup stands in for the first virtual render
    let mut dom: LiveDom<()> = LiveDom::new();
    let root = dom.create_element("div", coppice::Namespace::Html);
    dom.set_attribute(root, "id", "app").unwrap();
    let t = dom.create_text("count: 0");
    dom.append(root, t);

    let adopted = dom.virtualize(root);
    let next: VNode<()> = VNode::element(
        "div",
        vec![Fact::attr("id", "app")],
        vec![VNode::text("count: 1")],
    );

    let patches = diff(&adopted, &next);
    // adoption found the existing structure, only the text changes
    assert_eq!(patches.len(), 1);
    assert!(matches!(patches[0], Patch::Text { index: 1, .. }));

    let root = update(&mut dom, root, &adopted, &next).unwrap();
    assert_eq!(dom.to_html(root), "<div id=\"app\">count: 1</div>");
}
