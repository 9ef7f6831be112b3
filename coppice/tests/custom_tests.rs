//! Custom widgets: opaque subtrees with caller-supplied render and diff.

use std::any::Any;
use std::rc::Rc;

use coppice::indextree::NodeId;
use coppice::vnode::{CustomDiff, CustomPatch, CustomRender};
use coppice::{Fact, LiveDom, Namespace, VNode, render, update};

fn gauge_render() -> CustomRender<()> {
    Rc::new(|model: &dyn Any, dom: &mut LiveDom<()>| {
        let value = model.downcast_ref::<u32>().copied().unwrap_or(0);
        let node = dom.create_element("meter", Namespace::Html);
        dom.set_attribute(node, "value", format!("{value}")).unwrap();
        node
    })
}

fn gauge_diff() -> CustomDiff<()> {
    Rc::new(|old: &dyn Any, new: &dyn Any| {
        let old_value = old.downcast_ref::<u32>().copied()?;
        let new_value = new.downcast_ref::<u32>().copied()?;
        if old_value == new_value {
            return None;
        }
        let patch: CustomPatch<()> = Rc::new(move |dom: &mut LiveDom<()>, node: NodeId| {
            dom.set_attribute(node, "value", format!("{new_value}")).unwrap();
        });
        Some(patch)
    })
}

#[test]
fn test_custom_widget_patches_in_place() {
    let render_fn = gauge_render();
    let diff_fn = gauge_diff();
    let old = VNode::custom(
        vec![Fact::attr("class", "gauge")],
        Rc::new(3u32),
        render_fn.clone(),
        diff_fn.clone(),
    );
    let new = VNode::custom(
        vec![Fact::attr("class", "gauge")],
        Rc::new(7u32),
        render_fn,
        diff_fn,
    );

    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    assert_eq!(
        dom.to_html(root),
        "<meter class=\"gauge\" value=\"3\"></meter>"
    );

    let after = update(&mut dom, root, &old, &new).unwrap();
    // the widget updated its own node, nothing was rebuilt
    assert_eq!(after, root);
    assert_eq!(
        dom.to_html(root),
        "<meter class=\"gauge\" value=\"7\"></meter>"
    );
}

#[test]
fn test_equal_models_emit_nothing() {
    let render_fn = gauge_render();
    let diff_fn = gauge_diff();
    let old = VNode::custom(vec![], Rc::new(5u32), render_fn.clone(), diff_fn.clone());
    let new = VNode::custom(vec![], Rc::new(5u32), render_fn, diff_fn);
    assert!(coppice::diff(&old, &new).is_empty());
}

#[test]
fn test_different_widget_redraws() {
    // distinct render/diff functions mean a different widget entirely
    let old = VNode::custom(vec![], Rc::new(3u32), gauge_render(), gauge_diff());
    let new = VNode::custom(vec![], Rc::new(3u32), gauge_render(), gauge_diff());

    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    let after = update(&mut dom, root, &old, &new).unwrap();
    assert_ne!(after, root);
    assert_eq!(dom.to_html(after), "<meter value=\"3\"></meter>");
}

#[test]
fn test_facts_on_widget_root_are_diffed() {
    let render_fn = gauge_render();
    let diff_fn = gauge_diff();
    let old = VNode::custom(
        vec![Fact::attr("class", "gauge")],
        Rc::new(1u32),
        render_fn.clone(),
        diff_fn.clone(),
    );
    let new = VNode::custom(
        vec![Fact::attr("class", "gauge wide")],
        Rc::new(1u32),
        render_fn,
        diff_fn,
    );

    let mut dom = LiveDom::new();
    let root = render(&mut dom, &old);
    let root = update(&mut dom, root, &old, &new).unwrap();
    assert_eq!(
        dom.to_html(root),
        "<meter class=\"gauge wide\" value=\"1\"></meter>"
    );
}
