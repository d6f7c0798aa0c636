//! Integration Tests for Components and the Renderer
//!
//! These tests mount components into a detached host element and check the
//! DOM they produce as state changes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use snowdrift_core::component::{register_factory, register_template, Status};
use snowdrift_core::dom::Node;
use snowdrift_core::template::{component, each, element, interp, text, Expr};
use snowdrift_core::{flush, Component, Error, Ref, Scalar};

fn mount(component: &Component) -> Node {
    let body = Node::element("body");
    component.append_to(&body);
    flush().unwrap();
    body
}

fn row_nodes(component: &Component, name: &str) -> Vec<Node> {
    component
        .get_ref(name)
        .map(|r| r.all().iter().filter_map(|r| r.node().cloned()).collect())
        .unwrap_or_default()
}

fn keyed_list() -> Component {
    Component::from_value(
        element("ul").child(
            each("list", "item")
                .key("item.id")
                .child(element("li").ref_name("row").child(interp("item.name"))),
        ),
        json!({
            "list": [
                { "id": 1, "name": "a" },
                { "id": 2, "name": "b" },
                { "id": 3, "name": "c" },
            ]
        }),
    )
}

/// Test that a component over a scalar store re-renders after a write.
#[tokio::test]
async fn counter_follows_its_scalar_state() {
    let state = Scalar::new(json!({ "count": 0 }));
    let counter = Component::new(element("p").child(interp("count")), state.clone());
    let body = mount(&counter);
    assert_eq!(body.inner_html(), "<p>0</p>");
    assert_eq!(counter.status(), Status::Rendered);

    state.set(json!({ "count": 1 })).unwrap();
    snowdrift_core::tick().await.unwrap();

    assert_eq!(body.inner_html(), "<p>1</p>");
    assert_eq!(counter.rendered_version(), Some(1));
}

/// Test that placement waits for the first render.
#[test]
fn placement_before_first_render_is_deferred() {
    let body = Node::element("body");
    let greeting = Component::from_value(element("h1").child(text("hi")), json!({}));
    greeting.append_to(&body);
    assert_eq!(body.inner_html(), "");

    flush().unwrap();
    assert_eq!(body.inner_html(), "<h1>hi</h1>");

    greeting.remove();
    assert_eq!(body.inner_html(), "");
    assert_eq!(greeting.html(), "<h1>hi</h1>");
}

/// Test that a keyed reorder moves the existing nodes instead of
/// rebuilding them, and that the loop ref follows document order.
#[test]
fn keyed_reorder_keeps_dom_identity() {
    let list = keyed_list();
    let body = mount(&list);
    let before = row_nodes(&list, "row");
    assert_eq!(before.len(), 3);

    list.set(json!({
        "list": [
            { "id": 3, "name": "c" },
            { "id": 1, "name": "a" },
            { "id": 2, "name": "b" },
        ]
    }))
    .unwrap();
    flush().unwrap();

    let after = row_nodes(&list, "row");
    assert_eq!(after, vec![before[2].clone(), before[0].clone(), before[1].clone()]);
    assert_eq!(
        body.inner_html(),
        "<ul><li>c</li><li>a</li><li>b</li><!----></ul>"
    );
    // Unchanged text is not rewritten
    assert!(after.iter().all(|li| li.children()[0].write_count() == 0));
}

/// Test that appending to a collection keeps the nodes of existing items.
#[test]
fn collection_add_keeps_existing_nodes() {
    let list = Component::from_value(
        element("ul").child(each("list", "item").child(element("li").ref_name("row").child(interp("item")))),
        json!({ "list": ["a", "b"] }),
    );
    let body = mount(&list);
    let before = row_nodes(&list, "row");

    let items = list.state().as_record().and_then(|r| r.collection("list")).unwrap();
    items.add(json!("c")).unwrap();
    flush().unwrap();

    let after = row_nodes(&list, "row");
    assert_eq!(after.len(), 3);
    assert_eq!(&after[..2], &before[..]);
    assert_eq!(body.inner_html(), "<ul><li>a</li><li>b</li><li>c</li><!----></ul>");
}

/// Test that index-dependent text is re-evaluated when items move.
#[test]
fn index_follows_reorder() {
    let list = Component::from_value(
        element("ol").child(
            each("list", "item")
                .index("i")
                .child(element("li").child(interp("i")).child(text("-")).child(interp("item"))),
        ),
        json!({ "list": ["a", "b", "c"] }),
    );
    let body = mount(&list);
    assert_eq!(body.inner_html(), "<ol><li>0-a</li><li>1-b</li><li>2-c</li><!----></ol>");

    let items = list.state().as_record().and_then(|r| r.collection("list")).unwrap();
    let ids: Vec<_> = items.items().iter().map(|item| item.id()).collect();
    items.reorder(&[ids[2], ids[0], ids[1]]).unwrap();
    flush().unwrap();

    assert_eq!(body.inner_html(), "<ol><li>0-c</li><li>1-a</li><li>2-b</li><!----></ol>");
}

/// Test that writing one item re-renders that item without re-running the
/// component's render.
#[test]
fn item_writes_rerender_one_item() {
    let list = Component::from_value(
        element("ul").child(each("list", "item").child(element("li").child(interp("item.name")))),
        json!({ "list": [{ "name": "a" }, { "name": "b" }] }),
    );
    let body = mount(&list);
    let renders = list.reaction().run_count();

    let items = list.state().as_record().and_then(|r| r.collection("list")).unwrap();
    let second = items.items()[1].id();
    items.update(second, json!({ "name": "z" })).unwrap();
    flush().unwrap();

    assert_eq!(body.inner_html(), "<ul><li>a</li><li>z</li><!----></ul>");
    assert_eq!(list.reaction().run_count(), renders);
}

/// Test that delegated listeners do not pile up across re-renders.
#[test]
fn delegation_listener_count_is_stable() {
    let list = Component::from_value(
        element("ul").child(
            each("list", "item")
                .key("item.id")
                .child(element("li").on("click", |_| Ok(())).child(interp("item.id"))),
        ),
        json!({ "list": [{ "id": 1 }, { "id": 2 }] }),
    );
    mount(&list);
    let ul = list.root_nodes()[0].clone();
    assert_eq!(ul.listener_count("click"), 1);
    assert_eq!(list.bound_handler_count(), 2);

    for n in 3..8 {
        let rows: Vec<Value> = (1..=n).map(|id| json!({ "id": id })).collect();
        list.set(json!({ "list": rows })).unwrap();
        flush().unwrap();
    }

    assert_eq!(ul.listener_count("click"), 1);
    assert_eq!(list.listener_count(), 1);
    assert_eq!(list.bound_handler_count(), 7);

    list.set(json!({ "list": [] })).unwrap();
    flush().unwrap();
    assert_eq!(list.bound_handler_count(), 0);
}

/// Test that a delegated handler sees its loop scope and can write state.
#[test]
fn handlers_fire_through_delegation() {
    let picker = Component::from_value(
        element("div")
            .child(element("p").ref_name("picked").child(interp("picked")))
            .child(
                element("ul").child(
                    each("list", "item").key("item.id").child(
                        element("li")
                            .ref_name("row")
                            .on("click", |cx| {
                                let id = cx.value("item.id")?;
                                cx.set(json!({ "picked": id }))
                            })
                            .child(interp("item.id")),
                    ),
                ),
            ),
        json!({ "picked": null, "list": [{ "id": 1 }, { "id": 2 }] }),
    );
    mount(&picker);
    let rows = row_nodes(&picker, "row");

    rows[1].dispatch("click");
    flush().unwrap();

    assert_eq!(picker.state().to_value()["picked"], json!(2));
    let picked = picker.get_ref("picked").and_then(|r| r.node().cloned()).unwrap();
    assert_eq!(picked.text_content(), "2");
}

/// Test that a root-level loop shares one listener on its parent instead of
/// one per item.
#[test]
fn root_level_loop_listens_on_its_parent() {
    let clicks = Arc::new(AtomicUsize::new(0));
    let counted = clicks.clone();
    let list = Component::from_value(
        each("list", "item").key("item.id").child(
            element("li")
                .ref_name("row")
                .on("click", move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .child(interp("item.id")),
        ),
        json!({ "list": [{ "id": 1 }, { "id": 2 }] }),
    );
    let body = Node::element("body");
    let rule = Node::element("hr");
    body.append_child(&rule);
    list.before(&rule);
    flush().unwrap();

    assert_eq!(list.listener_count(), 1);
    assert_eq!(body.listener_count("click"), 1);

    for n in 3..8 {
        let rows: Vec<Value> = (1..=n).map(|id| json!({ "id": id })).collect();
        list.set(json!({ "list": rows })).unwrap();
        flush().unwrap();
    }

    let rows = row_nodes(&list, "row");
    assert_eq!(rows.len(), 7);
    assert!(rows.iter().all(|row| row.listener_count("click") == 0));
    assert_eq!(list.listener_count(), 1);
    assert_eq!(body.listener_count("click"), 1);

    rows[6].dispatch("click");
    rule.dispatch("click");
    assert_eq!(clicks.load(Ordering::SeqCst), 1);

    // The listener follows the nodes out of the document
    list.remove();
    assert_eq!(body.listener_count("click"), 0);
    assert_eq!(list.listener_count(), 1);
}

/// Test that stopping propagation skips outer handlers.
#[test]
fn stop_propagation_stops_the_walk() {
    let hits = Arc::new(AtomicUsize::new(0));
    let outer_hits = hits.clone();
    let nested = Component::from_value(
        element("div")
            .on("click", move |_| {
                outer_hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .child(
                element("button")
                    .ref_name("button")
                    .on("click", |cx| {
                        cx.event().stop_propagation();
                        Ok(())
                    }),
            ),
        json!({}),
    );
    mount(&nested);

    let button = nested.get_ref("button").and_then(|r| r.node().cloned()).unwrap();
    let event = button.dispatch("click");
    assert!(event.propagation_stopped());
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    nested.root_nodes()[0].dispatch("click");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Test that attribute bindings follow state and drop on null or false.
#[test]
fn attribute_bindings_follow_state() {
    let link = Component::from_value(
        element("a").bind("href", "url").bind("hidden", "hidden"),
        json!({ "url": "/a", "hidden": false }),
    );
    let body = mount(&link);
    assert_eq!(body.inner_html(), "<a href=\"/a\"></a>");

    link.set(json!({ "url": null, "hidden": true })).unwrap();
    flush().unwrap();
    assert_eq!(body.inner_html(), "<a hidden=\"\"></a>");
}

/// Test that duplicate loop keys fail the render instead of corrupting it.
#[test]
fn duplicate_keys_fail_the_render() {
    let list = keyed_list();
    mount(&list);

    list.set(json!({ "list": [{ "id": 1, "name": "a" }, { "id": 1, "name": "b" }] }))
        .unwrap();
    let err = flush().unwrap_err();

    assert!(matches!(err.failures[0].error, Error::DuplicateKey { .. }));
    assert!(matches!(list.status(), Status::Failed(_)));
    // The previous DOM is left untouched
    assert_eq!(row_nodes(&list, "row").len(), 3);
}

/// Test that expression failures surface through the flush.
#[test]
fn computed_expression_errors_are_reported() {
    let broken = Component::from_value(
        element("p").child(interp(Expr::compute(|_| Err(Error::Evaluation("no value".into()))))),
        json!({}),
    );

    let err = flush().unwrap_err();
    assert_eq!(err.failures[0].reaction, broken.reaction().id());
    assert_eq!(broken.status(), Status::Failed("evaluation failed: no value".into()));
    assert!(broken.root_nodes().is_empty());
}

/// Test that destroying a parent destroys every child component once.
#[test]
fn destroy_cascades_to_children() {
    register_template("rendering-test-badge", element("span").child(interp("label"))).unwrap();
    let parent = Component::from_value(
        element("div")
            .child(component("rendering-test-badge").prop("label", json!("first")).ref_name("first"))
            .child(component("rendering-test-badge").prop("label", "second")),
        json!({ "second": "two" }),
    );
    let body = mount(&parent);
    assert_eq!(
        body.inner_html(),
        "<div><span>first</span><!----><span>two</span><!----></div>"
    );

    let children = parent.children();
    assert_eq!(children.len(), 2);
    assert!(matches!(parent.get_ref("first"), Some(Ref::Component(c)) if c == children[0]));

    let destroyed = Arc::new(AtomicUsize::new(0));
    for child in &children {
        let destroyed = destroyed.clone();
        child.on_destroy(move |_| {
            destroyed.fetch_add(1, Ordering::SeqCst);
        });
    }

    parent.destroy();
    parent.destroy();
    flush().unwrap();

    assert!(parent.is_destroyed());
    assert!(children.iter().all(Component::is_destroyed));
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    assert!(parent.children().is_empty());
    assert_eq!(body.inner_html(), "");
}

/// Test that changed props reach the child component's state.
#[test]
fn props_flow_into_children() {
    register_template("rendering-test-label", element("b").child(interp("text"))).unwrap();
    let parent = Component::from_value(
        element("div").child(component("rendering-test-label").prop("text", "title")),
        json!({ "title": "one" }),
    );
    let body = mount(&parent);
    assert_eq!(body.inner_html(), "<div><b>one</b><!----></div>");

    parent.set(json!({ "title": "two" })).unwrap();
    flush().unwrap();
    assert_eq!(body.inner_html(), "<div><b>two</b><!----></div>");
}

/// Test that an unregistered placeholder tag fails the render.
#[test]
fn unregistered_placeholder_fails() {
    let parent = Component::from_value(element("div").child(component("rendering-test-nobody")), json!({}));
    let err = flush().unwrap_err();
    assert!(matches!(
        &err.failures[0].error,
        Error::UnregisteredTag(tag) if tag == "rendering-test-nobody"
    ));
    assert!(matches!(parent.status(), Status::Failed(_)));
}

/// Test that swapping one keyed item for a new key replaces only that node.
#[test]
fn key_swap_replaces_one_node() {
    let list = keyed_list();
    let body = mount(&list);
    let before = row_nodes(&list, "row");

    list.set(json!({
        "list": [
            { "id": 1, "name": "a" },
            { "id": 4, "name": "d" },
            { "id": 3, "name": "c" },
        ]
    }))
    .unwrap();
    flush().unwrap();

    let after = row_nodes(&list, "row");
    assert_eq!(after.len(), 3);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert_ne!(after[1], before[1]);
    assert!(before[1].parent().is_none());
    assert_eq!(body.inner_html(), "<ul><li>a</li><li>d</li><li>c</li><!----></ul>");
}

/// Test that a child re-render which destroys its parent tears both down.
#[test]
fn child_render_can_destroy_its_parent() {
    let doomed: Arc<Mutex<Option<Component>>> = Arc::new(Mutex::new(None));
    let spawned: Arc<Mutex<Option<Component>>> = Arc::new(Mutex::new(None));

    let (target, sink) = (doomed.clone(), spawned.clone());
    register_factory("rendering-test-saboteur", move |props| {
        let target = target.clone();
        let child = Component::from_value(
            element("i").child(interp(Expr::compute(move |scope| {
                let boom = scope.lookup("boom").into_value();
                if boom == json!(true) {
                    let parent = target.lock().take();
                    if let Some(parent) = parent {
                        parent.destroy();
                    }
                }
                Ok(boom)
            }))),
            props,
        );
        *sink.lock() = Some(child.clone());
        Ok(child)
    })
    .unwrap();

    let parent = Component::from_value(
        element("div").child(component("rendering-test-saboteur").prop("boom", json!(false))),
        json!({}),
    );
    *doomed.lock() = Some(parent.clone());
    let body = mount(&parent);
    assert_eq!(body.inner_html(), "<div><i>false</i><!----></div>");

    let child = spawned.lock().clone().unwrap();
    child.set(json!({ "boom": true })).unwrap();
    flush().unwrap();

    assert!(parent.is_destroyed());
    assert!(child.is_destroyed());
    assert!(parent.children().is_empty());
    assert!(child.root_nodes().is_empty());
    assert_eq!(body.inner_html(), "");
}

/// Test that a parent destroyed by a child during its own first render is
/// torn down once the batch ends.
#[test]
fn destroy_during_first_render_is_deferred() {
    let doomed: Arc<Mutex<Option<Component>>> = Arc::new(Mutex::new(None));
    let spawned: Arc<Mutex<Option<Component>>> = Arc::new(Mutex::new(None));

    let (target, sink) = (doomed.clone(), spawned.clone());
    register_factory("rendering-test-mutineer", move |props| {
        let target = target.clone();
        let child = Component::from_value(
            element("i").child(interp(Expr::compute(move |_| {
                let parent = target.lock().take();
                if let Some(parent) = parent {
                    parent.destroy();
                }
                Ok(json!("gone"))
            }))),
            props,
        );
        *sink.lock() = Some(child.clone());
        Ok(child)
    })
    .unwrap();

    let parent = Component::from_value(element("div").child(component("rendering-test-mutineer")), json!({}));
    *doomed.lock() = Some(parent.clone());
    let body = mount(&parent);

    let child = spawned.lock().clone().unwrap();
    assert!(parent.is_destroyed());
    assert!(child.is_destroyed());
    assert!(parent.root_nodes().is_empty());
    assert_eq!(body.inner_html(), "");
}
