//! Synthetic clicks bubble from inner elements to the widget handler that
//! declared them, with the handler's bound arguments.

use anyhow::ensure;
use autotest::widgets::{
    args_attr, delegate_events, handler_attr, method, widget_test, DomHelpers, Widget,
    WidgetInstances, WidgetRegistry, WIDGET_ATTR,
};
use autotest::{trigger_mouse_event, Document, EventPhase};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use test_case::test_case;

/// Widget variants and the JSON bound to their click handler
const VARIANTS: [(&str, Option<&str>); 4] = [
    ("no-args", None),
    ("one-arg", Some(r#"["foo"]"#)),
    ("one-arg-array", Some(r#"[["foo", "bar"]]"#)),
    ("two-args", Some(r#"["foo", "bar"]"#)),
];

type Calls = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

struct Page {
    doc: Document,
    registry: WidgetRegistry,
    calls: Calls,
}

/// body > div[data-widget] > button[data-on-click] > span, one per variant
fn page() -> Page {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let mut doc = Document::new();
    let mut widgets = WidgetInstances::new();
    let mut registry = WidgetRegistry::new();

    let body = doc.create_element("body");
    doc.append_child(doc.root(), body).unwrap();

    for (variant, args) in VARIANTS {
        let widget_el = doc.create_element("div");
        doc.set_attribute(widget_el, WIDGET_ATTR, variant).unwrap();
        doc.set_attribute(widget_el, "id", variant).unwrap();

        let button = doc.create_element("button");
        doc.set_attribute(button, &handler_attr("click"), "handleClick").unwrap();
        if let Some(args) = args {
            doc.set_attribute(button, &args_attr("click"), args).unwrap();
        }

        let label = doc.create_element("span");
        doc.set_attribute(label, "id", &format!("{}-label", variant)).unwrap();

        doc.append_child(body, widget_el).unwrap();
        doc.append_child(widget_el, button).unwrap();
        doc.append_child(button, label).unwrap();

        let recorded = calls.clone();
        let name = variant.to_string();
        widgets.mount(Widget::new(variant).on(
            "handleClick",
            method(move |args, event, el| {
                ensure!(event.bubbles && event.cancelable, "click must bubble and be cancelable");
                ensure!(event.phase == EventPhase::Bubbling, "handled during {:?}", event.phase);
                ensure!(el == button, "handler ran for node {} instead of the button", el);
                recorded.lock().push((name.clone(), args.to_vec()));
                Ok(())
            }),
        ));

        let label_id = format!("{}-label", variant);
        registry.register(
            variant,
            widget_test(move |helpers: &DomHelpers<'_>| {
                let label = helpers.element(&label_id)?;
                helpers.trigger_click(label)?;
                Ok(())
            }),
        );
    }

    delegate_events(&mut doc, Arc::new(widgets), &["click"]);
    Page { doc, registry, calls }
}

fn expected_args(variant: &str) -> Value {
    match variant {
        "no-args" => json!([]),
        "one-arg" => json!(["foo"]),
        "one-arg-array" => json!([["foo", "bar"]]),
        "two-args" => json!(["foo", "bar"]),
        other => panic!("unknown variant {other}"),
    }
}

#[test_case("no-args" ; "should allow no args")]
#[test_case("one-arg" ; "should allow one arg")]
#[test_case("one-arg-array" ; "should allow one arg as array")]
#[test_case("two-args" ; "should allow two args")]
fn widget_click_bubbles_to_handler(variant: &str) {
    let page = page();
    page.registry.test(variant, &DomHelpers::new(&page.doc)).unwrap();

    let calls = page.calls.lock();
    assert_eq!(calls.len(), 1, "exactly one handler call for {}", variant);
    assert_eq!(calls[0].0, variant);
    assert_eq!(Value::Array(calls[0].1.clone()), expected_args(variant));
}

#[test]
fn registry_holds_every_variant() {
    let page = page();
    assert_eq!(
        page.registry.variants(),
        vec!["no-args", "one-arg", "one-arg-array", "two-args"]
    );
}

#[test]
fn undelegated_event_types_reach_no_handler() {
    let page = page();
    let label = page.doc.get_element_by_id("two-args-label").unwrap();

    let event = trigger_mouse_event(&page.doc, label, "mouseover").unwrap();
    assert_eq!(event.target, label);
    assert!(!event.default_prevented());
    assert!(page.calls.lock().is_empty());
}
