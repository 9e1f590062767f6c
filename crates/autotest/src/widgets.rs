//! Widget event delegation and the per-variant widget test registry.
//!
//! Widgets do not attach listeners to their own elements. A single listener
//! on the document root receives every bubbling event and walks from the
//! event target up to the root. Each element carrying `data-on-<type>` names
//! a method on the widget owning that element (the nearest ancestor with
//! `data-widget`); `data-on-<type>-args` holds its bound arguments as JSON.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::dom::{listener, trigger_click, trigger_mouse_event, Document, Event, NodeId};
use crate::error::{AutotestError, AutotestResult};

/// Attribute marking a widget's root element; its value is the widget id
pub const WIDGET_ATTR: &str = "data-widget";

/// Widget method handler: bound arguments, the event, and the element that
/// declared the handler
pub type Method = Arc<dyn Fn(&[Value], &Event, NodeId) -> anyhow::Result<()> + Send + Sync>;

pub fn method<F>(f: F) -> Method
where
    F: Fn(&[Value], &Event, NodeId) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn handler_attr(event_type: &str) -> String {
    format!("data-on-{}", event_type)
}

pub fn args_attr(event_type: &str) -> String {
    format!("data-on-{}-args", event_type)
}

/// A mounted widget instance
#[derive(Clone)]
pub struct Widget {
    id: String,
    methods: HashMap<String, Method>,
}

impl Widget {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            methods: HashMap::new(),
        }
    }

    pub fn on(mut self, name: &str, f: Method) -> Self {
        self.methods.insert(name.to_string(), f);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn call(&self, name: &str, args: &[Value], event: &Event, el: NodeId) -> AutotestResult<()> {
        let method = self.methods.get(name).ok_or_else(|| {
            AutotestError::Widget(format!("widget {} has no method {}", self.id, name))
        })?;
        method(args, event, el)?;
        Ok(())
    }
}

/// Mounted widgets by id
#[derive(Clone, Default)]
pub struct WidgetInstances {
    by_id: HashMap<String, Arc<Widget>>,
}

impl WidgetInstances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, widget: Widget) -> &mut Self {
        self.by_id.insert(widget.id.clone(), Arc::new(widget));
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<Widget>> {
        self.by_id.get(id).cloned()
    }
}

/// Attach the delegated root listener for each of `event_types`
pub fn delegate_events(doc: &mut Document, widgets: Arc<WidgetInstances>, event_types: &[&str]) {
    let root = doc.root();
    for &event_type in event_types {
        let widgets = widgets.clone();
        doc.add_event_listener(
            root,
            event_type,
            false,
            listener(move |event, doc| {
                route(doc, &widgets, event)?;
                Ok(())
            }),
        );
    }
}

/// Invoke every handler declared between the event target and the root
fn route(doc: &Document, widgets: &WidgetInstances, event: &Event) -> AutotestResult<usize> {
    let handler_attr = handler_attr(&event.event_type);
    let args_attr = args_attr(&event.event_type);
    let mut invoked = 0;

    for el in doc.ancestors(event.target) {
        let Some(name) = doc.attribute(el, &handler_attr) else {
            continue;
        };
        let owner = owning_widget(doc, el).ok_or_else(|| {
            AutotestError::Widget(format!("handler {} on node {} has no owning widget", name, el))
        })?;
        let widget = widgets
            .get(owner)
            .ok_or_else(|| AutotestError::Widget(format!("widget {} is not mounted", owner)))?;
        let args = bound_args(doc.attribute(el, &args_attr))?;

        debug!("{} -> {}.{}({} arg(s))", event.event_type, owner, name, args.len());
        widget.call(name, &args, event, el)?;
        invoked += 1;
    }

    Ok(invoked)
}

fn owning_widget(doc: &Document, el: NodeId) -> Option<&str> {
    doc.ancestors(el)
        .into_iter()
        .find_map(|node| doc.attribute(node, WIDGET_ATTR))
}

/// Parse bound arguments. Absent means none; the value must be a JSON array.
pub fn bound_args(raw: Option<&str>) -> AutotestResult<Vec<Value>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    match serde_json::from_str(raw)? {
        Value::Array(args) => Ok(args),
        other => Err(AutotestError::Widget(format!(
            "bound arguments must be a JSON array, got {}",
            other
        ))),
    }
}

/// Event helpers handed to widget tests
pub struct DomHelpers<'a> {
    doc: &'a Document,
}

impl<'a> DomHelpers<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    /// Element with the given `id` attribute
    pub fn element(&self, id: &str) -> AutotestResult<NodeId> {
        self.doc
            .get_element_by_id(id)
            .ok_or_else(|| AutotestError::Widget(format!("no element with id {}", id)))
    }

    pub fn trigger_mouse_event(&self, el: NodeId, event_type: &str) -> AutotestResult<Event> {
        trigger_mouse_event(self.doc, el, event_type)
    }

    pub fn trigger_click(&self, el: NodeId) -> AutotestResult<Event> {
        trigger_click(self.doc, el)
    }
}

pub type WidgetTest = Arc<dyn Fn(&DomHelpers<'_>) -> anyhow::Result<()> + Send + Sync>;

pub fn widget_test<F>(f: F) -> WidgetTest
where
    F: Fn(&DomHelpers<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Test functions registered per widget variant
#[derive(Clone, Default)]
pub struct WidgetRegistry {
    tests: BTreeMap<String, WidgetTest>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, variant: &str, test: WidgetTest) -> &mut Self {
        self.tests.insert(variant.to_string(), test);
        self
    }

    pub fn variants(&self) -> Vec<&str> {
        self.tests.keys().map(String::as_str).collect()
    }

    /// Run the test registered for `variant`
    pub fn test(&self, variant: &str, helpers: &DomHelpers<'_>) -> AutotestResult<()> {
        let test = self
            .tests
            .get(variant)
            .ok_or_else(|| AutotestError::Widget(format!("no widget test registered for {}", variant)))?;
        test(helpers)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bound_args() {
        assert!(bound_args(None).unwrap().is_empty());
        assert_eq!(bound_args(Some("[1, \"a\"]")).unwrap(), vec![json!(1), json!("a")]);
        assert_eq!(bound_args(Some("[[1, 2]]")).unwrap(), vec![json!([1, 2])]);
        assert!(matches!(bound_args(Some("{\"a\": 1}")), Err(AutotestError::Widget(_))));
        assert!(matches!(bound_args(Some("not json")), Err(AutotestError::Json(_))));
    }

    #[test]
    fn test_unmounted_widget_fails_dispatch() {
        let mut doc = Document::new();
        let widget_el = doc.create_element("div");
        let button = doc.create_element("button");
        doc.append_child(doc.root(), widget_el).unwrap();
        doc.append_child(widget_el, button).unwrap();
        doc.set_attribute(widget_el, WIDGET_ATTR, "w0").unwrap();
        doc.set_attribute(button, &handler_attr("click"), "handleClick").unwrap();

        delegate_events(&mut doc, Arc::new(WidgetInstances::new()), &["click"]);
        let err = trigger_click(&doc, button).unwrap_err();
        assert!(err.to_string().contains("widget w0 is not mounted"));
    }

    #[test]
    fn test_missing_method_fails_dispatch() {
        let mut doc = Document::new();
        let widget_el = doc.create_element("div");
        doc.append_child(doc.root(), widget_el).unwrap();
        doc.set_attribute(widget_el, WIDGET_ATTR, "w0").unwrap();
        doc.set_attribute(widget_el, &handler_attr("click"), "nope").unwrap();

        let mut widgets = WidgetInstances::new();
        widgets.mount(Widget::new("w0"));
        delegate_events(&mut doc, Arc::new(widgets), &["click"]);

        let err = trigger_click(&doc, widget_el).unwrap_err();
        assert!(err.to_string().contains("has no method nope"));
    }

    #[test]
    fn test_registry_unknown_variant() {
        let registry = WidgetRegistry::new();
        let doc = Document::new();
        assert!(registry.test("no-args", &DomHelpers::new(&doc)).is_err());
    }
}
