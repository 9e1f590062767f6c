//! Minimal DOM for event simulation: an element arena, listeners, and
//! capture/target/bubble dispatch of synthetic events.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AutotestError, AutotestResult};

pub type NodeId = usize;

/// Listener callback. Receives the event being dispatched and the document
/// it is dispatched in.
pub type Listener = Arc<dyn Fn(&mut Event, &Document) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&mut Event, &Document) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    None = 0,
    Capturing = 1,
    AtTarget = 2,
    Bubbling = 3,
}

/// Mouse event initialisation. The default is a left-button event that
/// bubbles, can be cancelled, sits at the origin and has no modifiers held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEventInit {
    pub bubbles: bool,
    pub cancelable: bool,
    pub screen_x: i32,
    pub screen_y: i32,
    pub client_x: i32,
    pub client_y: i32,
    pub ctrl_key: bool,
    pub alt_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
    pub button: i16,
}

impl Default for MouseEventInit {
    fn default() -> Self {
        Self {
            bubbles: true,
            cancelable: true,
            screen_x: 0,
            screen_y: 0,
            client_x: 0,
            client_y: 0,
            ctrl_key: false,
            alt_key: false,
            shift_key: false,
            meta_key: false,
            button: 0,
        }
    }
}

/// A synthetic event and its dispatch state
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub target: NodeId,
    pub current_target: NodeId,
    pub phase: EventPhase,
    pub bubbles: bool,
    pub cancelable: bool,
    pub mouse: Option<MouseEventInit>,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
}

impl Event {
    pub fn new(event_type: &str, bubbles: bool, cancelable: bool) -> Self {
        Self {
            event_type: event_type.to_string(),
            target: 0,
            current_target: 0,
            phase: EventPhase::None,
            bubbles,
            cancelable,
            mouse: None,
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
        }
    }

    pub fn mouse(event_type: &str, init: MouseEventInit) -> Self {
        let mut event = Self::new(event_type, init.bubbles, init.cancelable);
        event.mouse = Some(init);
        event
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }

    /// Has no effect on events that are not cancelable
    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attributes: HashMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Clone)]
struct Registered {
    capture: bool,
    listener: Listener,
}

#[derive(Clone, Default)]
struct ListenerStore {
    map: HashMap<NodeId, HashMap<String, Vec<Registered>>>,
}

impl ListenerStore {
    fn add(&mut self, node: NodeId, event_type: &str, registered: Registered) {
        self.map
            .entry(node)
            .or_default()
            .entry(event_type.to_string())
            .or_default()
            .push(registered);
    }

    fn get(&self, node: NodeId, event_type: &str, capture: bool) -> Vec<Listener> {
        self.map
            .get(&node)
            .and_then(|events| events.get(event_type))
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|l| l.capture == capture)
                    .map(|l| l.listener.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Element arena rooted at a `#document` node
#[derive(Clone)]
pub struct Document {
    nodes: Vec<Element>,
    listeners: ListenerStore,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Element {
                tag: "#document".to_string(),
                attributes: HashMap::new(),
                parent: None,
                children: Vec::new(),
            }],
            listeners: ListenerStore::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Element {
            tag: tag.to_string(),
            attributes: HashMap::new(),
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> AutotestResult<()> {
        self.element(parent)?;
        self.element(child)?;
        if child == self.root() || self.is_ancestor(child, parent) {
            return Err(AutotestError::Widget(format!(
                "cannot append node {} under node {}",
                child, parent
            )));
        }
        if let Some(old) = self.nodes[child].parent.take() {
            self.nodes[old].children.retain(|&c| c != child);
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        Ok(())
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> AutotestResult<()> {
        self.element_mut(node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(node)?.attributes.get(name).map(String::as_str)
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|e| e.tag.as_str())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|e| e.attributes.get("id").map(String::as_str) == Some(id))
    }

    /// `node` followed by each of its ancestors up to the root
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = self.nodes.get(node).map(|_| node);
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.nodes[current].parent;
        }
        path
    }

    pub fn add_event_listener(&mut self, node: NodeId, event_type: &str, capture: bool, listener: Listener) {
        self.listeners.add(node, event_type, Registered { capture, listener });
    }

    /// Dispatch `event` at `target`: capture listeners from the root down,
    /// target listeners, then bubble listeners back up when the event bubbles.
    pub fn dispatch_event(&self, target: NodeId, mut event: Event) -> AutotestResult<Event> {
        self.element(target)?;
        event.target = target;

        let mut path = self.ancestors(target);
        path.reverse();
        let ancestors = &path[..path.len() - 1];
        debug!("Dispatching {} at node {} (depth {})", event.event_type, target, ancestors.len());

        for &node in ancestors {
            event.phase = EventPhase::Capturing;
            event.current_target = node;
            if self.invoke(node, &mut event, true)? {
                return Ok(finish(event));
            }
        }

        event.phase = EventPhase::AtTarget;
        event.current_target = target;
        if self.invoke(target, &mut event, true)? || self.invoke(target, &mut event, false)? {
            return Ok(finish(event));
        }

        if event.bubbles {
            for &node in ancestors.iter().rev() {
                event.phase = EventPhase::Bubbling;
                event.current_target = node;
                if self.invoke(node, &mut event, false)? {
                    break;
                }
            }
        }

        Ok(finish(event))
    }

    /// Run the listeners of one node; returns whether propagation stopped
    fn invoke(&self, node: NodeId, event: &mut Event, capture: bool) -> AutotestResult<bool> {
        for listener in self.listeners.get(node, &event.event_type, capture) {
            listener(&mut *event, self)?;
            if event.immediate_propagation_stopped {
                break;
            }
        }
        Ok(event.propagation_stopped)
    }

    fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        self.ancestors(node).contains(&candidate)
    }

    fn element(&self, node: NodeId) -> AutotestResult<&Element> {
        self.nodes
            .get(node)
            .ok_or_else(|| AutotestError::Widget(format!("no such node: {}", node)))
    }

    fn element_mut(&mut self, node: NodeId) -> AutotestResult<&mut Element> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| AutotestError::Widget(format!("no such node: {}", node)))
    }
}

fn finish(mut event: Event) -> Event {
    event.phase = EventPhase::None;
    event.current_target = event.target;
    event
}

/// Create a mouse event with default initialisation and dispatch it at `el`
pub fn trigger_mouse_event(doc: &Document, el: NodeId, event_type: &str) -> AutotestResult<Event> {
    doc.dispatch_event(el, Event::mouse(event_type, MouseEventInit::default()))
}

pub fn trigger_click(doc: &Document, el: NodeId) -> AutotestResult<Event> {
    trigger_mouse_event(doc, el, "click")
}
