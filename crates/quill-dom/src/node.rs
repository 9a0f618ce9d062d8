//! Live node tree.
//!
//! Nodes are reference counted handles. Parents own their children; a child
//! keeps a weak link back to its parent, so detaching a subtree is enough to
//! drop it once no handle refers to it anymore.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Callback bound to a node for one event type.
///
/// Uses `Rc` for `Clone` support and compares by identity, which is what the
/// builder needs to decide whether a listener attribute changed.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&DomEvent)>);

impl Listener {
    /// Create a new listener from a function.
    pub fn new<F: Fn(&DomEvent) + 'static>(f: F) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the listener.
    pub fn call(&self, event: &DomEvent) {
        (self.0)(event)
    }

    /// Whether both handles point at the same callback.
    pub fn ptr_eq(&self, other: &Listener) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Listener(...)")
    }
}

/// Value stored under an element attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Bool(bool),
    Listener(Listener),
}

impl AttrValue {
    /// Markup form of the value; `None` when the attribute is not serialized.
    pub fn serialize(&self) -> Option<String> {
        match self {
            AttrValue::Str(s) => Some(s.clone()),
            AttrValue::Bool(true) => Some(String::new()),
            AttrValue::Bool(false) | AttrValue::Listener(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<Listener> for AttrValue {
    fn from(value: Listener) -> Self {
        AttrValue::Listener(value)
    }
}

/// An event travelling from a target node up through its ancestors.
pub struct DomEvent {
    kind: String,
    target: Node,
    current: RefCell<Node>,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl DomEvent {
    fn new(kind: &str, target: &Node) -> Self {
        Self {
            kind: kind.to_string(),
            target: target.clone(),
            current: RefCell::new(target.clone()),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }
    }

    /// The event type, e.g. `click`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The node the event was dispatched on.
    pub fn target(&self) -> &Node {
        &self.target
    }

    /// The node whose listener is currently running.
    pub fn current_target(&self) -> Node {
        self.current.borrow().clone()
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    /// Stop the event from reaching further ancestors.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element(String),
    Text,
    Fragment,
}

struct NodeData {
    kind: NodeKind,
    key: RefCell<Option<String>>,
    managed: Cell<bool>,
    text: RefCell<String>,
    attributes: RefCell<BTreeMap<String, AttrValue>>,
    listeners: RefCell<BTreeMap<String, Listener>>,
    children: RefCell<Vec<Node>>,
    parent: RefCell<Weak<NodeData>>,
}

/// A handle to a node in the tree.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    fn with_kind(kind: NodeKind) -> Self {
        Self(Rc::new(NodeData {
            kind,
            key: RefCell::new(None),
            managed: Cell::new(false),
            text: RefCell::new(String::new()),
            attributes: RefCell::new(BTreeMap::new()),
            listeners: RefCell::new(BTreeMap::new()),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
        }))
    }

    /// Create a detached element node.
    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeKind::Element(tag.to_string()))
    }

    /// Create a detached text node.
    pub fn text(content: &str) -> Self {
        let node = Self::with_kind(NodeKind::Text);
        node.set_text(content);
        node
    }

    /// Create a parentless container, used as a temporary host while patching.
    pub fn fragment() -> Self {
        Self::with_kind(NodeKind::Fragment)
    }

    /// Tag name for elements, `None` for text and fragments.
    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element(_))
    }

    pub fn is_text(&self) -> bool {
        self.0.kind == NodeKind::Text
    }

    pub fn key(&self) -> Option<String> {
        self.0.key.borrow().clone()
    }

    pub fn set_key(&self, key: Option<&str>) {
        *self.0.key.borrow_mut() = key.map(str::to_string);
    }

    /// Whether the node was placed with [`TreeBuilder::adopt`].
    ///
    /// Managed nodes belong to whoever produced them; the builder never
    /// reuses one to satisfy an unrelated `open_element` or `text` call.
    ///
    /// [`TreeBuilder::adopt`]: crate::TreeBuilder::adopt
    pub fn is_managed(&self) -> bool {
        self.0.managed.get()
    }

    pub fn set_managed(&self, managed: bool) {
        self.0.managed.set(managed);
    }

    /// Own text for text nodes; concatenated descendant text otherwise.
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeKind::Text => self.0.text.borrow().clone(),
            _ => self
                .0
                .children
                .borrow()
                .iter()
                .map(Node::text_content)
                .collect(),
        }
    }

    pub fn set_text(&self, content: &str) {
        *self.0.text.borrow_mut() = content.to_string();
    }

    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.0.attributes.borrow().get(name).cloned()
    }

    pub fn attributes(&self) -> BTreeMap<String, AttrValue> {
        self.0.attributes.borrow().clone()
    }

    pub fn set_attribute(&self, name: &str, value: AttrValue) {
        self.0
            .attributes
            .borrow_mut()
            .insert(name.to_string(), value);
    }

    pub fn remove_attribute(&self, name: &str) -> Option<AttrValue> {
        self.0.attributes.borrow_mut().remove(name)
    }

    /// Whether the `class` attribute contains `class_name` as a token.
    pub fn has_class(&self, class_name: &str) -> bool {
        self.attribute("class")
            .and_then(|value| value.as_str().map(str::to_string))
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class_name))
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn child(&self, index: usize) -> Option<Node> {
        self.0.children.borrow().get(index).cloned()
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Position of this node within its parent.
    pub fn index_in_parent(&self) -> Option<usize> {
        let parent = self.parent()?;
        let children = parent.0.children.borrow();
        children.iter().position(|child| child.ptr_eq(self))
    }

    pub fn append_child(&self, child: &Node) {
        let len = self.child_count();
        self.insert_child(len, child);
    }

    /// Insert `child` at `index`, moving it out of its current parent first.
    ///
    /// When the child already lives earlier in this same parent, `index` is
    /// interpreted against the list before the move.
    pub fn insert_child(&self, index: usize, child: &Node) {
        let mut index = index;
        if let Some(old_parent) = child.parent()
            && let Some(old_index) = child.index_in_parent()
        {
            old_parent.0.children.borrow_mut().remove(old_index);
            if old_parent.ptr_eq(self) && old_index < index {
                index -= 1;
            }
        }
        let mut children = self.0.children.borrow_mut();
        let index = index.min(children.len());
        children.insert(index, child.clone());
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
    }

    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut children = self.0.children.borrow_mut();
            match children.iter().position(|c| c.ptr_eq(child)) {
                Some(index) => {
                    children.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            *child.0.parent.borrow_mut() = Weak::new();
        }
        removed
    }

    /// Remove this node from its parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Detach and return every child from `from` onwards.
    pub fn truncate_children(&self, from: usize) -> Vec<Node> {
        let removed: Vec<Node> = {
            let mut children = self.0.children.borrow_mut();
            if from >= children.len() {
                return Vec::new();
            }
            children.drain(from..).collect()
        };
        for node in &removed {
            *node.0.parent.borrow_mut() = Weak::new();
        }
        removed
    }

    /// Bind `listener` for `event`, replacing any previous one.
    pub fn set_listener(&self, event: &str, listener: Listener) {
        self.0
            .listeners
            .borrow_mut()
            .insert(event.to_string(), listener);
    }

    pub fn remove_listener(&self, event: &str) -> Option<Listener> {
        self.0.listeners.borrow_mut().remove(event)
    }

    pub fn listener(&self, event: &str) -> Option<Listener> {
        self.0.listeners.borrow().get(event).cloned()
    }

    /// Dispatch an event on this node, bubbling through ancestors.
    ///
    /// Returns `false` if a listener prevented the default action.
    pub fn dispatch(&self, kind: &str) -> bool {
        let event = DomEvent::new(kind, self);
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if let Some(listener) = node.listener(kind) {
                *event.current.borrow_mut() = node.clone();
                listener.call(&event);
            }
            if event.propagation_stopped.get() {
                break;
            }
            current = node.parent();
        }
        !event.is_default_prevented()
    }

    /// Find the first descendant (depth first) satisfying `predicate`.
    pub fn find(&self, predicate: &dyn Fn(&Node) -> bool) -> Option<Node> {
        for child in self.children() {
            if predicate(&child) {
                return Some(child);
            }
            if let Some(found) = child.find(predicate) {
                return Some(found);
            }
        }
        None
    }

    /// Serialize the subtree as markup. Listener attributes are skipped.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match &self.0.kind {
            NodeKind::Text => out.push_str(&html_escape(&self.0.text.borrow())),
            NodeKind::Fragment => {
                for child in self.children() {
                    child.write_html(out);
                }
            }
            NodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in self.0.attributes.borrow().iter() {
                    match value.serialize() {
                        Some(text) if text.is_empty() => {
                            out.push(' ');
                            out.push_str(name);
                        }
                        Some(text) => {
                            out.push_str(&format!(" {}=\"{}\"", name, html_escape(&text)));
                        }
                        None => {}
                    }
                }
                out.push('>');
                for child in self.children() {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Record this subtree so it can be put back with [`Snapshot::restore`].
    ///
    /// Managed descendants are recorded by position only; their own content
    /// belongs to whoever adopted them.
    pub fn snapshot(&self) -> Snapshot {
        let mut saved = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let children = node.children();
            for child in children.iter().rev() {
                if !child.is_managed() {
                    stack.push(child.clone());
                }
            }
            let key = node.key();
            let managed = node.is_managed();
            let text = node.0.text.borrow().clone();
            let attributes = node.attributes();
            let listeners = node.0.listeners.borrow().clone();
            saved.push(SavedNode {
                key,
                managed,
                text,
                attributes,
                listeners,
                children,
                node,
            });
        }
        Snapshot { saved }
    }

    /// Replace the child list, unlinking children that are not kept.
    fn replace_children(&self, children: &[Node]) {
        let current = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in &current {
            if child.parent().is_some_and(|parent| parent.ptr_eq(self)) {
                *child.0.parent.borrow_mut() = Weak::new();
            }
        }
        for child in children {
            self.append_child(child);
        }
    }
}

struct SavedNode {
    node: Node,
    key: Option<String>,
    managed: bool,
    text: String,
    attributes: BTreeMap<String, AttrValue>,
    listeners: BTreeMap<String, Listener>,
    children: Vec<Node>,
}

/// Saved contents of a subtree, taken with [`Node::snapshot`].
pub struct Snapshot {
    saved: Vec<SavedNode>,
}

impl Snapshot {
    /// The node the snapshot was taken from.
    pub fn root(&self) -> Option<&Node> {
        self.saved.first().map(|saved| &saved.node)
    }

    /// Put every recorded node back to its recorded content and children.
    ///
    /// Nodes added since the snapshot are detached. The root's own position
    /// in its parent is left to the caller.
    pub fn restore(&self) {
        for saved in &self.saved {
            let node = &saved.node;
            node.set_key(saved.key.as_deref());
            node.set_managed(saved.managed);
            node.set_text(&saved.text);
            *node.0.attributes.borrow_mut() = saved.attributes.clone();
            *node.0.listeners.borrow_mut() = saved.listeners.clone();
            node.replace_children(&saved.children);
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("root", &self.root())
            .field("nodes", &self.saved.len())
            .finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.to_html())
    }
}

/// Escape markup special characters in a string.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
