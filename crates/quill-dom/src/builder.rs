//! Incremental tree builder.
//!
//! The builder is driven by imperative calls (`open_element`, `text`,
//! `close_element`, ...) describing the desired tree in document order. Each
//! call is reconciled against the nodes already present at the current
//! position, so an unchanged description leaves the live tree untouched.
//!
//! # Reconciliation
//!
//! - The node at the cursor is reused when its tag and key match.
//! - Otherwise a later sibling with the same key is moved to the cursor.
//! - Otherwise a new node is created and inserted at the cursor.
//! - On close, every child the description did not visit is removed.

use thiserror::Error;

use crate::node::{AttrValue, Node};

/// Errors produced by a malformed sequence of builder calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("close_element(`{found}`) does not match the open element `{expected}`")]
    MismatchedClose { expected: String, found: String },
    #[error("close_element(`{0}`) called with no open element")]
    NothingOpen(String),
    #[error("{0} element(s) left open at the end of the patch")]
    UnclosedElements(usize),
}

/// One attribute that differs from the previous pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrChange {
    pub name: String,
    pub previous: Option<AttrValue>,
    pub current: Option<AttrValue>,
}

/// Result of opening an element.
#[derive(Debug, Clone)]
pub struct Opened {
    pub node: Node,
    /// Attributes that changed on this node during this pass.
    pub changes: Vec<AttrChange>,
    /// Whether the node was created rather than reused.
    pub created: bool,
}

impl Opened {
    pub fn changed(&self, name: &str) -> bool {
        self.changes.iter().any(|change| change.name == name)
    }
}

/// The imperative tree-builder protocol.
pub trait TreeBuilder {
    fn open_element(&mut self, tag: &str, key: Option<&str>, attrs: &[(String, AttrValue)])
    -> Opened;

    fn close_element(&mut self, tag: &str) -> Result<Node, BuilderError>;

    /// Open and immediately close an element.
    fn void_element(
        &mut self,
        tag: &str,
        key: Option<&str>,
        attrs: &[(String, AttrValue)],
    ) -> Result<Opened, BuilderError> {
        let opened = self.open_element(tag, key, attrs);
        self.close_element(tag)?;
        Ok(opened)
    }

    fn text(&mut self, content: &str) -> Node;

    /// Place an existing node at the current position.
    fn adopt(&mut self, node: &Node);

    /// Number of elements currently open.
    fn depth(&self) -> usize;
}

struct Frame {
    parent: Node,
    cursor: usize,
}

/// The default [`TreeBuilder`], reconciling in document order.
pub struct IncrementalDom {
    frames: Vec<Frame>,
    removed: Vec<Node>,
    /// Managed node this builder may still reuse: the root being patched.
    owned_root: Option<Node>,
}

impl IncrementalDom {
    /// Builder that appends into (and reconciles) the children of `host`.
    pub fn new(host: &Node) -> Self {
        Self {
            frames: vec![Frame {
                parent: host.clone(),
                cursor: 0,
            }],
            removed: Vec::new(),
            owned_root: None,
        }
    }

    /// Reconcile `root` in place.
    ///
    /// `f` describes the new tree. The first top-level node it produces
    /// replaces `root` at the same position in `root`'s parent, or is the
    /// reused `root` itself when tag and key match. Returns `None` when `f`
    /// produced nothing. On error every change made to `root`'s subtree is
    /// rolled back and `root` is put back in its position.
    pub fn patch_outer<R, E>(
        root: Option<&Node>,
        f: impl FnOnce(&mut IncrementalDom) -> Result<R, E>,
    ) -> Result<(Option<Node>, R), E>
    where
        E: From<BuilderError>,
    {
        let host = Node::fragment();
        let anchor = root.and_then(|node| Some((node.parent()?, node.index_in_parent()?)));
        let snapshot = root.map(Node::snapshot);
        if let Some(node) = root {
            host.append_child(node);
        }

        let restore = |host: &Node| {
            for child in host.children() {
                child.detach();
            }
            if let Some(snapshot) = &snapshot {
                snapshot.restore();
            }
            if let (Some(node), Some((parent, index))) = (root, &anchor) {
                parent.insert_child(*index, node);
            }
        };

        let mut dom = IncrementalDom::new(&host);
        dom.owned_root = root.cloned();
        let value = match f(&mut dom) {
            Ok(value) => value,
            Err(err) => {
                restore(&host);
                return Err(err);
            }
        };
        if let Err(err) = dom.finish() {
            restore(&host);
            return Err(err.into());
        }

        let produced = host.children();
        if produced.len() > 1 {
            tracing::warn!(
                roots = produced.len(),
                "patch produced several top-level nodes; keeping the first"
            );
        }
        for node in &produced {
            node.detach();
        }
        let new_root = produced.into_iter().next();
        if let (Some(node), Some((parent, index))) = (&new_root, anchor) {
            parent.insert_child(index, node);
        }
        Ok((new_root, value))
    }

    /// Close the outermost frame, removing unvisited children of the host.
    pub fn finish(&mut self) -> Result<(), BuilderError> {
        if self.frames.len() > 1 {
            return Err(BuilderError::UnclosedElements(self.frames.len() - 1));
        }
        if let Some(frame) = self.frames.first() {
            let removed = frame.parent.truncate_children(frame.cursor);
            self.removed.extend(removed);
        }
        Ok(())
    }

    /// Nodes removed so far because the description no longer produced them.
    pub fn removed(&self) -> &[Node] {
        &self.removed
    }

    fn frame(&self) -> &Frame {
        self.frames
            .last()
            .expect("builder always keeps its host frame")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .expect("builder always keeps its host frame")
    }

    /// Find a node passing `accept` at the cursor, or a keyed sibling after it.
    fn claim(&self, accept: impl Fn(&Node) -> bool, keyed: bool) -> Option<Node> {
        let matches = |node: &Node| {
            let claimable = !node.is_managed()
                || self.owned_root.as_ref().is_some_and(|root| root.ptr_eq(node));
            claimable && accept(node)
        };
        let frame = self.frame();
        let children = frame.parent.children();
        if let Some(candidate) = children.get(frame.cursor)
            && matches(candidate)
        {
            return Some(candidate.clone());
        }
        if !keyed {
            return None;
        }
        let found = children
            .iter()
            .skip(frame.cursor + 1)
            .find(|node| matches(*node))?
            .clone();
        frame.parent.insert_child(frame.cursor, &found);
        Some(found)
    }
}

impl TreeBuilder for IncrementalDom {
    fn open_element(
        &mut self,
        tag: &str,
        key: Option<&str>,
        attrs: &[(String, AttrValue)],
    ) -> Opened {
        let claimed = self.claim(
            |node| node.tag() == Some(tag) && node.key().as_deref() == key,
            key.is_some(),
        );
        let (node, created) = match claimed {
            Some(node) => (node, false),
            None => {
                let node = Node::element(tag);
                node.set_key(key);
                let frame = self.frame();
                frame.parent.insert_child(frame.cursor, &node);
                (node, true)
            }
        };
        let changes = diff_attributes(&node, attrs);

        self.frame_mut().cursor += 1;
        self.frames.push(Frame {
            parent: node.clone(),
            cursor: 0,
        });

        Opened {
            node,
            changes,
            created,
        }
    }

    fn close_element(&mut self, tag: &str) -> Result<Node, BuilderError> {
        if self.frames.len() <= 1 {
            return Err(BuilderError::NothingOpen(tag.to_string()));
        }
        let expected = self.frame().parent.tag().unwrap_or_default().to_string();
        if expected != tag {
            return Err(BuilderError::MismatchedClose {
                expected,
                found: tag.to_string(),
            });
        }
        let Some(frame) = self.frames.pop() else {
            return Err(BuilderError::NothingOpen(tag.to_string()));
        };
        let removed = frame.parent.truncate_children(frame.cursor);
        self.removed.extend(removed);
        Ok(frame.parent)
    }

    fn text(&mut self, content: &str) -> Node {
        let node = match self.claim(Node::is_text, false) {
            Some(node) => {
                if node.text_content() != content {
                    node.set_text(content);
                }
                node
            }
            None => {
                let node = Node::text(content);
                let frame = self.frame();
                frame.parent.insert_child(frame.cursor, &node);
                node
            }
        };
        self.frame_mut().cursor += 1;
        node
    }

    fn adopt(&mut self, node: &Node) {
        let frame = self.frame();
        let in_place = frame
            .parent
            .child(frame.cursor)
            .is_some_and(|current| current.ptr_eq(node));
        if !in_place {
            frame.parent.insert_child(frame.cursor, node);
        }
        node.set_managed(true);
        self.frame_mut().cursor += 1;
    }

    fn depth(&self) -> usize {
        self.frames.len() - 1
    }
}

/// Apply `attrs` to `node` and report what changed.
fn diff_attributes(node: &Node, attrs: &[(String, AttrValue)]) -> Vec<AttrChange> {
    let previous = node.attributes();
    let mut changes = Vec::new();

    for (name, value) in attrs {
        let old = previous.get(name);
        if old != Some(value) {
            node.set_attribute(name, value.clone());
            changes.push(AttrChange {
                name: name.clone(),
                previous: old.cloned(),
                current: Some(value.clone()),
            });
        }
    }

    for (name, old) in previous {
        if !attrs.iter().any(|(n, _)| *n == name) {
            node.remove_attribute(&name);
            changes.push(AttrChange {
                name,
                previous: Some(old),
                current: None,
            });
        }
    }

    changes
}
