use crate::error::PageError;
use crate::observer::{MutationKind, MutationRecord, ObserverConfig, ObserverHandle};
use crate::query::Query;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Index handle into the page arena. Handles are weak by design: a node can be
/// detached at any time by a concurrent actor, so holders must re-resolve
/// against the document on every evaluation pass instead of caching handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
struct PageNode {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct ObserverEntry {
    id: u64,
    root: NodeId,
    config: ObserverConfig,
    connected: bool,
    tx: mpsc::UnboundedSender<MutationRecord>,
}

/// Arena-backed stand-in for the host document. Nodes keep parent/child links
/// in document order; detached nodes stay in the arena so stale handles stay
/// inspectable without being reachable from the document.
#[derive(Debug)]
pub struct PageDom {
    nodes: Vec<PageNode>,
    body: NodeId,
    observers: Vec<ObserverEntry>,
    next_observer_id: u64,
}

impl Default for PageDom {
    fn default() -> Self {
        Self::new()
    }
}

impl PageDom {
    pub fn new() -> Self {
        let body = PageNode {
            tag: "body".to_string(),
            attributes: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![body],
            body: NodeId(0),
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PageNode {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&PageNode, PageError> {
        self.nodes.get(id.0).ok_or(PageError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut PageNode, PageError> {
        self.nodes.get_mut(id.0).ok_or(PageError::UnknownNode(id))
    }

    pub fn exists(&self, id: NodeId) -> bool {
        self.nodes.len() > id.0
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0).map(|node| node.tag.as_str())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0).map(|node| node.text.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Case-insensitive attribute lookup.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        let node = self.nodes.get(id.0)?;
        node.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn attribute_names(&self, id: NodeId) -> Vec<String> {
        self.nodes
            .get(id.0)
            .map(|node| node.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), PageError> {
        self.node_mut(id)?.text = text.to_string();
        self.notify(id, MutationKind::ChildList);
        Ok(())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), PageError> {
        let name = name.to_ascii_lowercase();
        self.node_mut(id)?
            .attributes
            .insert(name.clone(), value.to_string());
        self.notify(id, MutationKind::Attribute(name));
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), PageError> {
        let name = name.to_ascii_lowercase();
        let removed = self.node_mut(id)?.attributes.remove(&name).is_some();
        if removed {
            self.notify(id, MutationKind::Attribute(name));
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), PageError> {
        if parent == child || self.is_ancestor(child, parent) {
            return Err(PageError::InvalidAttachment { parent, child });
        }
        self.node(parent)?;
        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.notify(parent, MutationKind::ChildList);
        Ok(())
    }

    /// Detach a node from the document. The arena entry survives so stale
    /// handles can still be inspected, but the node is no longer reachable.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), PageError> {
        let Some(parent) = self.node(id)?.parent else {
            return Err(PageError::NotAttached(id));
        };
        self.detach(id)?;
        self.notify(parent, MutationKind::ChildList);
        Ok(())
    }

    /// Swap `old` for `replacement` at the same position under the same
    /// parent. One child-list mutation is reported for the parent.
    pub fn replace_node(&mut self, old: NodeId, replacement: NodeId) -> Result<(), PageError> {
        let Some(parent) = self.node(old)?.parent else {
            return Err(PageError::NotAttached(old));
        };
        self.node(replacement)?;
        self.detach(replacement)?;

        let parent_node = self.node_mut(parent)?;
        let Some(slot) = parent_node.children.iter().position(|child| *child == old) else {
            return Err(PageError::NotAttached(old));
        };
        parent_node.children[slot] = replacement;

        self.node_mut(old)?.parent = None;
        self.node_mut(replacement)?.parent = Some(parent);
        self.notify(parent, MutationKind::ChildList);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> Result<(), PageError> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        let parent_node = self.node_mut(parent)?;
        parent_node.children.retain(|child| *child != id);
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cursor = id;
        loop {
            if cursor == self.body {
                return true;
            }
            match self.parent(cursor) {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
    }

    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = self.parent(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Depth-first preorder walk of the attached document.
    pub fn document_order(&self) -> Vec<NodeId> {
        self.subtree(self.body)
    }

    pub fn document_position(&self, id: NodeId) -> Option<usize> {
        self.document_order().iter().position(|node| *node == id)
    }

    fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    pub fn descendant_count(&self, id: NodeId) -> usize {
        self.subtree(id).len().saturating_sub(1)
    }

    /// Concatenated text of the node and its subtree, document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.subtree(id) {
            if let Some(text) = self.text(node)
                && !text.is_empty()
            {
                out.push_str(text);
            }
        }
        out
    }

    /// Run one query strategy below `root` (exclusive), in document order.
    pub fn query(&self, root: NodeId, query: &Query) -> Vec<NodeId> {
        self.subtree(root)
            .into_iter()
            .filter(|id| *id != root && self.matches(*id, query))
            .collect()
    }

    pub fn matches(&self, id: NodeId, query: &Query) -> bool {
        match query {
            Query::AttrPresent { name } => self.attribute(id, name).is_some(),
            Query::AttrEquals { name, value } => self
                .attribute(id, name)
                .is_some_and(|actual| actual.eq_ignore_ascii_case(value)),
            Query::AttrContains { name, value } => self.attribute(id, name).is_some_and(|actual| {
                actual
                    .to_ascii_lowercase()
                    .contains(&value.to_ascii_lowercase())
            }),
            Query::AttrPrefix { name, value } => self.attribute(id, name).is_some_and(|actual| {
                actual
                    .to_ascii_lowercase()
                    .starts_with(&value.to_ascii_lowercase())
            }),
            Query::Tag { name } => self
                .tag(id)
                .is_some_and(|tag| tag.eq_ignore_ascii_case(name)),
            Query::ClassToken { token } => self.attribute(id, "class").is_some_and(|classes| {
                classes
                    .split_ascii_whitespace()
                    .any(|candidate| candidate.eq_ignore_ascii_case(token))
            }),
        }
    }

    /// Full visibility check: the node and every ancestor must be free of
    /// hidden markers, including inline style. This is the stand-in for the
    /// layout-dependent check and must not be called on the pre-paint path.
    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_attached(id) {
            return false;
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.node_hidden_by_attribute(current) || self.node_hidden_by_style(current) {
                return false;
            }
            cursor = self.parent(current);
        }
        true
    }

    /// Attribute-only hidden check, safe on the pre-paint path: `hidden` and
    /// `aria-hidden` up the ancestor chain, no style inspection.
    pub fn is_attribute_hidden(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.node_hidden_by_attribute(current) {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn node_hidden_by_attribute(&self, id: NodeId) -> bool {
        if self.attribute(id, "hidden").is_some() {
            return true;
        }
        self.attribute(id, "aria-hidden")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    fn node_hidden_by_style(&self, id: NodeId) -> bool {
        let Some(style) = self.attribute(id, "style") else {
            return false;
        };
        let style: String = style
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        style.contains("display:none") || style.contains("visibility:hidden")
    }

    pub fn observe(
        &mut self,
        root: NodeId,
        config: ObserverConfig,
    ) -> Result<(ObserverHandle, mpsc::UnboundedReceiver<MutationRecord>), PageError> {
        self.node(root)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.push(ObserverEntry {
            id,
            root,
            config,
            connected: true,
            tx,
        });
        Ok((ObserverHandle { id }, rx))
    }

    /// Stop delivery without discarding the registration. Mutations made while
    /// disconnected are never delivered, which is exactly what the executor
    /// relies on to avoid observing its own writes.
    pub fn disconnect(&mut self, handle: ObserverHandle) -> Result<(), PageError> {
        self.observer_entry(handle)?.connected = false;
        Ok(())
    }

    pub fn reconnect(&mut self, handle: ObserverHandle) -> Result<(), PageError> {
        self.observer_entry(handle)?.connected = true;
        Ok(())
    }

    pub fn drop_observer(&mut self, handle: ObserverHandle) -> Result<(), PageError> {
        let before = self.observers.len();
        self.observers.retain(|entry| entry.id != handle.id);
        if self.observers.len() == before {
            return Err(PageError::UnknownObserver(handle.id));
        }
        Ok(())
    }

    pub fn observer_config(&self, handle: ObserverHandle) -> Option<&ObserverConfig> {
        self.observers
            .iter()
            .find(|entry| entry.id == handle.id)
            .map(|entry| &entry.config)
    }

    fn observer_entry(&mut self, handle: ObserverHandle) -> Result<&mut ObserverEntry, PageError> {
        self.observers
            .iter_mut()
            .find(|entry| entry.id == handle.id)
            .ok_or(PageError::UnknownObserver(handle.id))
    }

    fn notify(&self, target: NodeId, kind: MutationKind) {
        for entry in &self.observers {
            if !entry.connected {
                continue;
            }
            let in_scope = entry.root == target
                || (entry.config.subtree && self.is_ancestor(entry.root, target));
            if !in_scope {
                continue;
            }
            let wanted = match &kind {
                MutationKind::ChildList => entry.config.child_list,
                MutationKind::Attribute(name) => {
                    entry.config.attribute_filter.is_empty()
                        || entry
                            .config
                            .attribute_filter
                            .iter()
                            .any(|watched| watched.eq_ignore_ascii_case(name))
                }
            };
            if !wanted {
                continue;
            }
            let _ = entry.tx.send(MutationRecord {
                target,
                kind: kind.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dom_with_children(count: usize) -> (PageDom, Vec<NodeId>) {
        let mut dom = PageDom::new();
        let body = dom.body();
        let mut ids = Vec::new();
        for index in 0..count {
            let node = dom.create_element("div");
            let Ok(()) = dom.append_child(body, node) else {
                panic!("append should succeed");
            };
            let Ok(()) = dom.set_text(node, &format!("message {index}")) else {
                panic!("set_text should succeed");
            };
            ids.push(node);
        }
        (dom, ids)
    }

    #[test]
    fn document_order_is_preorder_depth_first() {
        let mut dom = PageDom::new();
        let body = dom.body();
        let outer = dom.create_element("main");
        let inner = dom.create_element("article");
        let sibling = dom.create_element("footer");
        assert!(dom.append_child(body, outer).is_ok());
        assert!(dom.append_child(outer, inner).is_ok());
        assert!(dom.append_child(body, sibling).is_ok());

        assert_eq!(dom.document_order(), vec![body, outer, inner, sibling]);
        assert_eq!(dom.document_position(inner), Some(2));
    }

    #[test]
    fn remove_detaches_but_keeps_arena_entry() {
        let (mut dom, ids) = dom_with_children(3);
        assert!(dom.remove_node(ids[1]).is_ok());

        assert!(!dom.is_attached(ids[1]));
        assert!(dom.exists(ids[1]));
        assert_eq!(dom.children(dom.body()), &[ids[0], ids[2]]);
    }

    #[test]
    fn replace_keeps_sibling_position() {
        let (mut dom, ids) = dom_with_children(3);
        let marker = dom.create_element("slimthread-trimmed");
        assert!(dom.replace_node(ids[1], marker).is_ok());

        assert_eq!(dom.children(dom.body()), &[ids[0], marker, ids[2]]);
        assert!(!dom.is_attached(ids[1]));
    }

    #[test]
    fn query_matches_case_insensitively() {
        let mut dom = PageDom::new();
        let body = dom.body();
        let node = dom.create_element("div");
        assert!(dom.append_child(body, node).is_ok());
        assert!(dom.set_attribute(node, "data-author", "Assistant").is_ok());

        let hits = dom.query(body, &Query::attr_contains("DATA-AUTHOR", "assist"));
        assert_eq!(hits, vec![node]);
    }

    #[test]
    fn class_token_requires_whole_token() {
        let mut dom = PageDom::new();
        let body = dom.body();
        let node = dom.create_element("div");
        assert!(dom.append_child(body, node).is_ok());
        assert!(
            dom.set_attribute(node, "class", "chat-message highlighted")
                .is_ok()
        );

        assert!(dom.matches(node, &Query::class_token("chat-message")));
        assert!(!dom.matches(node, &Query::class_token("chat")));
    }

    #[test]
    fn visibility_walks_ancestors() {
        let mut dom = PageDom::new();
        let body = dom.body();
        let wrapper = dom.create_element("div");
        let leaf = dom.create_element("p");
        assert!(dom.append_child(body, wrapper).is_ok());
        assert!(dom.append_child(wrapper, leaf).is_ok());
        assert!(dom.is_visible(leaf));

        assert!(
            dom.set_attribute(wrapper, "style", "display: none")
                .is_ok()
        );
        assert!(!dom.is_visible(leaf));
        // Attribute-only check must not consult style.
        assert!(!dom.is_attribute_hidden(leaf));

        assert!(dom.set_attribute(wrapper, "hidden", "").is_ok());
        assert!(dom.is_attribute_hidden(leaf));
    }

    #[test]
    fn observer_receives_scoped_child_list_mutations() {
        let mut dom = PageDom::new();
        let body = dom.body();
        let section = dom.create_element("section");
        let outside = dom.create_element("aside");
        assert!(dom.append_child(body, section).is_ok());
        assert!(dom.append_child(body, outside).is_ok());

        let observed = dom.observe(section, ObserverConfig::default());
        let Ok((_handle, mut rx)) = observed else {
            panic!("observe should succeed");
        };

        let inside = dom.create_element("div");
        assert!(dom.append_child(section, inside).is_ok());
        let stray = dom.create_element("div");
        assert!(dom.append_child(outside, stray).is_ok());

        let Ok(record) = rx.try_recv() else {
            panic!("expected one record");
        };
        assert_eq!(record.target, section);
        assert_eq!(record.kind, MutationKind::ChildList);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn attribute_filter_limits_delivery() {
        let mut dom = PageDom::new();
        let body = dom.body();
        let node = dom.create_element("div");
        assert!(dom.append_child(body, node).is_ok());

        let config = ObserverConfig {
            attribute_filter: vec!["data-role".to_string()],
            ..ObserverConfig::default()
        };
        let Ok((_handle, mut rx)) = dom.observe(body, config) else {
            panic!("observe should succeed");
        };

        assert!(dom.set_attribute(node, "data-color", "red").is_ok());
        assert!(dom.set_attribute(node, "data-role", "user").is_ok());

        let Ok(record) = rx.try_recv() else {
            panic!("expected one record");
        };
        assert_eq!(record.kind, MutationKind::Attribute("data-role".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disconnected_observer_misses_mutations() {
        let (mut dom, ids) = dom_with_children(2);
        let Ok((handle, mut rx)) = dom.observe(dom.body(), ObserverConfig::default()) else {
            panic!("observe should succeed");
        };

        assert!(dom.disconnect(handle).is_ok());
        assert!(dom.remove_node(ids[0]).is_ok());
        assert!(rx.try_recv().is_err());

        assert!(dom.reconnect(handle).is_ok());
        assert!(dom.remove_node(ids[1]).is_ok());
        assert!(rx.try_recv().is_ok());
    }
}
