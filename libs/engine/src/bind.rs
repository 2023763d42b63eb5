use slimthread_page::{NodeId, PageDom, Query};

/// Outcome of the conversation-root probe chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootBinding {
    /// A structural probe matched; this is very likely the conversation.
    Primary(NodeId),
    /// Nothing matched; the document body is the best we have. Callers must
    /// treat this as "could not find the chat" and surface a degraded state,
    /// never operate silently.
    Fallback(NodeId),
}

impl RootBinding {
    pub fn node(self) -> NodeId {
        match self {
            RootBinding::Primary(node) | RootBinding::Fallback(node) => node,
        }
    }

    pub fn is_fallback(self) -> bool {
        matches!(self, RootBinding::Fallback(_))
    }
}

/// Locate the conversation root via prioritized structural probes: ARIA main
/// role, then the semantic main element, then class-name heuristics. The
/// body fallback is last-resort only.
pub fn find_conversation_root(dom: &PageDom) -> RootBinding {
    let probes = [
        Query::attr_equals("role", "main"),
        Query::tag("main"),
        Query::class_token("conversation"),
        Query::class_token("chat-container"),
        Query::class_token("thread"),
    ];

    for probe in &probes {
        if let Some(node) = dom.query(dom.body(), probe).first().copied() {
            return RootBinding::Primary(node);
        }
    }

    RootBinding::Fallback(dom.body())
}
