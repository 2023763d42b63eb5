use crate::tree::{ConversationTree, TreeNode, TreeTrimError, trim_tree};
use serde_json::{Map, Value, json};
use slimthread_shared::{Role, StatusReport};
use std::collections::HashMap;

/// Matches requests against the conversation-history API. Path fragments are
/// configuration: the default targets the one host we ship against.
#[derive(Debug, Clone)]
pub struct EndpointMatcher {
    path_fragments: Vec<String>,
}

impl Default for EndpointMatcher {
    fn default() -> Self {
        Self {
            path_fragments: vec!["/backend-api/conversation".to_string()],
        }
    }
}

impl EndpointMatcher {
    pub fn new(path_fragments: Vec<String>) -> Self {
        Self { path_fragments }
    }

    pub fn matches(&self, url: &str) -> bool {
        let url = url.to_ascii_lowercase();
        self.path_fragments
            .iter()
            .any(|fragment| url.contains(&fragment.to_ascii_lowercase()))
    }
}

/// Why a payload was served unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassThroughReason {
    /// The body is not JSON, or not the object shape we know.
    UnrecognizedShape,
    /// The payload holds no more turns than the budget allows; the original
    /// must be served byte-for-byte.
    NoOverflow,
    /// The tree could not be safely trimmed (cycle, dangling link, nothing
    /// visible). Never rewrite what we cannot fully understand.
    Structural(TreeTrimError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    /// A smaller, structurally valid payload plus the status signal to
    /// dispatch to the other extension contexts.
    Rewritten {
        body: String,
        report: StatusReport,
    },
    /// The caller must serve the original body untouched.
    PassThrough { reason: PassThroughReason },
}

/// Rewrite a conversation-history response body so the host renders at most
/// `keep_turns` turns. Only `mapping`, `current_node` and `root` change;
/// every other field, top-level and per-node, is preserved verbatim. Any
/// doubt about the payload shape results in a pass-through.
pub fn rewrite_body(body: &str, keep_turns: u32) -> RewriteOutcome {
    let Ok(mut value) = serde_json::from_str::<Value>(body) else {
        return RewriteOutcome::PassThrough {
            reason: PassThroughReason::UnrecognizedShape,
        };
    };

    let Some(tree) = extract_tree(&value) else {
        return RewriteOutcome::PassThrough {
            reason: PassThroughReason::UnrecognizedShape,
        };
    };

    let trimmed = match trim_tree(&tree, keep_turns as usize) {
        Ok(trimmed) => trimmed,
        Err(error) => {
            tracing::debug!(%error, "payload not trimmable, passing through");
            return RewriteOutcome::PassThrough {
                reason: PassThroughReason::Structural(error),
            };
        }
    };

    if trimmed.turns_before <= trimmed.turns_kept {
        return RewriteOutcome::PassThrough {
            reason: PassThroughReason::NoOverflow,
        };
    }

    let Some(original_mapping) = value.get("mapping").and_then(Value::as_object) else {
        return RewriteOutcome::PassThrough {
            reason: PassThroughReason::UnrecognizedShape,
        };
    };

    // Rebuild the mapping from the original node objects: identity, message
    // payloads and unknown per-node fields survive; only linkage changes.
    let mut mapping = Map::new();
    for (id, links) in &trimmed.nodes {
        let mut node = original_mapping
            .get(id)
            .cloned()
            .unwrap_or_else(|| json!({ "id": id }));
        if let Some(object) = node.as_object_mut() {
            object.insert(
                "parent".to_string(),
                match &links.parent {
                    Some(parent) => Value::String(parent.clone()),
                    None => Value::Null,
                },
            );
            object.insert(
                "children".to_string(),
                Value::Array(
                    links
                        .children
                        .iter()
                        .map(|child| Value::String(child.clone()))
                        .collect(),
                ),
            );
        }
        mapping.insert(id.clone(), node);
    }

    let report = StatusReport {
        total_before: trimmed.turns_before,
        kept_after: trimmed.turns_kept,
        removed: trimmed.turns_before - trimmed.turns_kept,
        limit: keep_turns,
    };

    if let Some(object) = value.as_object_mut() {
        object.insert("mapping".to_string(), Value::Object(mapping));
        object.insert(
            "current_node".to_string(),
            Value::String(trimmed.current.clone()),
        );
        object.insert("root".to_string(), Value::String(trimmed.root.clone()));
    }

    match serde_json::to_string(&value) {
        Ok(body) => RewriteOutcome::Rewritten { body, report },
        Err(error) => {
            tracing::warn!(%error, "rewritten payload failed to serialize, passing through");
            RewriteOutcome::PassThrough {
                reason: PassThroughReason::UnrecognizedShape,
            }
        }
    }
}

/// Pull the decision-relevant view out of the payload: parent links, child
/// links, author roles. Missing message/author blocks yield role `None`
/// (anchor nodes look exactly like that).
fn extract_tree(value: &Value) -> Option<ConversationTree> {
    let mapping = value.get("mapping")?.as_object()?;
    let current = value.get("current_node")?.as_str()?.to_string();

    let mut nodes = HashMap::new();
    for (id, node) in mapping {
        let parent = node
            .get("parent")
            .and_then(Value::as_str)
            .map(str::to_string);
        let children = node
            .get("children")
            .and_then(Value::as_array)
            .map(|children| {
                children
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let role = node
            .get("message")
            .and_then(|message| message.get("author"))
            .and_then(|author| author.get("role"))
            .and_then(Value::as_str)
            .map(Role::from_wire);
        nodes.insert(
            id.clone(),
            TreeNode {
                parent,
                children,
                role,
            },
        );
    }

    Some(ConversationTree { nodes, current })
}
