use crate::classify::classify;
use crate::collect::CandidateCollector;
use crate::types::{BuildMode, EnginePolicy, MessageDescriptor};
use slimthread_page::{NodeId, PageDom};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

const HOST_ID_ATTRIBUTES: &[&str] = &["data-message-id", "id"];

/// Build the ordered, deduplicated message thread for one evaluation pass.
///
/// `Accurate` applies the full ancestor-walking visibility check on top of
/// the collector's filtering. `Fast` trusts document order and attribute
/// hidden-state only; it exists so a trim can complete before first paint
/// without forcing synchronous layout.
///
/// Returns empty when fewer than `min_thread_len` descriptors survive: below
/// that floor the classification signal is too noisy to trust with removals.
pub fn build_thread(
    collector: &mut CandidateCollector,
    dom: &PageDom,
    root: NodeId,
    mode: BuildMode,
    policy: &EnginePolicy,
    now: Instant,
) -> Vec<MessageDescriptor> {
    let collection = collector.collect(dom, root, now);

    let mut descriptors = Vec::with_capacity(collection.nodes.len());
    for node in collection.nodes {
        let visible = match mode {
            BuildMode::Accurate => dom.is_visible(node),
            BuildMode::Fast => !dom.is_attribute_hidden(node),
        };
        if !visible {
            continue;
        }

        let order_key = descriptors.len();
        descriptors.push(MessageDescriptor {
            node,
            role: classify(dom, node),
            stable_id: stable_id(dom, node, order_key),
            order_key,
            visible,
        });
    }

    if descriptors.len() < policy.min_thread_len {
        if !descriptors.is_empty() {
            tracing::debug!(
                found = descriptors.len(),
                floor = policy.min_thread_len,
                "thread below safety floor, refusing to act"
            );
        }
        return Vec::new();
    }
    descriptors
}

/// Prefer a host-provided identifier; otherwise derive one from position and
/// content. The derived id is stable across re-renders of unchanged content
/// and changes when the content changes.
fn stable_id(dom: &PageDom, node: NodeId, position: usize) -> String {
    for name in HOST_ID_ATTRIBUTES {
        if let Some(value) = dom.attribute(node, name)
            && !value.is_empty()
        {
            return value.to_string();
        }
    }

    let mut hasher = DefaultHasher::new();
    position.hash(&mut hasher);
    dom.text_content(node).hash(&mut hasher);
    format!("pos{position}-{:016x}", hasher.finish())
}
