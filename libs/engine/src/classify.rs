use slimthread_page::{NodeId, PageDom, Query};
use slimthread_shared::Role;

/// Attributes the host uses to mark a message's author, in trust order.
pub(crate) const ROLE_ATTRIBUTES: &[&str] = &["data-message-author-role", "data-author", "data-role"];

/// Secondary turn marker carrying an exact role value.
pub(crate) const TURN_ATTRIBUTE: &str = "data-turn";

const ARIA_SYSTEM_ROLES: &[&str] = &["status", "log", "alert"];

/// Determine the conversational role of an element. Pure function of the
/// element's current attributes and descendants; matching is case-insensitive
/// throughout because the host's attribute casing is not stable.
///
/// Priority order, first match wins: explicit role attribute, turn attribute,
/// structural descendant heuristics, accessibility role, unknown.
pub fn classify(dom: &PageDom, node: NodeId) -> Role {
    if let Some(role) = role_from_role_attributes(dom, node) {
        return role;
    }
    if let Some(role) = role_from_turn_attribute(dom, node) {
        return role;
    }
    if let Some(role) = role_from_descendants(dom, node) {
        return role;
    }
    if let Some(role) = role_from_aria(dom, node) {
        return role;
    }
    Role::Unknown
}

/// True when the element carries one of the attributes we trust to mark a
/// message, whatever its value. Used by the collector's plausibility filter.
pub(crate) fn has_trusted_role_attribute(dom: &PageDom, node: NodeId) -> bool {
    ROLE_ATTRIBUTES
        .iter()
        .any(|name| dom.attribute(node, name).is_some())
        || dom.attribute(node, TURN_ATTRIBUTE).is_some()
}

fn role_from_role_attributes(dom: &PageDom, node: NodeId) -> Option<Role> {
    for name in ROLE_ATTRIBUTES {
        if let Some(value) = dom.attribute(node, name)
            && let Some(role) = vocabulary_match(value)
        {
            return Some(role);
        }
    }
    None
}

fn role_from_turn_attribute(dom: &PageDom, node: NodeId) -> Option<Role> {
    let value = dom.attribute(node, TURN_ATTRIBUTE)?;
    match value.to_ascii_lowercase().as_str() {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "system" => Some(Role::System),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

fn role_from_descendants(dom: &PageDom, node: NodeId) -> Option<Role> {
    let tool_markers = [
        Query::attr_present("data-tool-call"),
        Query::class_token("tool-call"),
    ];
    if tool_markers
        .iter()
        .any(|query| !dom.query(node, query).is_empty())
    {
        return Some(Role::Tool);
    }

    let assistant_actions = [
        Query::attr_prefix("data-testid", "copy-turn"),
        Query::attr_contains("aria-label", "copy"),
        Query::attr_contains("aria-label", "regenerate"),
    ];
    if assistant_actions
        .iter()
        .any(|query| !dom.query(node, query).is_empty())
    {
        return Some(Role::Assistant);
    }

    None
}

fn role_from_aria(dom: &PageDom, node: NodeId) -> Option<Role> {
    let value = dom.attribute(node, "role")?;
    let value = value.to_ascii_lowercase();
    if ARIA_SYSTEM_ROLES.contains(&value.as_str()) {
        Some(Role::System)
    } else {
        None
    }
}

/// Match an attribute value against the known role vocabulary. Substring
/// match for the long tokens; exact match only for the short aliases that
/// would otherwise false-positive inside unrelated words.
fn vocabulary_match(value: &str) -> Option<Role> {
    let value = value.to_ascii_lowercase();
    if value.contains("system") {
        return Some(Role::System);
    }
    if value.contains("tool") || value.contains("function") || value.contains("plugin") {
        return Some(Role::Tool);
    }
    if value.contains("assistant") || value.contains("model") || value == "ai" {
        return Some(Role::Assistant);
    }
    if value.contains("user") || value == "you" {
        return Some(Role::User);
    }
    None
}
