use slimthread_shared::Role;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Minimal view of one mapping node: linkage plus the author role. The
/// interceptor keeps the full JSON objects around and re-links them; this
/// view only drives the trim decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTree {
    pub nodes: HashMap<String, TreeNode>,
    /// The active leaf the host is rendering from.
    pub current: String,
}

/// Result of a successful trim: the kept chain plus the anchor that the host
/// format requires at the top of any valid tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedTree {
    pub nodes: HashMap<String, TreeNode>,
    /// The preserved parentless head of the original walk.
    pub root: String,
    /// The new active leaf: the last kept node.
    pub current: String,
    /// Kept visible-message ids, oldest first.
    pub kept: Vec<String>,
    pub turns_before: usize,
    pub turns_kept: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeTrimError {
    #[error("current node not present in mapping: {id}")]
    MissingNode { id: String },

    #[error("parent-link cycle detected at node {id}")]
    Cycle { id: String },

    #[error("no visible messages on the active path")]
    NothingVisible,

    #[error("keep budget must be at least one turn")]
    EmptyBudget,
}

/// A node counts as a visible message only with a recognized, non-hidden
/// role. Hidden roles and unrecognized internal roles never reach the user,
/// so they must not consume the visible turn budget.
fn is_visible_message(node: &TreeNode) -> bool {
    matches!(node.role, Some(Role::User | Role::Assistant))
}

/// Walk from the current node to the root via parent links, returning the
/// path in chronological order (parentless head first). A visited set bounds
/// the walk; cycles and dangling references abort the whole operation, since
/// a payload we cannot fully understand is a payload we must not rewrite.
pub fn walk_to_root(tree: &ConversationTree) -> Result<Vec<String>, TreeTrimError> {
    let mut path = Vec::new();
    let mut visited = HashSet::new();
    let mut cursor = tree.current.clone();

    loop {
        if !visited.insert(cursor.clone()) {
            return Err(TreeTrimError::Cycle { id: cursor });
        }
        let Some(node) = tree.nodes.get(&cursor) else {
            return Err(TreeTrimError::MissingNode { id: cursor });
        };
        path.push(cursor.clone());
        match &node.parent {
            Some(parent) => cursor = parent.clone(),
            None => break,
        }
    }

    path.reverse();
    Ok(path)
}

/// Count semantic turns over the active path: consecutive same-role visible
/// nodes collapse into one turn, because the host may split a single reply
/// across several nodes of its internal representation.
pub fn count_turns(tree: &ConversationTree, path: &[String]) -> usize {
    let mut turns = 0usize;
    let mut previous_role: Option<Role> = None;
    for id in path {
        let Some(node) = tree.nodes.get(id) else {
            continue;
        };
        if !is_visible_message(node) {
            continue;
        }
        if node.role != previous_role {
            turns += 1;
            previous_role = node.role;
        }
    }
    turns
}

/// Trim the active path down to the newest `keep_turns` turns and rebuild a
/// structurally valid tree: the original anchor pointing at the first kept
/// node, kept nodes re-linked into a simple chain, the last kept node as the
/// new current.
pub fn trim_tree(tree: &ConversationTree, keep_turns: usize) -> Result<TrimmedTree, TreeTrimError> {
    if keep_turns == 0 {
        return Err(TreeTrimError::EmptyBudget);
    }

    let path = walk_to_root(tree)?;
    let turns_before = count_turns(tree, &path);
    if turns_before == 0 {
        return Err(TreeTrimError::NothingVisible);
    }

    // Find the cut: the earliest index whose suffix still holds at most
    // `keep_turns` turns. Walking newest to oldest, a node extends the
    // current turn when its role matches the previous visible node's role;
    // a turn is never split.
    let mut turns_kept = 0usize;
    let mut previous_role: Option<Role> = None;
    let mut cut = path.len();
    for index in (0..path.len()).rev() {
        let Some(node) = tree.nodes.get(&path[index]) else {
            continue;
        };
        if !is_visible_message(node) {
            continue;
        }
        if node.role != previous_role {
            if turns_kept == keep_turns {
                break;
            }
            turns_kept += 1;
            previous_role = node.role;
        }
        cut = index;
    }

    // Hidden-role nodes inside the kept range are dropped as well.
    let kept: Vec<String> = path
        .get(cut..)
        .unwrap_or_default()
        .iter()
        .filter(|id| {
            tree.nodes
                .get(id.as_str())
                .is_some_and(is_visible_message)
        })
        .cloned()
        .collect();
    if kept.is_empty() {
        return Err(TreeTrimError::NothingVisible);
    }

    let anchor = path
        .first()
        .cloned()
        .unwrap_or_else(|| tree.current.clone());

    let mut nodes: HashMap<String, TreeNode> = HashMap::new();
    let anchor_is_first_kept = kept.first() == Some(&anchor);
    if !anchor_is_first_kept {
        nodes.insert(
            anchor.clone(),
            TreeNode {
                parent: None,
                children: vec![kept[0].clone()],
                role: tree.nodes.get(&anchor).and_then(|node| node.role),
            },
        );
    }

    for (index, id) in kept.iter().enumerate() {
        let parent = if index == 0 {
            if anchor_is_first_kept {
                None
            } else {
                Some(anchor.clone())
            }
        } else {
            Some(kept[index - 1].clone())
        };
        let children = match kept.get(index + 1) {
            Some(next) => vec![next.clone()],
            None => Vec::new(),
        };
        nodes.insert(
            id.clone(),
            TreeNode {
                parent,
                children,
                role: tree.nodes.get(id).and_then(|node| node.role),
            },
        );
    }

    let current = kept
        .last()
        .cloned()
        .unwrap_or_else(|| anchor.clone());

    Ok(TrimmedTree {
        nodes,
        root: anchor,
        current,
        kept,
        turns_before,
        turns_kept,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a linear tree: an anchor with no role, then the given roles in
    /// chronological order. Returns the tree with ids "n0" (anchor), "n1"...
    fn linear_tree(roles: &[Option<Role>]) -> ConversationTree {
        let mut nodes = HashMap::new();
        nodes.insert(
            "n0".to_string(),
            TreeNode {
                parent: None,
                children: vec!["n1".to_string()],
                role: None,
            },
        );
        for (index, role) in roles.iter().enumerate() {
            let id = format!("n{}", index + 1);
            let parent = format!("n{index}");
            let children = if index + 1 < roles.len() {
                vec![format!("n{}", index + 2)]
            } else {
                Vec::new()
            };
            nodes.insert(
                id,
                TreeNode {
                    parent: Some(parent),
                    children,
                    role: *role,
                },
            );
        }
        ConversationTree {
            nodes,
            current: format!("n{}", roles.len()),
        }
    }

    #[test]
    fn walk_returns_chronological_order() {
        let tree = linear_tree(&[Some(Role::User), Some(Role::Assistant)]);
        let Ok(path) = walk_to_root(&tree) else {
            panic!("walk should succeed");
        };
        assert_eq!(path, vec!["n0", "n1", "n2"]);
    }

    #[test]
    fn cycle_aborts_the_walk() {
        let mut tree = linear_tree(&[Some(Role::User), Some(Role::Assistant)]);
        if let Some(anchor) = tree.nodes.get_mut("n0") {
            anchor.parent = Some("n2".to_string());
        }
        assert!(matches!(
            walk_to_root(&tree),
            Err(TreeTrimError::Cycle { .. })
        ));
        assert!(matches!(
            trim_tree(&tree, 2),
            Err(TreeTrimError::Cycle { .. })
        ));
    }

    #[test]
    fn dangling_parent_aborts_the_walk() {
        let mut tree = linear_tree(&[Some(Role::User)]);
        if let Some(node) = tree.nodes.get_mut("n1") {
            node.parent = Some("missing".to_string());
        }
        assert!(matches!(
            walk_to_root(&tree),
            Err(TreeTrimError::MissingNode { .. })
        ));
    }

    #[test]
    fn consecutive_same_role_nodes_collapse_into_one_turn() {
        // user, assistant, assistant, user, assistant: 4 turns, not 5.
        let tree = linear_tree(&[
            Some(Role::User),
            Some(Role::Assistant),
            Some(Role::Assistant),
            Some(Role::User),
            Some(Role::Assistant),
        ]);
        let Ok(path) = walk_to_root(&tree) else {
            panic!("walk should succeed");
        };
        assert_eq!(count_turns(&tree, &path), 4);
    }

    #[test]
    fn keep_two_turns_keeps_exactly_the_final_pair() {
        let tree = linear_tree(&[
            Some(Role::User),
            Some(Role::Assistant),
            Some(Role::Assistant),
            Some(Role::User),
            Some(Role::Assistant),
        ]);
        let Ok(trimmed) = trim_tree(&tree, 2) else {
            panic!("trim should succeed");
        };

        // The doubled assistant node earlier must not influence the cut.
        assert_eq!(trimmed.kept, vec!["n4", "n5"]);
        assert_eq!(trimmed.turns_before, 4);
        assert_eq!(trimmed.turns_kept, 2);
        assert_eq!(trimmed.current, "n5");
        assert_eq!(trimmed.root, "n0");
        // Anchor plus the two kept nodes.
        assert_eq!(trimmed.nodes.len(), 3);
    }

    #[test]
    fn a_turn_is_never_split() {
        // The assistant turn spans two nodes; keeping one turn keeps both.
        let tree = linear_tree(&[
            Some(Role::User),
            Some(Role::Assistant),
            Some(Role::Assistant),
        ]);
        let Ok(trimmed) = trim_tree(&tree, 1) else {
            panic!("trim should succeed");
        };
        assert_eq!(trimmed.kept, vec!["n2", "n3"]);
    }

    #[test]
    fn hidden_roles_do_not_count_and_are_dropped() {
        let tree = linear_tree(&[
            Some(Role::User),
            Some(Role::Tool),
            Some(Role::Assistant),
            Some(Role::System),
            Some(Role::User),
            Some(Role::Assistant),
        ]);
        let Ok(trimmed) = trim_tree(&tree, 3) else {
            panic!("trim should succeed");
        };

        // Three visible turns span the whole path; hidden nodes inside the
        // kept range are still dropped.
        assert_eq!(trimmed.turns_before, 4);
        assert_eq!(trimmed.kept, vec!["n3", "n5", "n6"]);
        assert!(!trimmed.nodes.contains_key("n2"));
        assert!(!trimmed.nodes.contains_key("n4"));
    }

    #[test]
    fn unrecognized_roles_are_treated_as_hidden() {
        let tree = linear_tree(&[
            Some(Role::User),
            Some(Role::Unknown),
            Some(Role::Assistant),
        ]);
        let Ok(trimmed) = trim_tree(&tree, 2) else {
            panic!("trim should succeed");
        };
        assert_eq!(trimmed.kept, vec!["n1", "n3"]);
    }

    #[test]
    fn kept_chain_is_relinked_under_the_anchor() {
        let tree = linear_tree(&[
            Some(Role::User),
            Some(Role::Assistant),
            Some(Role::User),
            Some(Role::Assistant),
        ]);
        let Ok(trimmed) = trim_tree(&tree, 2) else {
            panic!("trim should succeed");
        };
        assert_eq!(trimmed.kept, vec!["n3", "n4"]);

        let Some(anchor) = trimmed.nodes.get("n0") else {
            panic!("anchor must survive");
        };
        assert_eq!(anchor.parent, None);
        assert_eq!(anchor.children, vec!["n3".to_string()]);

        let Some(first) = trimmed.nodes.get("n3") else {
            panic!("first kept node missing");
        };
        assert_eq!(first.parent.as_deref(), Some("n0"));
        assert_eq!(first.children, vec!["n4".to_string()]);

        let Some(last) = trimmed.nodes.get("n4") else {
            panic!("last kept node missing");
        };
        assert_eq!(last.parent.as_deref(), Some("n3"));
        assert!(last.children.is_empty());
    }

    #[test]
    fn all_hidden_path_reports_nothing_visible() {
        let tree = linear_tree(&[Some(Role::System), Some(Role::Tool), None]);
        assert_eq!(trim_tree(&tree, 5), Err(TreeTrimError::NothingVisible));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let tree = linear_tree(&[Some(Role::User)]);
        assert_eq!(trim_tree(&tree, 0), Err(TreeTrimError::EmptyBudget));
    }

    #[test]
    fn generous_budget_keeps_every_visible_node() {
        let tree = linear_tree(&[
            Some(Role::User),
            Some(Role::Assistant),
            Some(Role::User),
        ]);
        let Ok(trimmed) = trim_tree(&tree, 50) else {
            panic!("trim should succeed");
        };
        assert_eq!(trimmed.kept, vec!["n1", "n2", "n3"]);
        assert_eq!(trimmed.turns_kept, 3);
    }
}
