pub mod intercept;
pub mod tree;

pub use intercept::{EndpointMatcher, PassThroughReason, RewriteOutcome, rewrite_body};
pub use tree::{
    ConversationTree, TreeNode, TreeTrimError, TrimmedTree, count_turns, trim_tree, walk_to_root,
};
