use crate::dom::NodeId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("unknown node: {0:?}")]
    UnknownNode(NodeId),

    #[error("node {0:?} is not attached to the document")]
    NotAttached(NodeId),

    #[error("node {child:?} cannot be attached under {parent:?}")]
    InvalidAttachment { parent: NodeId, child: NodeId },

    #[error("unknown observer: {0}")]
    UnknownObserver(u64),
}
