use crate::dom::NodeId;

/// Scope and filter configuration for one attached observer. Mirrors the
/// mutation-observation contract of the host page: child-list changes,
/// optionally across the whole subtree, plus a filtered attribute watch-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    pub subtree: bool,
    pub child_list: bool,
    /// Attribute names to report. Empty means every attribute.
    pub attribute_filter: Vec<String>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            subtree: true,
            child_list: true,
            attribute_filter: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

/// Handle to an attached observer. The handle stays valid across
/// disconnect/reconnect cycles; dropping the receiver ends delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle {
    pub(crate) id: u64,
}

impl ObserverHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}
