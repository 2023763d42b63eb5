use serde::{Deserialize, Serialize};

/// Fire-and-forget progress signal consumed by a status-display collaborator.
/// The core does not know whether anything is listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub total_before: usize,
    pub kept_after: usize,
    pub removed: usize,
    pub limit: u32,
}

impl StatusReport {
    pub fn no_op(total: usize, limit: u32) -> Self {
        Self {
            total_before: total,
            kept_after: total,
            removed: 0,
            limit,
        }
    }
}
