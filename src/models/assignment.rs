use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::DbId;

/// Snapshot of every project's assigned interns, keyed by project id.
///
/// Projects without assignments are absent from the map.
pub type AssignedInternsMap = BTreeMap<DbId, Vec<DbId>>;

/// Input for bulk assign and unassign requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternIdsInput {
    pub intern_ids: Vec<DbId>,
}

/// Whether an intern may currently be removed from a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnassignCheck {
    pub project_id: DbId,
    pub intern_id: DbId,
    pub can_unassign: bool,
}
