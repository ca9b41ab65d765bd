use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = u64;

/// Project record as returned by the project store. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
