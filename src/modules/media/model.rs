use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const UPLOAD_STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Upload {
    pub id: Uuid,
    /// Relative to the configured uploads root.
    pub stored_path: String,
    pub status: String,
}

impl Upload {
    pub fn is_completed(&self) -> bool {
        self.status == UPLOAD_STATUS_COMPLETED
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Episode {
    pub id: Uuid,
    pub title: Option<String>,
    pub filesystem_path: Option<String>,
}
