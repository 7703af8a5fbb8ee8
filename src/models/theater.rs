use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub type TheaterId = Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Theater {
    pub id: TheaterId,
    pub name: String,
    pub location: String,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
}
