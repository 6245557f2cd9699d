use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Image metadata. Only `is_archived` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub storage_id: String,
    pub owner_id: Uuid,
    pub is_archived: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Everything needed to persist a freshly uploaded image.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub storage_id: String,
    pub owner_id: Uuid,
}
