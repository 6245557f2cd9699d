use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::images::repo_types::Image;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    pub images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
pub struct ImageIdRequest {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRequest {
    pub id: Uuid,
    pub is_archived: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub share_url: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: u16,
    pub message: &'static str,
    pub image: Image,
}
