use bytes::Bytes;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    images::repo_types::{Image, NewImage},
    state::AppState,
};

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

#[instrument(skip(st))]
pub async fn list_images(st: &AppState, archived: bool) -> Result<Vec<Image>, AppError> {
    Ok(st.images.list(archived).await?)
}

/// Uploads the bytes, then records the metadata. Nothing is recorded when the
/// upload fails.
#[instrument(skip(st, file, description), fields(size = file.body.len()))]
pub async fn create_image(
    st: &AppState,
    file: UploadItem,
    title: &str,
    description: Option<&str>,
    owner_id: Uuid,
) -> Result<Image, AppError> {
    if file.body.is_empty() {
        return Err(AppError::MissingField("file"));
    }
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::MissingField("title"));
    }
    if owner_id.is_nil() {
        return Err(AppError::MissingField("userId"));
    }
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let stored = match st.uploads.upload(file.body, &file.content_type).await {
        Ok(obj) => obj,
        Err(e) => {
            error!(error = ?e, %owner_id, "upload gateway failed");
            return Err(AppError::UploadFailed);
        }
    };

    let image = st
        .images
        .insert(NewImage {
            title: title.to_string(),
            description,
            url: stored.url,
            storage_id: stored.storage_id,
            owner_id,
        })
        .await?;

    info!(image_id = %image.id, %owner_id, "image created");
    Ok(image)
}

/// Loads the image and checks that `actor_id` owns it.
async fn owned_image(st: &AppState, id: Uuid, actor_id: Uuid) -> Result<Image, AppError> {
    let image = st.images.find(id).await?.ok_or(AppError::NotFound("Image"))?;
    if image.owner_id != actor_id {
        warn!(image_id = %id, %actor_id, owner_id = %image.owner_id, "non-owner mutation refused");
        return Err(AppError::Forbidden);
    }
    Ok(image)
}

#[instrument(skip(st))]
pub async fn archive_image(
    st: &AppState,
    id: Uuid,
    archived: bool,
    actor_id: Uuid,
) -> Result<Image, AppError> {
    owned_image(st, id, actor_id).await?;
    let image = st
        .images
        .set_archived(id, archived)
        .await?
        .ok_or(AppError::NotFound("Image"))?;
    info!(image_id = %id, archived, "archive flag updated");
    Ok(image)
}

/// Hard delete. The stored object is left in place.
#[instrument(skip(st))]
pub async fn delete_image(st: &AppState, id: Uuid, actor_id: Uuid) -> Result<(), AppError> {
    owned_image(st, id, actor_id).await?;
    if !st.images.delete(id).await? {
        return Err(AppError::NotFound("Image"));
    }
    info!(image_id = %id, "image deleted");
    Ok(())
}

#[instrument(skip(st))]
pub async fn share_image(st: &AppState, id: Uuid) -> Result<String, AppError> {
    let image = st.images.find(id).await?.ok_or(AppError::NotFound("Image"))?;
    Ok(image.url)
}
