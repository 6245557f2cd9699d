use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{
    ArchiveRequest, ImageIdRequest, ImagesResponse, ListQuery, MessageResponse, ShareResponse,
    UploadResponse,
};
use super::repo_types::Image;
use super::services::{self, UploadItem};
use crate::{auth::jwt::AuthUser, error::AppError, state::AppState};

pub fn image_routes() -> Router<AppState> {
    Router::new()
        .route("/images", get(list_images))
        .route("/images/share", post(share_image))
        .route("/images/archive", put(archive_image))
        .route("/images/delete", delete(delete_image))
}

pub fn upload_routes(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(max_bytes))
}

#[instrument(skip(state))]
pub async fn list_images(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ImagesResponse>, AppError> {
    let Query(q) = query.map_err(|e| {
        warn!(error = %e, "bad list query");
        AppError::Validation("Invalid query")
    })?;
    let images = services::list_images(&state, q.archived).await?;
    Ok(Json(ImagesResponse { images }))
}

#[instrument(skip(state, body))]
pub async fn share_image(
    State(state): State<AppState>,
    body: Result<Json<ImageIdRequest>, JsonRejection>,
) -> Result<Json<ShareResponse>, AppError> {
    let Json(req) = body?;
    let share_url = services::share_image(&state, req.id).await?;
    Ok(Json(ShareResponse { share_url }))
}

#[instrument(skip(state, body))]
pub async fn archive_image(
    State(state): State<AppState>,
    AuthUser(actor_id): AuthUser,
    body: Result<Json<ArchiveRequest>, JsonRejection>,
) -> Result<Json<Image>, AppError> {
    let Json(req) = body?;
    let image = services::archive_image(&state, req.id, req.is_archived, actor_id).await?;
    Ok(Json(image))
}

#[instrument(skip(state, body))]
pub async fn delete_image(
    State(state): State<AppState>,
    AuthUser(actor_id): AuthUser,
    body: Result<Json<ImageIdRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = body?;
    services::delete_image(&state, req.id, actor_id).await?;
    Ok(Json(MessageResponse {
        message: "Image deleted successfully",
    }))
}

/// `POST /upload` (multipart): `file`, `title`, `description`, `userId`.
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(actor_id): AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut mp = mp.map_err(|e| {
        warn!(error = %e, "upload is not multipart");
        AppError::Validation("Expected multipart/form-data")
    })?;
    let mut file: Option<UploadItem> = None;
    let mut title = String::new();
    let mut description: Option<String> = None;
    let mut user_id = String::new();

    while let Some(field) = mp.next_field().await.map_err(malformed)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await.map_err(malformed)?;
                file = Some(UploadItem { body, content_type });
            }
            Some("title") => title = field.text().await.map_err(malformed)?,
            Some("description") => description = Some(field.text().await.map_err(malformed)?),
            Some("userId") => user_id = field.text().await.map_err(malformed)?,
            _ => {}
        }
    }

    let file = file.ok_or(AppError::MissingField("file"))?;
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::MissingField("userId"));
    }
    let owner_id =
        Uuid::parse_str(user_id).map_err(|_| AppError::Validation("Invalid userId"))?;
    if owner_id != actor_id {
        warn!(%owner_id, %actor_id, "upload on behalf of another user refused");
        return Err(AppError::Forbidden);
    }

    let image =
        services::create_image(&state, file, &title, description.as_deref(), owner_id).await?;
    Ok(Json(UploadResponse {
        status: 200,
        message: "Image uploaded successfully",
        image,
    }))
}

fn malformed(e: axum::extract::multipart::MultipartError) -> AppError {
    warn!(error = %e, "malformed multipart body");
    AppError::Validation("Malformed multipart body")
}
