use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::images::repo_types::{Image, NewImage};

/// Resource store for image metadata.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    async fn insert(&self, new: NewImage) -> anyhow::Result<Image>;

    /// Images with the given archived flag, newest first.
    async fn list(&self, archived: bool) -> anyhow::Result<Vec<Image>>;

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Image>>;

    /// Returns `None` when no image has that id.
    async fn set_archived(&self, id: Uuid, archived: bool) -> anyhow::Result<Option<Image>>;

    /// Returns `false` when no image has that id.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgImageRepo {
    db: PgPool,
}

impl PgImageRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ImageRepo for PgImageRepo {
    async fn insert(&self, new: NewImage) -> anyhow::Result<Image> {
        let image = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO images (id, title, description, url, storage_id, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, title, description, url, storage_id, owner_id, is_archived, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.url)
        .bind(&new.storage_id)
        .bind(new.owner_id)
        .fetch_one(&self.db)
        .await
        .context("insert image")?;
        Ok(image)
    }

    async fn list(&self, archived: bool) -> anyhow::Result<Vec<Image>> {
        let rows = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, title, description, url, storage_id, owner_id, is_archived, created_at
              FROM images
             WHERE is_archived = $1
             ORDER BY created_at DESC
            "#,
        )
        .bind(archived)
        .fetch_all(&self.db)
        .await
        .context("list images")?;
        Ok(rows)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Image>> {
        let row = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, title, description, url, storage_id, owner_id, is_archived, created_at
              FROM images
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find image")?;
        Ok(row)
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> anyhow::Result<Option<Image>> {
        let row = sqlx::query_as::<_, Image>(
            r#"
            UPDATE images
               SET is_archived = $2
             WHERE id = $1
            RETURNING id, title, description, url, storage_id, owner_id, is_archived, created_at
            "#,
        )
        .bind(id)
        .bind(archived)
        .fetch_optional(&self.db)
        .await
        .context("update image archive flag")?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete image")?;
        Ok(res.rows_affected() > 0)
    }
}
