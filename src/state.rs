use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::repo::{PgUserRepo, UserRepo};
use crate::config::AppConfig;
use crate::images::repo::{ImageRepo, PgImageRepo};
use crate::storage::{S3Gateway, UploadGateway};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub images: Arc<dyn ImageRepo>,
    pub uploads: Arc<dyn UploadGateway>,
}

impl AppState {
    /// Connects to Postgres and the object store. The pool is returned too so
    /// the caller can run migrations on it.
    pub async fn init() -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let uploads = Arc::new(S3Gateway::new(&config.storage).await?) as Arc<dyn UploadGateway>;

        let state = Self::from_parts(
            config,
            Arc::new(PgUserRepo::new(db.clone())),
            Arc::new(PgImageRepo::new(db.clone())),
            uploads,
        );
        Ok((state, db))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepo>,
        images: Arc<dyn ImageRepo>,
        uploads: Arc<dyn UploadGateway>,
    ) -> Self {
        Self {
            config,
            users,
            images,
            uploads,
        }
    }
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> Self {
        Self::fake_with_gateway(crate::testing::FakeGateway::default())
    }

    pub fn fake_with_gateway(gateway: crate::testing::FakeGateway) -> Self {
        use crate::testing::{MemoryImageRepo, MemoryUserRepo};

        Self::from_parts(
            Arc::new(crate::testing::test_config()),
            Arc::new(MemoryUserRepo::default()),
            Arc::new(MemoryImageRepo::default()),
            Arc::new(gateway),
        )
    }
}
