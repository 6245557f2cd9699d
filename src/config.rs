use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base of the durable URLs handed back to clients.
    pub public_url: String,
    pub folder: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "picshare".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "picshare-users".into()),
        };

        let endpoint = std::env::var("MINIO_ENDPOINT")?;
        let bucket = std::env::var("MINIO_BUCKET")?;
        let public_url = std::env::var("STORAGE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let storage = StorageConfig {
            access_key: std::env::var("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY")?,
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
            folder: std::env::var("UPLOAD_FOLDER").unwrap_or_else(|_| "user_uploads".into()),
            endpoint,
            bucket,
            public_url,
        };

        let max_upload_bytes = std::env::var("MAX_UPLOAD_MB")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(20)
            * 1024
            * 1024;

        Ok(Self {
            database_url,
            jwt,
            storage,
            max_upload_bytes,
        })
    }
}
