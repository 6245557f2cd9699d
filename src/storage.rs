use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::config::StorageConfig;

/// Where the gateway put an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    pub storage_id: String,
}

/// Object storage that accepts raw bytes and hands back a durable URL.
#[async_trait]
pub trait UploadGateway: Send + Sync {
    async fn upload(&self, body: Bytes, content_type: &str) -> anyhow::Result<StoredObject>;
}

#[derive(Clone)]
pub struct S3Gateway {
    client: Client,
    bucket: String,
    folder: String,
    public_url: String,
}

impl S3Gateway {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            folder: cfg.folder.trim_matches('/').to_string(),
            public_url: cfg.public_url.trim_end_matches('/').to_string(),
        })
    }

    fn object_key(&self, content_type: &str) -> String {
        let ext = ext_from_mime(content_type).unwrap_or("bin");
        format!("{}/{}.{}", self.folder, Uuid::new_v4(), ext)
    }
}

#[async_trait]
impl UploadGateway for S3Gateway {
    async fn upload(&self, body: Bytes, content_type: &str) -> anyhow::Result<StoredObject> {
        let key = self.object_key(content_type);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {}", key))?;

        debug!(key = %key, "object stored");
        Ok(StoredObject {
            url: format!("{}/{}", self.public_url, key),
            storage_id: key,
        })
    }
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
