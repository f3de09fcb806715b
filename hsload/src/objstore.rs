//! Object storage sources (`s3://bucket/key`)

use async_trait::async_trait;
#[cfg(feature = "s3")]
use aws_sdk_s3::error::DisplayErrorContext;

use crate::container::ContainerReader;

/// Opens streaming read handles to objects in object storage
#[async_trait]
pub trait ObjectStoreProvider: Send + Sync {
    async fn open(&self, uri: &str) -> anyhow::Result<Box<dyn ContainerReader>>;
}

/// Split `s3://bucket/path/to/key` into bucket and key
pub fn split_uri(uri: &str) -> anyhow::Result<(String, String)> {
    let url = url::Url::parse(uri).map_err(|err| anyhow::anyhow!("invalid uri {uri:?}: {err}"))?;
    if url.scheme() != "s3" {
        return Err(anyhow::anyhow!("{uri:?} is not an s3:// uri"));
    }
    let bucket = url
        .host_str()
        .filter(|bucket| !bucket.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{uri:?} does not name a bucket"))?;
    let key = url.path().trim_start_matches('/');
    if key.is_empty() {
        return Err(anyhow::anyhow!("{uri:?} does not name an object"));
    }
    Ok((bucket.to_string(), key.to_string()))
}

/// S3 access through the AWS SDK
///
/// Credentials and region come from the usual AWS configuration chain (`AWS_*` environment
/// variables, `~/.aws/config`, instance metadata). The client is built on first use.
#[cfg(feature = "s3")]
#[derive(Debug, Default)]
pub struct S3ObjectStore {
    client: tokio::sync::OnceCell<aws_sdk_s3::Client>,
}

#[cfg(feature = "s3")]
impl S3ObjectStore {
    async fn client(&self) -> &aws_sdk_s3::Client {
        self.client
            .get_or_init(|| async {
                let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                aws_sdk_s3::Client::new(&config)
            })
            .await
    }
}

#[cfg(feature = "s3")]
struct S3Reader {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    size: u64,
}

#[cfg(feature = "s3")]
#[async_trait]
impl ContainerReader for S3Reader {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&self, offset: u64, len: usize) -> anyhow::Result<bytes::Bytes> {
        let len = crate::container::read_len(self.size, offset, len);
        if len == 0 {
            return Ok(bytes::Bytes::new());
        }
        // http ranges are inclusive
        let last = offset + len as u64 - 1;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(format!("bytes={offset}-{last}"))
            .send()
            .await
            .map_err(|err| {
                anyhow::anyhow!(
                    "failed reading s3://{}/{} at {offset}: {}",
                    self.bucket,
                    self.key,
                    DisplayErrorContext(&err)
                )
            })?;
        let data = output.body.collect().await.map_err(|err| {
            anyhow::anyhow!("failed reading s3://{}/{}: {err}", self.bucket, self.key)
        })?;
        Ok(data.into_bytes())
    }
}

#[cfg(feature = "s3")]
#[async_trait]
impl ObjectStoreProvider for S3ObjectStore {
    async fn open(&self, uri: &str) -> anyhow::Result<Box<dyn ContainerReader>> {
        let (bucket, key) = split_uri(uri)?;
        let client = self.client().await.clone();
        let head = client
            .head_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(service) if service.is_not_found() => anyhow::anyhow!("{uri} not found"),
                _ => anyhow::anyhow!("cannot access {uri}: {}", DisplayErrorContext(&err)),
            })?;
        let size = u64::try_from(head.content_length().unwrap_or_default())?;
        tracing::debug!("opened {uri} ({size} bytes)");
        Ok(Box::new(S3Reader {
            client,
            bucket,
            key,
            size,
        }))
    }
}

/// The object storage capability compiled into this build, if any
#[must_use]
pub fn default_provider() -> Option<Box<dyn ObjectStoreProvider>> {
    #[cfg(feature = "s3")]
    {
        Some(Box::new(S3ObjectStore::default()))
    }
    #[cfg(not(feature = "s3"))]
    {
        None
    }
}
