use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use http_fetcher::HttpFetcher;
use std::time::Duration;
use tracing::{error, info};

/// §4.A source for an upload: either bytes already in hand, or a URL the
/// object store should fetch itself (reusing the HTTP fetcher, including
/// the drive-host handshake).
pub enum UploadSource<'a> {
    Bytes(Vec<u8>),
    Url(&'a str),
}

#[derive(Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Thin client over an S3-compatible object store. One PUT per successful
/// upload; any I/O or client error yields `None`, logged with context.
pub struct ObjectStoreClient {
    client: S3Client,
    fetcher: HttpFetcher,
    config: ObjectStoreConfig,
}

impl ObjectStoreClient {
    pub async fn new(config: ObjectStoreConfig) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .load()
            .await;
        Self {
            client: S3Client::new(&aws_config),
            fetcher: HttpFetcher::new(),
            config,
        }
    }

    fn key(&self, tender_id: &str, file_name: &str) -> String {
        format!("tenders/{tender_id}/{file_name}")
    }

    fn canonical_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.config.endpoint, self.config.bucket, key)
    }

    pub fn host(&self) -> &str {
        &self.config.endpoint
    }

    /// `upload(source, file_name, tender_id) -> canonical_url | None`.
    pub async fn upload(
        &self,
        source: UploadSource<'_>,
        file_name: &str,
        tender_id: &str,
    ) -> Option<String> {
        let key = self.key(tender_id, file_name);

        let bytes = match source {
            UploadSource::Bytes(b) => b,
            UploadSource::Url(url) => match self.fetcher.get(url, Duration::from_secs(30)).await {
                Ok(b) => b,
                Err(e) => {
                    error!("Failed to download {} for upload: {}", url, e);
                    return None;
                }
            },
        };

        match self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .send()
            .await
        {
            Ok(_) => {
                let url = self.canonical_url(&key);
                info!("Uploaded {} for tender {} to {}", file_name, tender_id, url);
                Some(url)
            }
            Err(e) => {
                error!(
                    "Failed to upload {} for tender {}: {}",
                    file_name, tender_id, e
                );
                None
            }
        }
    }

    /// Fetch a previously uploaded blob back out by key.
    pub async fn fetch(&self, tender_id: &str, file_name: &str) -> anyhow::Result<Vec<u8>> {
        let key = self.key(tender_id, file_name);
        let output = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await?;
        let data = output.body.collect().await?;
        Ok(data.into_bytes().to_vec())
    }

    /// True if the given URL belongs to this store's configured host.
    pub fn owns_url(&self, url: &str) -> bool {
        url.starts_with(&self.config.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_matches_key_layout() {
        let config = ObjectStoreConfig {
            endpoint: "https://storage.example.net".to_string(),
            bucket: "tenders-bucket".to_string(),
            region: "ru-central1".to_string(),
            access_key: "test".to_string(),
            secret_key: "test".to_string(),
        };
        let client = ObjectStoreClient {
            client: futures_unused_client(),
            fetcher: HttpFetcher::new(),
            config,
        };
        assert_eq!(
            client.canonical_url(&client.key("IS1", "doc.pdf")),
            "https://storage.example.net/tenders-bucket/tenders/IS1/doc.pdf"
        );
    }

    fn futures_unused_client() -> S3Client {
        let conf = aws_sdk_s3::Config::builder()
            .region(aws_config::Region::new("ru-central1"))
            .behavior_version(aws_config::BehaviorVersion::latest())
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                "test", "test", None, None, "test",
            ))
            .build();
        S3Client::from_conf(conf)
    }
}
