use crate::error::{Error, Result};
use crate::workspace::Artifact;

use std::fs;
use std::path::Path;

use s3::creds::Credentials;
use s3::{Bucket, Region};
use serde::Serialize;

/// Largest object S3-compatible stores accept in one PUT.
pub const MAX_SINGLE_PUT_BYTES: u64 = 5 * 1024 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublishedLocation {
    pub object_key: String,
    pub public_url: String,
}

/// Storage settings as read from the environment; any of them may be absent
/// until [`StorageSettings::validate`] is called.
#[derive(Clone, Debug, Default)]
pub struct StorageSettings {
    pub account_id: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub public_base_url: Option<String>,
    pub key_prefix: String,
    pub max_object_bytes: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub endpoint: String,
    pub public_base_url: String,
    pub key_prefix: String,
    /// Outputs above this size are refused before being read into memory.
    pub max_object_bytes: u64,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

impl StorageSettings {
    pub fn validate(&self) -> Result<StorageConfig> {
        let required = [
            ("R2_ACCOUNT_ID", present(&self.account_id)),
            ("R2_ACCESS_KEY_ID", present(&self.access_key_id)),
            ("R2_SECRET_ACCESS_KEY", present(&self.secret_access_key)),
            ("R2_BUCKET_NAME", present(&self.bucket)),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(Error::EnvironmentConfig(missing.join(", ")));
        }

        let [account_id, access_key_id, secret_access_key, bucket] = required.map(|(_, value)| value.unwrap_or_default());
        let endpoint = present(&self.endpoint)
            .unwrap_or_else(|| format!("https://{}.r2.cloudflarestorage.com", account_id));
        let public_base_url = present(&self.public_base_url)
            .unwrap_or_else(|| format!("{}/{}", endpoint, bucket));

        Ok(StorageConfig {
            account_id,
            access_key_id,
            secret_access_key,
            bucket,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            key_prefix: self.key_prefix.clone(),
            max_object_bytes: self.max_object_bytes.unwrap_or(MAX_SINGLE_PUT_BYTES).min(MAX_SINGLE_PUT_BYTES),
        })
    }
}

impl StorageConfig {
    pub fn public_url(&self, object_key: &str) -> String {
        format!("{}/{}", self.public_base_url, object_key.trim_start_matches('/'))
    }
}

/// A remote object store accepting whole-object uploads.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// S3-compatible store (Cloudflare R2 by default).
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(config.access_key_id.as_str()),
            Some(config.secret_access_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| Error::EnvironmentConfig(format!("invalid storage credentials: {}", e)))?;
        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| Error::EnvironmentConfig(format!("invalid bucket configuration: {}", e)))?
            .with_path_style();
        Ok(Self { bucket })
    }
}

impl ObjectStore for S3Store {
    fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &body, content_type)
            .map_err(|e| Error::Publish(e.to_string()))?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            let body = String::from_utf8_lossy(response.as_slice());
            return Err(Error::Publish(format!(
                "storage returned HTTP {}: {}",
                status,
                crate::error::excerpt(&body, crate::error::MAX_DIAGNOSTIC_CHARS)
            )));
        }
        Ok(())
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        _ => "video/mp4",
    }
}

pub struct Publisher {
    config: StorageConfig,
    store: Box<dyn ObjectStore>,
}

impl Publisher {
    pub fn new(config: StorageConfig, store: Box<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    pub fn from_settings(settings: &StorageSettings) -> Result<Self> {
        let config = settings.validate()?;
        let store = S3Store::new(&config)?;
        Ok(Self::new(config, Box::new(store)))
    }

    pub fn object_key(&self, job_id: &str, file_name: &str) -> String {
        format!("{}{}/{}", self.config.key_prefix, job_id, file_name)
    }

    pub fn publish(&self, artifact: &Artifact, object_key: &str) -> Result<PublishedLocation> {
        let size = fs::metadata(&artifact.local_path)
            .map_err(|e| Error::Publish(format!("cannot read {}: {}", artifact.local_path.display(), e)))?
            .len();
        if size > self.config.max_object_bytes {
            return Err(Error::Publish(format!(
                "{} is {} bytes, above the {} byte upload limit",
                artifact.file_name(),
                size,
                self.config.max_object_bytes
            )));
        }
        let body = fs::read(&artifact.local_path)
            .map_err(|e| Error::Publish(format!("cannot read {}: {}", artifact.local_path.display(), e)))?;
        let content_type = content_type_for(&artifact.local_path);

        tracing::info!(key = object_key, bytes = body.len(), content_type, "uploading output");
        self.store.put(object_key, body, content_type)?;

        Ok(PublishedLocation {
            object_key: object_key.to_string(),
            public_url: self.config.public_url(object_key),
        })
    }
}
