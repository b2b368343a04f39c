//! Object store configuration.

use serde::{Deserialize, Serialize};

/// Top-level object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Which provider to use: `"local"` or `"s3"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Minimum multipart part size in bytes.
    ///
    /// Any chunk except the last below this size forces direct assembly,
    /// since the store rejects undersized parts in a multipart upload.
    #[serde(default = "default_min_part_size")]
    pub min_part_size_bytes: u64,
    /// Retrieval URL lifetime in days. Providers clamp to their own signing
    /// maximum where the configured value exceeds it.
    #[serde(default = "default_presign_expiry")]
    pub presign_expiry_days: u64,
    /// Local filesystem provider configuration.
    #[serde(default)]
    pub local: LocalStoreConfig,
    /// S3-compatible provider configuration.
    #[serde(default)]
    pub s3: S3StoreConfig,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            min_part_size_bytes: default_min_part_size(),
            presign_expiry_days: default_presign_expiry(),
            local: LocalStoreConfig::default(),
            s3: S3StoreConfig::default(),
        }
    }
}

/// Local filesystem object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    /// Root path for stored objects.
    #[serde(default = "default_local_root")]
    pub root_path: String,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
        }
    }
}

/// S3-compatible object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3StoreConfig {
    /// S3 endpoint URL (for non-AWS services like MinIO or R2).
    #[serde(default)]
    pub endpoint: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket holding chunks, manifests, and reassembled outputs.
    #[serde(default)]
    pub bucket: String,
    /// Access key ID (empty = ambient credential chain).
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_min_part_size() -> u64 {
    5_242_880 // 5 MiB
}

fn default_presign_expiry() -> u64 {
    14
}

fn default_local_root() -> String {
    "./data/objects".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}
