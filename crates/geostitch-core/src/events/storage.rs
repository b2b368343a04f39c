//! Object-created storage event notifications.
//!
//! Matches the S3-style notification document delivered when an object
//! lands in the bucket. Object keys arrive URL-encoded with spaces as `+`.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// A storage event notification, carrying one or more records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEventNotification {
    /// The event records.
    #[serde(rename = "Records")]
    pub records: Vec<StorageEventRecord>,
}

/// A single object event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEventRecord {
    /// Originating service, `"aws:s3"` for object stores.
    #[serde(rename = "eventSource", default)]
    pub event_source: String,
    /// Event name, e.g. `"ObjectCreated:Put"`.
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    /// The bucket/object detail.
    pub s3: StorageEventEntity,
}

/// Bucket and object references within an event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEventEntity {
    /// Bucket reference.
    pub bucket: BucketRef,
    /// Object reference.
    pub object: ObjectRef,
}

/// Bucket name reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRef {
    /// The bucket name.
    pub name: String,
}

/// Object key reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    /// URL-encoded object key.
    pub key: String,
    /// Object size in bytes, when reported.
    #[serde(default)]
    pub size: Option<u64>,
}

impl StorageEventRecord {
    /// Whether this record reports an object-created event.
    pub fn is_object_created(&self) -> bool {
        self.event_name.starts_with("ObjectCreated")
    }

    /// The object key with URL encoding reversed (`+` as space, then
    /// percent-decoding).
    pub fn decoded_key(&self) -> String {
        let plus_as_space = self.s3.object.key.replace('+', " ");
        percent_decode_str(&plus_as_space)
            .decode_utf8_lossy()
            .into_owned()
    }
}
