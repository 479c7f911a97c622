use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Storage class tag as reported by the object lister.
///
/// Unrecognised tags are preserved verbatim in `Other` so that pricing can
/// fall back to the STANDARD rate without losing the original name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageClass {
    Standard,
    IntelligentTiering,
    StandardIa,
    OnezoneIa,
    GlacierIr,
    Glacier,
    DeepArchive,
    Other(String),
}

impl StorageClass {
    /// Parse a storage class tag. An empty tag means STANDARD.
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "" | "STANDARD" => StorageClass::Standard,
            "INTELLIGENT_TIERING" => StorageClass::IntelligentTiering,
            "STANDARD_IA" => StorageClass::StandardIa,
            "ONEZONE_IA" => StorageClass::OnezoneIa,
            "GLACIER_IR" => StorageClass::GlacierIr,
            "GLACIER" => StorageClass::Glacier,
            "DEEP_ARCHIVE" => StorageClass::DeepArchive,
            other => StorageClass::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::GlacierIr => "GLACIER_IR",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
            StorageClass::Other(name) => name,
        }
    }
}

impl Default for StorageClass {
    fn default() -> Self {
        StorageClass::Standard
    }
}

impl From<String> for StorageClass {
    fn from(tag: String) -> Self {
        StorageClass::parse(&tag)
    }
}

impl From<StorageClass> for String {
    fn from(class: StorageClass) -> Self {
        class.as_str().to_string()
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub id: Uuid,
    pub name: String,
    /// Set when the last inventory pass could not list this bucket.
    pub listing_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot of one object as seen by the lister.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageObject {
    pub key: String,
    pub size: u64,
    pub storage_class: StorageClass,
    pub last_modified: DateTime<Utc>,
}

/// An in-progress multipart upload. Part sizes are fetched separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub id: Uuid,
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
}

/// One line of an object inventory snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    #[serde(default)]
    pub storage_class: Option<String>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_number: i32,
    pub size: u64,
}

/// One line of a multipart upload inventory snapshot.
///
/// `parts_error` carries the reason the parts listing failed, in which case
/// the upload's size is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
    #[serde(default)]
    pub parts: Vec<PartRecord>,
    #[serde(default)]
    pub parts_error: Option<String>,
}
