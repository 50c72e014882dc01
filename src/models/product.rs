use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A UPC barcode used as the key for lookups, cache entries and image storage.
///
/// Always non-empty and made only of ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupKey(String);

impl LookupKey {
    /// Validate `raw` exactly as given. Surrounding whitespace is not a digit.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(KeyError::NonDigit(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum KeyError {
    #[error("UPC must not be empty")]
    Empty,

    #[error("UPC must contain only digits, got {0:?}")]
    NonDigit(String),
}

/// Product data returned by the external lookup service. Consumed once per job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProductRecord {
    pub title: String,
    pub brand: String,
    pub description: String,
    pub image_urls: Vec<String>,
}

/// An image downloaded, validated and persisted under a key's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// 1-based position of the source URL in the lookup response.
    pub index: usize,
    pub path: PathBuf,
    pub url: String,
}

/// Where the data being formatted came from. Only fresh data goes through
/// the image pipeline and best-image selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Fresh,
    Cached,
}

/// The externally visible, cached product record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormattedResult {
    pub upc: String,
    pub title: String,
    pub brand: String,
    pub description: String,
    pub images: Vec<String>,
    pub best_image: Option<String>,
    pub cached: bool,
    pub fetched_at: DateTime<Utc>,
}
