use chrono::Utc;
use std::sync::Arc;

use crate::models::product::{DataSource, FormattedResult, LookupKey, RawProductRecord};
use crate::services::images::{ImageSource, ImageStore};
use crate::services::lookup::{LookupError, ProductLookup};
use crate::services::selector::BestImageSelector;

/// Why a job ended without a result.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),
}

/// The work behind one job: lookup, images, best-image selection, formatting.
pub struct ProductPipeline {
    lookup: Arc<dyn ProductLookup>,
    image_source: Arc<dyn ImageSource>,
    images: ImageStore,
    selector: BestImageSelector,
}

impl ProductPipeline {
    pub fn new(
        lookup: Arc<dyn ProductLookup>,
        image_source: Arc<dyn ImageSource>,
        images: ImageStore,
        selector: BestImageSelector,
    ) -> Self {
        Self {
            lookup,
            image_source,
            images,
            selector,
        }
    }

    /// Look up `key` and build its result from fresh data.
    ///
    /// Only the lookup can fail; image and selector problems leave a result
    /// with fewer images or no best image.
    pub async fn run(&self, key: &LookupKey) -> Result<FormattedResult, JobError> {
        let record = self.lookup.lookup(key).await?;
        Ok(self.format(key, record, DataSource::Fresh).await)
    }

    pub async fn format(
        &self,
        key: &LookupKey,
        record: RawProductRecord,
        source: DataSource,
    ) -> FormattedResult {
        let mut images = record.image_urls;
        let mut best_image = None;

        if source == DataSource::Fresh && !images.is_empty() {
            let stored = self
                .images
                .fetch_and_store(self.image_source.as_ref(), key, &images)
                .await;

            if !stored.is_empty() {
                images = stored.iter().map(|s| s.url.clone()).collect();
                best_image = self
                    .selector
                    .select_best(
                        &stored,
                        Some(record.title.as_str()),
                        Some(record.brand.as_str()),
                    )
                    .await
                    .map(|best| best.url);
            }
        }

        FormattedResult {
            upc: key.to_string(),
            title: record.title,
            brand: record.brand,
            description: record.description,
            images,
            best_image,
            cached: source == DataSource::Cached,
            fetched_at: Utc::now(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::services::images::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Lookup with canned results per key, an optional gate that holds every
    /// call until released, and a call counter.
    pub struct FakeLookup {
        pub records: HashMap<String, RawProductRecord>,
        pub gate: Option<Arc<Semaphore>>,
        pub calls: AtomicUsize,
    }

    impl FakeLookup {
        pub fn with(records: Vec<(&str, RawProductRecord)>) -> Self {
            Self {
                records: records
                    .into_iter()
                    .map(|(k, r)| (k.to_string(), r))
                    .collect(),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProductLookup for FakeLookup {
        async fn lookup(&self, key: &LookupKey) -> Result<RawProductRecord, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await;
            }
            match self.records.get(key.as_str()) {
                Some(record) => Ok(record.clone()),
                None => Err(LookupError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)),
            }
        }
    }

    /// Image source that never succeeds, counting attempts.
    #[derive(Default)]
    pub struct NoImages {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageSource for NoImages {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status(reqwest::StatusCode::NOT_FOUND))
        }
    }

    pub fn record(title: &str, urls: &[&str]) -> RawProductRecord {
        RawProductRecord {
            title: title.to_string(),
            brand: "Acme".to_string(),
            description: format!("{title} description"),
            image_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}
