//! Best-image selection.
//!
//! Every failure here degrades to "no best image" and is logged; nothing in
//! this module can fail the surrounding job.

use std::sync::Arc;
use tokio::fs;

use crate::models::product::StoredImage;
use crate::services::gemini::{ImageRanker, RankImage};

/// How a ranking model answer was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// The model found no acceptable match (`0`).
    NoMatch,
    /// 0-based position into the images that were sent.
    Image(usize),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ChoiceError {
    #[error("Model response is not an integer: {0:?}")]
    NotANumber(String),

    #[error("Model picked image {choice} but only {available} were supplied")]
    OutOfRange { choice: i64, available: usize },
}

/// Interpret a ranking model response against `available` images.
pub fn parse_choice(response: &str, available: usize) -> Result<Choice, ChoiceError> {
    let trimmed = response.trim();
    let choice: i64 = trimmed
        .parse()
        .map_err(|_| ChoiceError::NotANumber(trimmed.to_string()))?;

    if choice == 0 {
        return Ok(Choice::NoMatch);
    }
    if choice < 0 || choice as u64 > available as u64 {
        return Err(ChoiceError::OutOfRange { choice, available });
    }
    Ok(Choice::Image(choice as usize - 1))
}

/// Prompt asking for a single digit: 0 for no match, N for the N-th image.
pub fn build_prompt(title: Option<&str>, brand: Option<&str>) -> String {
    let mut prompt = String::from(concat!(
        "Analyze the following product images. Determine which one is the best ",
        "candidate for an e-commerce main product photo. The title and brand accuracy ",
        "are more important than lighting or framing. Only select an image if it clearly ",
        "depicts the exact product title and matches the specified brand. ",
    ));
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!(
            "The product title is '{title}'. Treat this title as the primary matching criteria. "
        ));
    }
    if let Some(brand) = brand.filter(|b| !b.trim().is_empty()) {
        prompt.push_str(&format!(
            "The brand is '{brand}'. Only choose an image that clearly matches this brand. "
        ));
    }
    prompt.push_str(concat!(
        "If no image fully matches the title and brand, respond with 0 (zero). ",
        "Otherwise respond with ONLY the single digit number representing the index of ",
        "the best image (1 for the first image, 2 for the second, etc)."
    ));
    prompt
}

/// Picks the most representative stored image using an optional ranking model.
#[derive(Clone)]
pub struct BestImageSelector {
    ranker: Option<Arc<dyn ImageRanker>>,
}

impl BestImageSelector {
    pub fn new(ranker: Option<Arc<dyn ImageRanker>>) -> Self {
        Self { ranker }
    }

    pub fn disabled() -> Self {
        Self { ranker: None }
    }

    pub async fn select_best(
        &self,
        images: &[StoredImage],
        title: Option<&str>,
        brand: Option<&str>,
    ) -> Option<StoredImage> {
        let ranker = self.ranker.as_ref()?;
        if images.is_empty() {
            return None;
        }

        // Images that can't be read back are left out; the model's answer
        // indexes into `sent`.
        let mut sent = Vec::with_capacity(images.len());
        let mut payload = Vec::with_capacity(images.len());
        for image in images {
            match fs::read(&image.path).await {
                Ok(bytes) => {
                    let mime_type = image::guess_format(&bytes)
                        .map(|f| f.to_mime_type())
                        .unwrap_or("image/jpeg")
                        .to_string();
                    payload.push(RankImage { bytes, mime_type });
                    sent.push(image);
                }
                Err(e) => {
                    tracing::warn!(path = %image.path.display(), error = %e, "Could not open image for ranking");
                }
            }
        }
        if sent.is_empty() {
            return None;
        }

        tracing::info!(count = sent.len(), "Ranking images");
        let prompt = build_prompt(title, brand);
        let response = match ranker.rank(&prompt, &payload).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(stage = "selector", error = %e, "Image ranking request failed");
                return None;
            }
        };
        tracing::debug!(response = %response.trim(), "Raw ranking response");

        match parse_choice(&response, sent.len()) {
            Ok(Choice::Image(i)) => {
                let best = sent[i].clone();
                tracing::info!(choice = i + 1, url = %best.url, "Selected best image");
                Some(best)
            }
            Ok(Choice::NoMatch) => {
                tracing::info!("No image matches the title and brand");
                None
            }
            Err(e) => {
                tracing::warn!(stage = "selector", error = %e, "Discarding ranking response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gemini::RankingError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct ScriptedRanker {
        reply: Result<String, ()>,
        seen_images: Mutex<usize>,
    }

    impl ScriptedRanker {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen_images: Mutex::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen_images: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageRanker for ScriptedRanker {
        async fn rank(&self, _prompt: &str, images: &[RankImage]) -> Result<String, RankingError> {
            *self.seen_images.lock().unwrap() = images.len();
            self.reply.clone().map_err(|_| RankingError::EmptyResponse)
        }
    }

    fn write_images(dir: &std::path::Path, n: usize) -> Vec<StoredImage> {
        (1..=n)
            .map(|i| {
                let path = dir.join(format!("123_{i}.jpg"));
                std::fs::write(&path, format!("image {i}")).unwrap();
                StoredImage {
                    index: i,
                    path,
                    url: format!("http://localhost:5000/static/upc_images/123/123_{i}.jpg"),
                }
            })
            .collect()
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("0", 3), Ok(Choice::NoMatch));
        assert_eq!(parse_choice(" 3\n", 3), Ok(Choice::Image(2)));
        assert_eq!(parse_choice("1", 1), Ok(Choice::Image(0)));
        assert!(matches!(parse_choice("5", 3), Err(ChoiceError::OutOfRange { .. })));
        assert!(matches!(parse_choice("-1", 3), Err(ChoiceError::OutOfRange { .. })));
        assert!(matches!(parse_choice("banana", 3), Err(ChoiceError::NotANumber(_))));
        assert!(matches!(parse_choice("", 3), Err(ChoiceError::NotANumber(_))));
    }

    #[test]
    fn test_prompt_mentions_title_and_brand() {
        let prompt = build_prompt(Some("Cola 2L"), Some("Fizzco"));
        assert!(prompt.contains("The product title is 'Cola 2L'"));
        assert!(prompt.contains("The brand is 'Fizzco'"));
        assert!(prompt.contains("respond with 0 (zero)"));

        let bare = build_prompt(None, Some(""));
        assert!(!bare.contains("product title is"));
        assert!(!bare.contains("The brand is"));
    }

    #[tokio::test]
    async fn test_select_best_follows_model_answer() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 3);

        let selector = BestImageSelector::new(Some(ScriptedRanker::replying("3")));
        let best = selector.select_best(&images, Some("Cola"), Some("Fizzco")).await;
        assert_eq!(best.map(|b| b.index), Some(3));

        let selector = BestImageSelector::new(Some(ScriptedRanker::replying("0")));
        assert!(selector.select_best(&images, None, None).await.is_none());

        let selector = BestImageSelector::new(Some(ScriptedRanker::replying("5")));
        assert!(selector.select_best(&images, None, None).await.is_none());

        let selector = BestImageSelector::new(Some(ScriptedRanker::replying("banana")));
        assert!(selector.select_best(&images, None, None).await.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 2);
        let selector = BestImageSelector::new(Some(ScriptedRanker::failing()));
        assert!(selector.select_best(&images, None, None).await.is_none());
    }

    #[tokio::test]
    async fn test_no_ranker_or_no_images_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 2);
        assert!(BestImageSelector::disabled().select_best(&images, None, None).await.is_none());

        let ranker = ScriptedRanker::replying("1");
        let selector = BestImageSelector::new(Some(ranker.clone()));
        assert!(selector.select_best(&[], None, None).await.is_none());
        assert_eq!(*ranker.seen_images.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_images_are_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = write_images(dir.path(), 2);
        images.insert(
            0,
            StoredImage {
                index: 1,
                path: PathBuf::from("/nonexistent/123_0.jpg"),
                url: "http://localhost:5000/missing.jpg".to_string(),
            },
        );

        let ranker = ScriptedRanker::replying("1");
        let selector = BestImageSelector::new(Some(ranker.clone()));
        let best = selector.select_best(&images, None, None).await.unwrap();

        assert_eq!(*ranker.seen_images.lock().unwrap(), 2);
        assert_eq!(best.path, dir.path().join("123_1.jpg"));
    }
}
