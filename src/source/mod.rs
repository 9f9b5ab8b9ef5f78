//! Image sources feeding the slideshow.
//!
//! A source produces the flat, already-normalized [`ImageRecord`] list once per
//! session. Failures never reach the engine: [`load`] folds them into an empty
//! list plus a display message.

pub mod cloudinary;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::CloudinaryOptions;
use crate::error::SourceError;

pub use cloudinary::CloudinaryClient;

/// Message shown by the presentation layer when the source failed.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch images";

/// One displayable image. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub format: String,
}

impl ImageRecord {
    /// Alt text for the record shown at `index`, falling back to a positional label.
    pub fn alt_or_label(&self, index: usize) -> String {
        if self.alt.is_empty() {
            format!("Photo {}", index + 1)
        } else {
            self.alt.clone()
        }
    }
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the ordered list of display-ready records.
    async fn list_images(&self) -> Result<Vec<ImageRecord>, SourceError>;
}

/// Result of the one-shot fetch at startup.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub images: Vec<ImageRecord>,
    pub error: Option<String>,
}

impl FetchOutcome {
    /// Empty list carrying the terminal display message.
    pub fn failed() -> Self {
        Self {
            images: Vec::new(),
            error: Some(FETCH_FAILED_MESSAGE.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Fetch once from `source`. Errors become an empty list and a terminal message.
pub async fn load(source: &dyn ImageSource) -> FetchOutcome {
    match source.list_images().await {
        Ok(images) => {
            info!(source = source.name(), count = images.len(), "fetched images");
            FetchOutcome {
                images,
                error: None,
            }
        }
        Err(err) => {
            error!(source = source.name(), error = %err, "error fetching images");
            FetchOutcome::failed()
        }
    }
}

/// Build the Cloudinary client and fetch once. An unusable configuration is a
/// fetch failure like any other; the client is returned only when it was built.
pub async fn load_cloudinary(options: CloudinaryOptions) -> (FetchOutcome, Option<CloudinaryClient>) {
    match CloudinaryClient::new(options) {
        Ok(client) => (load(&client).await, Some(client)),
        Err(err) => {
            error!(source = "cloudinary", error = %err, "error fetching images");
            (FetchOutcome::failed(), None)
        }
    }
}

/// Fixed in-memory list; used by tests and for local previews.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    images: Vec<ImageRecord>,
}

impl StaticSource {
    pub fn new(images: Vec<ImageRecord>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl ImageSource for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn list_images(&self) -> Result<Vec<ImageRecord>, SourceError> {
        Ok(self.images.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait]
    impl ImageSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn list_images(&self) -> Result<Vec<ImageRecord>, SourceError> {
            Err(SourceError::Status {
                status: 500,
                body: "boom".into(),
            })
        }
    }

    fn record(id: &str) -> ImageRecord {
        ImageRecord {
            id: id.into(),
            url: format!("https://img.test/{id}.webp"),
            width: 800,
            height: 600,
            caption: String::new(),
            alt: String::new(),
            format: "jpg".into(),
        }
    }

    #[tokio::test]
    async fn failure_becomes_empty_list_with_message() {
        let outcome = load(&FailingSource).await;
        assert!(outcome.is_empty());
        assert_eq!(outcome.error.as_deref(), Some(FETCH_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn missing_credentials_fold_into_failure() {
        let (outcome, client) = load_cloudinary(CloudinaryOptions::default()).await;
        assert!(client.is_none());
        assert!(outcome.is_empty());
        assert_eq!(outcome.error.as_deref(), Some(FETCH_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn static_source_preserves_order() {
        let outcome = load(&StaticSource::new(vec![record("b"), record("a")])).await;
        assert!(outcome.error.is_none());
        let ids: Vec<_> = outcome.images.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn alt_falls_back_to_position() {
        let mut r = record("x");
        assert_eq!(r.alt_or_label(2), "Photo 3");
        r.alt = "Harbor at dusk".into();
        assert_eq!(r.alt_or_label(2), "Harbor at dusk");
    }
}
