use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nm_core::{ImageClassifier, Result, SentimentResult, TextClassifier};

pub mod lexicon;
pub mod remote;

pub use lexicon::LexiconClassifier;
pub use remote::{RemoteImageClassifier, RemoteTextClassifier};

/// Image classifier for deployments without an image model.
#[derive(Debug, Default)]
pub struct NoImageClassifier;

#[async_trait]
impl ImageClassifier for NoImageClassifier {
    fn name(&self) -> &str {
        "none"
    }

    async fn classify(&self, _image_url: &str) -> Result<SentimentResult> {
        Ok(SentimentResult::sentinel())
    }

    async fn classify_bytes(&self, _bytes: Vec<u8>, _content_type: &str) -> Result<SentimentResult> {
        Ok(SentimentResult::sentinel())
    }
}

pub fn create_text_classifier(endpoint: Option<&str>, timeout: Duration) -> Result<Arc<dyn TextClassifier>> {
    match endpoint {
        Some(url) => {
            tracing::info!("Using remote text classifier at {}", url);
            Ok(Arc::new(RemoteTextClassifier::new(url, timeout)?))
        }
        None => {
            tracing::info!("No TEXT_MODEL_URL set, using the lexicon classifier");
            Ok(Arc::new(LexiconClassifier::new()))
        }
    }
}

pub fn create_image_classifier(endpoint: Option<&str>, timeout: Duration) -> Result<Arc<dyn ImageClassifier>> {
    match endpoint {
        Some(url) => {
            tracing::info!("Using remote image classifier at {}", url);
            Ok(Arc::new(RemoteImageClassifier::new(url, timeout)?))
        }
        None => {
            tracing::info!("No IMAGE_MODEL_URL set, images will not be classified");
            Ok(Arc::new(NoImageClassifier))
        }
    }
}
