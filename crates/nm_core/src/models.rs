use async_trait::async_trait;
use crate::types::SentimentResult;
use crate::Result;

#[async_trait]
pub trait TextClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Classify a piece of text into positive/neutral/negative
    async fn classify(&self, text: &str) -> Result<SentimentResult>;
}

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Classify the image behind `image_url`; the implementation downloads it
    async fn classify(&self, image_url: &str) -> Result<SentimentResult>;

    /// Classify an image the caller already holds, e.g. an upload
    async fn classify_bytes(&self, bytes: Vec<u8>, content_type: &str) -> Result<SentimentResult>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}
