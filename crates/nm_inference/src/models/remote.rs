use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use nm_core::{Error, ImageClassifier, Result, SentimentLabel, SentimentResult, TextClassifier};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Largest image we are willing to download for classification.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    sentiment: String,
    confidence: f64,
}

impl PredictResponse {
    fn into_result(self) -> Result<SentimentResult> {
        let label: SentimentLabel = self.sentiment.parse()?;
        Ok(SentimentResult::new(label, self.confidence))
    }
}

/// `{base}/predict`, validated as an absolute URL.
fn predict_endpoint(base: &str) -> Result<String> {
    let endpoint = format!("{}/predict", base.trim_end_matches('/'));
    url::Url::parse(&endpoint)
        .map_err(|e| Error::Config(format!("Invalid model endpoint {:?}: {}", base, e)))?;
    Ok(endpoint)
}

fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Text sentiment served by an HTTP model.
pub struct RemoteTextClassifier {
    client: Client,
    endpoint: String,
}

impl RemoteTextClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: predict_endpoint(base_url)?,
        })
    }
}

impl fmt::Debug for RemoteTextClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTextClassifier")
            .field("client", &"<reqwest::Client>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl TextClassifier for RemoteTextClassifier {
    fn name(&self) -> &str {
        "remote-text"
    }

    async fn classify(&self, text: &str) -> Result<SentimentResult> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictRequest { text })
            .send()
            .await?
            .error_for_status()?
            .json::<PredictResponse>()
            .await?;
        response.into_result()
    }
}

/// Image sentiment served by an HTTP model. The image is downloaded here and
/// its bytes are posted to the model.
pub struct RemoteImageClassifier {
    client: Client,
    endpoint: String,
}

impl RemoteImageClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: predict_endpoint(base_url)?,
        })
    }

    async fn download(&self, image_url: &str) -> Result<(Vec<u8>, String)> {
        let mut response = self.client.get(image_url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(Error::Classifier(format!(
                "{} is not an image (content type {:?})",
                image_url, content_type
            )));
        }
        if response.content_length().map_or(false, |len| len > MAX_IMAGE_BYTES) {
            return Err(too_large(image_url));
        }

        // Content-Length may be absent; count the streamed bytes
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (bytes.len() + chunk.len()) as u64 > MAX_IMAGE_BYTES {
                return Err(too_large(image_url));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok((bytes, content_type))
    }
}

fn too_large(image_url: &str) -> Error {
    Error::Classifier(format!("{} exceeds the image size limit", image_url))
}

impl fmt::Debug for RemoteImageClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteImageClassifier")
            .field("client", &"<reqwest::Client>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl ImageClassifier for RemoteImageClassifier {
    fn name(&self) -> &str {
        "remote-image"
    }

    async fn classify(&self, image_url: &str) -> Result<SentimentResult> {
        let (bytes, content_type) = self.download(image_url).await?;
        self.classify_bytes(bytes, &content_type).await
    }

    async fn classify_bytes(&self, bytes: Vec<u8>, content_type: &str) -> Result<SentimentResult> {
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(Error::Classifier("Image exceeds the size limit".to_string()));
        }
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?
            .error_for_status()?
            .json::<PredictResponse>()
            .await?;
        response.into_result()
    }
}
