use std::time::Duration;

use async_trait::async_trait;
use nm_core::{Error, RawArticle, Result};
use reqwest::Client;
use serde::Deserialize;

use super::utils;
use super::{NewsProvider, ProviderMetadata};

const NAME: &str = "currents";

#[derive(Debug, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    news: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    image: Option<String>,
    author: Option<String>,
    published: Option<String>,
    category: Option<Vec<String>>,
}

/// currentsapi.services latest news. Currents sends no body text, so the
/// description doubles as content.
pub struct CurrentsProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl CurrentsProvider {
    const BASE_URL: &'static str = "https://api.currentsapi.services/v1";

    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: utils::build_client(timeout)?,
            api_key,
            base_url: Self::BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn parse(response: Response) -> Result<Vec<RawArticle>> {
        if response.status != "ok" {
            return Err(Error::provider(NAME, format!("status {}", response.status)));
        }
        Ok(response
            .news
            .into_iter()
            .map(|item| {
                let description = utils::strip_html(item.description);
                RawArticle {
                    title: utils::clean(item.title).unwrap_or_default(),
                    content: description.clone(),
                    description,
                    url: utils::clean(item.url),
                    // "None" is how Currents spells a missing image
                    image_url: utils::clean(item.image).filter(|i| i != "None"),
                    source: "Currents".to_string(),
                    author: utils::clean(item.author),
                    published_at: utils::parse_published_at(item.published.as_deref()),
                    provider_category: Some(
                        item.category
                            .and_then(|c| c.into_iter().next())
                            .unwrap_or_else(|| "general".to_string()),
                    ),
                    provider: NAME.to_string(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl NewsProvider for CurrentsProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: NAME,
            emoji: "🌊",
        }
    }

    async fn fetch(&self, category: Option<&str>) -> Result<Vec<RawArticle>> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!("Currents API key not configured");
            return Ok(Vec::new());
        };

        let mut query = vec![("apiKey", api_key.clone()), ("language", "en".to_string())];
        utils::add_category(&mut query, category);

        let url = format!("{}/latest-news", self.base_url);
        let response: Response = utils::get_json(&self.client, NAME, &url, &query).await?;
        Self::parse(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_articles() {
        let response: Response = serde_json::from_str(
            r#"{
                "status": "ok",
                "news": [
                    {
                        "id": "abc",
                        "title": "New compiler release",
                        "description": "Faster builds for everyone",
                        "url": "https://example.com/compiler",
                        "author": "Dev Team",
                        "image": "None",
                        "language": "en",
                        "category": ["programming", "technology"],
                        "published": "2024-05-02 08:00:00 +0000"
                    },
                    {
                        "id": "def",
                        "title": "Plain story",
                        "description": "",
                        "url": "https://example.com/plain",
                        "author": "",
                        "image": "https://example.com/plain.jpg",
                        "category": [],
                        "published": "2024-05-02 10:00:00 +0200"
                    }
                ],
                "page": 1
            }"#,
        )
        .unwrap();

        let articles = CurrentsProvider::parse(response).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert!(first.image_url.is_none());
        assert_eq!(first.content.as_deref(), Some("Faster builds for everyone"));
        assert_eq!(first.source, "Currents");
        assert_eq!(first.provider_category.as_deref(), Some("programming"));
        assert_eq!(first.published_at, Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());

        let second = &articles[1];
        assert_eq!(second.image_url.as_deref(), Some("https://example.com/plain.jpg"));
        assert!(second.description.is_none());
        assert!(second.author.is_none());
        assert_eq!(second.provider_category.as_deref(), Some("general"));
        assert_eq!(second.published_at, first.published_at);
    }

    #[test]
    fn test_error_status() {
        let response: Response = serde_json::from_str(r#"{"status": "error", "news": []}"#).unwrap();
        assert!(CurrentsProvider::parse(response).is_err());
    }
}
