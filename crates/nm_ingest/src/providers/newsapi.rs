use std::time::Duration;

use async_trait::async_trait;
use nm_core::{Error, RawArticle, Result};
use reqwest::Client;
use serde::Deserialize;

use super::utils;
use super::{NewsProvider, ProviderMetadata};

const NAME: &str = "newsapi";

#[derive(Debug, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    articles: Vec<Item>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    author: Option<String>,
    published_at: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    name: Option<String>,
}

/// newsapi.org top headlines
pub struct NewsApiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl NewsApiProvider {
    const BASE_URL: &'static str = "https://newsapi.org/v2";

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

    fn parse(response: Response, category: Option<&str>) -> Result<Vec<RawArticle>> {
        if response.status != "ok" {
            return Err(Error::provider(
                NAME,
                response.message.unwrap_or_else(|| format!("status {}", response.status)),
            ));
        }
        let category = category.unwrap_or("general");
        Ok(response
            .articles
            .into_iter()
            .map(|item| RawArticle {
                title: utils::clean(item.title).unwrap_or_default(),
                description: utils::strip_html(item.description),
                content: utils::clean(item.content),
                url: utils::clean(item.url),
                image_url: utils::clean(item.url_to_image),
                source: item
                    .source
                    .and_then(|s| utils::clean(s.name))
                    .unwrap_or_else(|| "NewsAPI".to_string()),
                author: utils::clean(item.author),
                published_at: utils::parse_published_at(item.published_at.as_deref()),
                provider_category: Some(category.to_string()),
                provider: NAME.to_string(),
            })
            .collect())
    }
}

#[async_trait]
impl NewsProvider for NewsApiProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: NAME,
            emoji: "📰",
        }
    }

    async fn fetch(&self, category: Option<&str>) -> Result<Vec<RawArticle>> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!("NewsAPI key not configured");
            return Ok(Vec::new());
        };

        let mut query = vec![
            ("apiKey", api_key.clone()),
            ("country", "us".to_string()),
            ("pageSize", "20".to_string()),
        ];
        utils::add_category(&mut query, category);

        let url = format!("{}/top-headlines", self.base_url);
        let response: Response = utils::get_json(&self.client, NAME, &url, &query).await?;
        Self::parse(response, category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const FIXTURE: &str = r#"{
        "status": "ok",
        "totalResults": 2,
        "articles": [
            {
                "source": {"id": "reuters", "name": "Reuters"},
                "author": "Jane Doe",
                "title": "Chip maker beats estimates",
                "description": "<p>Shares <em>jump</em> after earnings</p>",
                "url": "https://example.com/chips",
                "urlToImage": "https://example.com/chips.jpg",
                "publishedAt": "2024-05-02T08:00:00Z",
                "content": "Full text"
            },
            {
                "source": {"id": null, "name": null},
                "author": null,
                "title": "No link here",
                "description": null,
                "url": null,
                "urlToImage": null,
                "publishedAt": null,
                "content": null
            }
        ]
    }"#;

    #[test]
    fn test_parse_articles() {
        let response: Response = serde_json::from_str(FIXTURE).unwrap();
        let articles = NewsApiProvider::parse(response, Some("technology")).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title, "Chip maker beats estimates");
        assert_eq!(first.description.as_deref(), Some("Shares jump after earnings"));
        assert_eq!(first.url.as_deref(), Some("https://example.com/chips"));
        assert_eq!(first.image_url.as_deref(), Some("https://example.com/chips.jpg"));
        assert_eq!(first.source, "Reuters");
        assert_eq!(first.author.as_deref(), Some("Jane Doe"));
        assert_eq!(first.published_at, Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());
        assert_eq!(first.provider_category.as_deref(), Some("technology"));

        let second = &articles[1];
        assert!(second.url.is_none());
        assert_eq!(second.source, "NewsAPI");
    }

    #[test]
    fn test_category_defaults_to_general() {
        let response: Response = serde_json::from_str(FIXTURE).unwrap();
        let articles = NewsApiProvider::parse(response, None).unwrap();
        assert_eq!(articles[0].provider_category.as_deref(), Some("general"));
    }

    #[test]
    fn test_error_status() {
        let response: Response =
            serde_json::from_str(r#"{"status": "error", "code": "apiKeyInvalid", "message": "bad key"}"#).unwrap();
        let err = NewsApiProvider::parse(response, None).unwrap_err();
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let provider = NewsApiProvider::new(Some("key".to_string()), Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert!(matches!(
            provider.fetch(None).await,
            Err(Error::ProviderFetch { .. })
        ));
    }
}
