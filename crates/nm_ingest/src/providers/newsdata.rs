use std::time::Duration;

use async_trait::async_trait;
use nm_core::{Error, RawArticle, Result};
use reqwest::Client;
use serde::Deserialize;

use super::utils;
use super::{NewsProvider, ProviderMetadata};

const NAME: &str = "newsdata";

#[derive(Debug, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    results: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    link: Option<String>,
    image_url: Option<String>,
    source_id: Option<String>,
    creator: Option<Vec<String>>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    category: Option<Vec<String>>,
}

/// newsdata.io latest news
pub struct NewsDataProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl NewsDataProvider {
    const BASE_URL: &'static str = "https://newsdata.io/api/1";

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
        if response.status != "success" {
            return Err(Error::provider(NAME, format!("status {}", response.status)));
        }
        Ok(response
            .results
            .into_iter()
            .map(|item| RawArticle {
                title: utils::clean(item.title).unwrap_or_default(),
                description: utils::strip_html(item.description),
                content: utils::clean(item.content),
                url: utils::clean(item.link),
                image_url: utils::clean(item.image_url),
                source: utils::clean(item.source_id).unwrap_or_else(|| "NewsData".to_string()),
                author: item.creator.and_then(|c| c.into_iter().next()),
                published_at: utils::parse_published_at(item.pub_date.as_deref()),
                provider_category: item
                    .category
                    .and_then(|c| c.into_iter().next())
                    .or_else(|| Some("general".to_string())),
                provider: NAME.to_string(),
            })
            .collect())
    }
}

#[async_trait]
impl NewsProvider for NewsDataProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: NAME,
            emoji: "🗞️",
        }
    }

    async fn fetch(&self, category: Option<&str>) -> Result<Vec<RawArticle>> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!("NewsData key not configured");
            return Ok(Vec::new());
        };

        let mut query = vec![
            ("apikey", api_key.clone()),
            ("language", "en".to_string()),
            ("size", "10".to_string()),
        ];
        utils::add_category(&mut query, category);

        let url = format!("{}/news", self.base_url);
        let response: Response = utils::get_json(&self.client, NAME, &url, &query).await?;
        Self::parse(response)
    }
}
