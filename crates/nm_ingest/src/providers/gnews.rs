use std::time::Duration;

use async_trait::async_trait;
use nm_core::{RawArticle, Result};
use reqwest::Client;
use serde::Deserialize;

use super::utils;
use super::{NewsProvider, ProviderMetadata};

const NAME: &str = "gnews";

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    articles: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    image: Option<String>,
    published_at: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    name: Option<String>,
}

/// gnews.io top headlines. GNews reports no author.
pub struct GNewsProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GNewsProvider {
    const BASE_URL: &'static str = "https://gnews.io/api/v4";

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

    fn parse(response: Response, category: Option<&str>) -> Vec<RawArticle> {
        let category = category.unwrap_or("general");
        response
            .articles
            .into_iter()
            .map(|item| RawArticle {
                title: utils::clean(item.title).unwrap_or_default(),
                description: utils::strip_html(item.description),
                content: utils::clean(item.content),
                url: utils::clean(item.url),
                image_url: utils::clean(item.image),
                source: item
                    .source
                    .and_then(|s| utils::clean(s.name))
                    .unwrap_or_else(|| "GNews".to_string()),
                author: None,
                published_at: utils::parse_published_at(item.published_at.as_deref()),
                provider_category: Some(category.to_string()),
                provider: NAME.to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl NewsProvider for GNewsProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: NAME,
            emoji: "🌐",
        }
    }

    async fn fetch(&self, category: Option<&str>) -> Result<Vec<RawArticle>> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!("GNews key not configured");
            return Ok(Vec::new());
        };

        let mut query = vec![
            ("apikey", api_key.clone()),
            ("lang", "en".to_string()),
            ("max", "10".to_string()),
        ];
        utils::add_category(&mut query, category);

        let url = format!("{}/top-headlines", self.base_url);
        let response: Response = utils::get_json(&self.client, NAME, &url, &query).await?;
        Ok(Self::parse(response, category))
    }
}
