use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nm_core::{AppConfig, Error, RawArticle, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;

pub mod currents;
pub mod gnews;
pub mod newsapi;
pub mod newsdata;

pub use currents::CurrentsProvider;
pub use gnews::GNewsProvider;
pub use newsapi::NewsApiProvider;
pub use newsdata::NewsDataProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub name: &'static str,
    pub emoji: &'static str,
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    fn metadata(&self) -> ProviderMetadata;

    /// Fetch one page of articles. A provider without an API key returns an
    /// empty list; transport and decoding failures are errors.
    async fn fetch(&self, category: Option<&str>) -> Result<Vec<RawArticle>>;
}

/// One provider per configured API, in a fixed order.
pub fn default_providers(config: &AppConfig) -> Result<Vec<Arc<dyn NewsProvider>>> {
    let keys = &config.providers;
    let timeout = config.http_timeout;
    Ok(vec![
        Arc::new(NewsApiProvider::new(keys.newsapi.clone(), timeout)?),
        Arc::new(NewsDataProvider::new(keys.newsdata.clone(), timeout)?),
        Arc::new(GNewsProvider::new(keys.gnews.clone(), timeout)?),
        Arc::new(CurrentsProvider::new(keys.currents.clone(), timeout)?),
    ])
}

/// Common utilities for providers
pub(crate) mod utils {
    use super::*;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use scraper::Html;

    pub fn build_client(timeout: Duration) -> Result<Client> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    pub async fn get_json<T: DeserializeOwned>(
        client: &Client,
        provider: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::provider(provider, e))?
            .error_for_status()
            .map_err(|e| Error::provider(provider, e))?;
        response.json::<T>().await.map_err(|e| Error::provider(provider, e))
    }

    /// Provider timestamps come in several shapes; anything unreadable
    /// becomes "now".
    pub fn parse_published_at(value: Option<&str>) -> DateTime<Utc> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Utc::now();
        };
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return parsed.with_timezone(&Utc);
        }
        if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z") {
            return parsed.with_timezone(&Utc);
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return naive.and_utc();
            }
        }
        Utc::now()
    }

    /// Reduces HTML fragments to whitespace-normalized text. Blank input is `None`.
    pub fn strip_html(value: Option<String>) -> Option<String> {
        let value = value?;
        let text = if value.contains('<') {
            Html::parse_fragment(&value).root_element().text().collect::<Vec<_>>().join(" ")
        } else {
            value
        };
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!text.is_empty()).then_some(text)
    }

    pub fn clean(value: Option<String>) -> Option<String> {
        value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    pub fn add_category(query: &mut Vec<(&str, String)>, category: Option<&str>) {
        if let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) {
            query.push(("category", category.to_lowercase()));
        }
    }
}
