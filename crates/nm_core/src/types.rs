use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::Error;

/// Article as returned by a provider, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub provider_category: Option<String>,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedArticle {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub provider: String,
    pub category: Category,
}

impl NormalizedArticle {
    /// Returns `None` when the raw article carries no usable URL.
    pub fn from_raw(raw: RawArticle) -> Option<Self> {
        let url = canonical_url(raw.url.as_deref()?)?;
        Some(Self {
            category: Category::normalize(raw.provider_category.as_deref()),
            title: raw.title,
            description: raw.description,
            content: raw.content,
            url,
            image_url: raw.image_url.filter(|u| !u.trim().is_empty()),
            source: raw.source,
            author: raw.author,
            published_at: raw.published_at,
            provider: raw.provider,
        })
    }

    /// Text fed to the text classifier: title, then description if any.
    /// `None` when both are blank.
    pub fn classification_text(&self) -> Option<String> {
        let title = self.title.trim();
        let text = match self.description.as_deref().map(str::trim) {
            Some(desc) if !desc.is_empty() && !title.is_empty() => format!("{}. {}", title, desc),
            Some(desc) if !desc.is_empty() => desc.to_string(),
            _ => title.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Trims the URL and drops its fragment. Unparseable but non-empty URLs are
/// kept verbatim so they still act as an identity key.
pub fn canonical_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            Some(parsed.to_string())
        }
        Err(_) => Some(trimmed.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    pub fn signed_value(self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Neutral => 0.0,
            Self::Negative => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            other => Err(Error::Classifier(format!("Unknown sentiment label: {}", other))),
        }
    }
}

/// Output of one classifier, or of the fusion step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub confidence: f64,
}

pub type FusedSentiment = SentimentResult;

impl SentimentResult {
    pub fn new(label: SentimentLabel, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self { label, confidence }
    }

    /// Stands in for a missing image or a failed classifier.
    pub fn sentinel() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            confidence: 0.0,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.label == SentimentLabel::Neutral
    }
}

/// Insert payload for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub article: NormalizedArticle,
    pub sentiment: FusedSentiment,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub provider: String,
    pub category: Category,
    pub sentiment: SentimentLabel,
    pub sentiment_confidence: f64,
    pub fetched_at: DateTime<Utc>,
    pub view_count: i64,
    pub like_count: i64,
    pub save_count: i64,
}

impl StoredArticle {
    pub fn from_new(id: i64, new: &NewArticle) -> Self {
        let a = &new.article;
        Self {
            id,
            title: a.title.clone(),
            description: a.description.clone(),
            content: a.content.clone(),
            url: a.url.clone(),
            image_url: a.image_url.clone(),
            source: a.source.clone(),
            author: a.author.clone(),
            published_at: a.published_at,
            provider: a.provider.clone(),
            category: a.category,
            sentiment: new.sentiment.label,
            sentiment_confidence: new.sentiment.confidence,
            fetched_at: new.fetched_at,
            view_count: 0,
            like_count: 0,
            save_count: 0,
        }
    }

    pub fn counter(&self, counter: Counter) -> i64 {
        match counter {
            Counter::Views => self.view_count,
            Counter::Likes => self.like_count,
            Counter::Saves => self.save_count,
        }
    }

    pub fn counter_mut(&mut self, counter: Counter) -> &mut i64 {
        match counter {
            Counter::Views => &mut self.view_count,
            Counter::Likes => &mut self.like_count,
            Counter::Saves => &mut self.save_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArticleKey {
    Id(i64),
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Views,
    Likes,
    Saves,
}

impl Counter {
    pub fn column(self) -> &'static str {
        match self {
            Self::Views => "view_count",
            Self::Likes => "like_count",
            Self::Saves => "save_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interaction {
    Like,
    Save,
}

impl Interaction {
    pub fn counter(self) -> Counter {
        match self {
            Self::Like => Counter::Likes,
            Self::Save => Counter::Saves,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Save => "save",
        }
    }
}

/// Case folding used by text search. Stores that search in the database
/// keep folded copies of title and description made with this function.
pub fn fold_for_search(text: &str) -> String {
    text.to_lowercase()
}

/// Filter over stored articles. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleFilter {
    pub category: Option<Category>,
    pub sentiments: Vec<SentimentLabel>,
    pub published_from: Option<DateTime<Utc>>,
    pub published_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl ArticleFilter {
    pub fn matches(&self, article: &StoredArticle) -> bool {
        if let Some(category) = self.category {
            if article.category != category {
                return false;
            }
        }
        if !self.sentiments.is_empty() && !self.sentiments.contains(&article.sentiment) {
            return false;
        }
        if let Some(from) = self.published_from {
            if article.published_at < from {
                return false;
            }
        }
        if let Some(to) = self.published_to {
            if article.published_at > to {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().map(fold_for_search) {
            let in_title = fold_for_search(&article.title).contains(&needle);
            let in_desc = article
                .description
                .as_deref()
                .map_or(false, |d| fold_for_search(d).contains(&needle));
            if !in_title && !in_desc {
                return false;
            }
        }
        true
    }
}

/// Sort key for queries; always descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleSort {
    #[default]
    PublishedAt,
    ViewCount,
    LikeCount,
    SentimentConfidence,
}

impl ArticleSort {
    pub fn column(self) -> &'static str {
        match self {
            Self::PublishedAt => "published_at",
            Self::ViewCount => "view_count",
            Self::LikeCount => "like_count",
            Self::SentimentConfidence => "sentiment_confidence",
        }
    }

    /// Descending order, ties broken by id (newest insert first).
    pub fn compare(self, a: &StoredArticle, b: &StoredArticle) -> Ordering {
        let primary = match self {
            Self::PublishedAt => b.published_at.cmp(&a.published_at),
            Self::ViewCount => b.view_count.cmp(&a.view_count),
            Self::LikeCount => b.like_count.cmp(&a.like_count),
            Self::SentimentConfidence => b
                .sentiment_confidence
                .partial_cmp(&a.sentiment_confidence)
                .unwrap_or(Ordering::Equal),
        };
        primary.then_with(|| b.id.cmp(&a.id))
    }
}

impl FromStr for ArticleSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published_at" => Ok(Self::PublishedAt),
            "view_count" => Ok(Self::ViewCount),
            "like_count" => Ok(Self::LikeCount),
            "sentiment_confidence" => Ok(Self::SentimentConfidence),
            other => Err(Error::Config(format!("Unsupported sort field: {}", other))),
        }
    }
}

/// Recipient of digest emails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    pub name: String,
    pub categories: Vec<Category>,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: Option<&str>) -> RawArticle {
        RawArticle {
            title: "Markets rally".to_string(),
            description: Some("Stocks close higher".to_string()),
            url: url.map(str::to_string),
            source: "Reuters".to_string(),
            published_at: Utc::now(),
            provider_category: Some("Programming".to_string()),
            provider: "currents".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_raw_requires_url() {
        assert!(NormalizedArticle::from_raw(raw(None)).is_none());
        assert!(NormalizedArticle::from_raw(raw(Some("   "))).is_none());

        let article = NormalizedArticle::from_raw(raw(Some("https://example.com/a#top"))).unwrap();
        assert_eq!(article.url, "https://example.com/a");
        assert_eq!(article.category, Category::Technology);
    }

    #[test]
    fn test_classification_text() {
        let mut article = NormalizedArticle::from_raw(raw(Some("https://example.com/a"))).unwrap();
        assert_eq!(article.classification_text().as_deref(), Some("Markets rally. Stocks close higher"));

        article.description = None;
        assert_eq!(article.classification_text().as_deref(), Some("Markets rally"));

        article.description = Some("  ".to_string());
        assert_eq!(article.classification_text().as_deref(), Some("Markets rally"));

        article.title = " ".to_string();
        assert_eq!(article.classification_text(), None);
    }

    #[test]
    fn test_sentiment_label_parsing() {
        assert_eq!("Positive".parse::<SentimentLabel>().unwrap(), SentimentLabel::Positive);
        assert_eq!(" negative ".parse::<SentimentLabel>().unwrap(), SentimentLabel::Negative);
        assert!("mixed".parse::<SentimentLabel>().is_err());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(SentimentResult::new(SentimentLabel::Positive, 1.7).confidence, 1.0);
        assert_eq!(SentimentResult::new(SentimentLabel::Positive, -0.2).confidence, 0.0);
        assert_eq!(SentimentResult::new(SentimentLabel::Positive, f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let new = NewArticle {
            article: NormalizedArticle::from_raw(raw(Some("https://example.com/a"))).unwrap(),
            sentiment: SentimentResult::new(SentimentLabel::Positive, 0.8),
            fetched_at: Utc::now(),
        };
        let stored = StoredArticle::from_new(1, &new);

        let filter = ArticleFilter {
            search: Some("RALLY".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&stored));

        let filter = ArticleFilter {
            sentiments: vec![SentimentLabel::Negative],
            ..Default::default()
        };
        assert!(!filter.matches(&stored));
    }
}
