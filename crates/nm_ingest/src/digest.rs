use std::collections::HashSet;
use std::sync::Arc;

use askama::Template;
use chrono::{Duration, Utc};
use nm_core::{
    ArticleFilter, ArticleSort, ArticleStore, Category, Error, Mailer, Result, SentimentLabel, StoredArticle,
    Subscriber,
};

pub const DIGEST_SUBJECT: &str = "Your Daily AI News Digest";

/// Categories used for subscribers who did not pick any.
pub const DEFAULT_CATEGORIES: [Category; 2] = [Category::General, Category::Technology];

#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub subject: String,
    pub html: String,
    pub articles: Vec<StoredArticle>,
}

/// One story as shown in the email. Every field is escaped by the template.
struct DigestItem<'a> {
    url: &'a str,
    title: &'a str,
    source: &'a str,
    category: &'static str,
    sentiment: SentimentLabel,
    description: &'a str,
}

impl<'a> From<&'a StoredArticle> for DigestItem<'a> {
    fn from(article: &'a StoredArticle) -> Self {
        Self {
            url: &article.url,
            title: &article.title,
            source: &article.source,
            category: article.category.label(),
            sentiment: article.sentiment,
            description: article.description.as_deref().unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "digest.html")]
struct DigestTemplate<'a> {
    subject: &'a str,
    items: Vec<DigestItem<'a>>,
    public_url: &'a str,
}

/// Builds and mails the daily digest of recent positive and neutral stories.
pub struct DigestService {
    store: Arc<dyn ArticleStore>,
    mailer: Arc<dyn Mailer>,
    public_url: String,
    per_category: u64,
    window: Duration,
}

impl DigestService {
    pub fn new(store: Arc<dyn ArticleStore>, mailer: Arc<dyn Mailer>, public_url: impl Into<String>) -> Self {
        Self {
            store,
            mailer,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            per_category: 3,
            window: Duration::hours(24),
        }
    }

    /// `None` when nothing recent matches the subscriber's categories.
    pub async fn build_digest(&self, subscriber: &Subscriber) -> Result<Option<Digest>> {
        let categories: &[Category] = if subscriber.categories.is_empty() {
            &DEFAULT_CATEGORIES
        } else {
            &subscriber.categories
        };

        let since = Utc::now() - self.window;
        let mut seen = HashSet::new();
        let mut articles = Vec::new();
        for category in categories {
            let filter = ArticleFilter {
                category: Some(*category),
                sentiments: vec![SentimentLabel::Positive, SentimentLabel::Neutral],
                published_from: Some(since),
                ..Default::default()
            };
            let top = self
                .store
                .query(&filter, ArticleSort::SentimentConfidence, 0, self.per_category)
                .await?;
            articles.extend(top.into_iter().filter(|a| seen.insert(a.url.clone())));
        }

        if articles.is_empty() {
            return Ok(None);
        }
        Ok(Some(Digest {
            subject: DIGEST_SUBJECT.to_string(),
            html: self.render(&articles)?,
            articles,
        }))
    }

    fn render(&self, articles: &[StoredArticle]) -> Result<String> {
        let template = DigestTemplate {
            subject: DIGEST_SUBJECT,
            items: articles.iter().map(DigestItem::from).collect(),
            public_url: &self.public_url,
        };
        template
            .render()
            .map_err(|e| Error::Email(format!("Failed to render digest: {}", e)))
    }

    /// Sends a digest to every enabled subscriber with something to read.
    /// Returns how many emails went out; one failed send does not stop the rest.
    pub async fn send_digests(&self) -> Result<usize> {
        let mut sent = 0;
        for subscriber in self.store.subscribers().await?.iter().filter(|s| s.enabled) {
            let Some(digest) = self.build_digest(subscriber).await? else {
                tracing::info!("No articles for digest to {}", subscriber.email);
                continue;
            };
            match self.mailer.send(&subscriber.email, &digest.subject, &digest.html).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!("Failed to send digest to {}: {}", subscriber.email, e),
            }
        }
        tracing::info!("Sent {} digest emails", sent);
        Ok(sent)
    }
}
