use async_trait::async_trait;
use crate::types::{
    ArticleFilter, ArticleKey, ArticleSort, Counter, Interaction, NewArticle, StoredArticle, Subscriber,
};
use crate::Result;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Fails with `Error::StoreUnavailable` when the backend cannot be reached
    async fn ping(&self) -> Result<()>;

    async fn exists(&self, url: &str) -> Result<bool>;

    /// Atomically insert unless the URL is already stored.
    /// Returns `false` for a duplicate; never overwrites the existing record.
    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool>;

    async fn get(&self, key: &ArticleKey) -> Result<Option<StoredArticle>>;

    async fn count_matching(&self, filter: &ArticleFilter) -> Result<u64>;

    async fn query(
        &self,
        filter: &ArticleFilter,
        sort: ArticleSort,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<StoredArticle>>;

    /// Adds `delta` to a counter, never going below zero.
    /// Returns `false` when no article matches the key.
    async fn increment_counter(&self, key: &ArticleKey, counter: Counter, delta: i64) -> Result<bool>;

    /// Flips the interaction for a user and adjusts the matching counter.
    /// Returns the new state (`true` = liked/saved).
    async fn toggle_interaction(&self, user_id: &str, article_id: i64, kind: Interaction) -> Result<bool>;

    async fn has_interaction(&self, user_id: &str, article_id: i64, kind: Interaction) -> Result<bool>;

    /// Articles a user interacted with, most recent interaction first
    async fn interacted_articles(
        &self,
        user_id: &str,
        kind: Interaction,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<StoredArticle>>;

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<()>;

    async fn subscribers(&self) -> Result<Vec<Subscriber>>;
}
