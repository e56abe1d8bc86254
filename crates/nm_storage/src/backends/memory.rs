use async_trait::async_trait;
use nm_core::{
    ArticleFilter, ArticleKey, ArticleSort, ArticleStore, Counter, Interaction, NewArticle, Result,
    StoredArticle, Subscriber,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::StorageBackend;

#[derive(Default)]
pub struct MemoryStore {
    articles: HashMap<i64, StoredArticle>,
    ids_by_url: HashMap<String, i64>,
    next_id: i64,
    /// (user, article, kind) -> insertion sequence
    interactions: HashMap<(String, i64, Interaction), u64>,
    next_seq: u64,
    subscribers: HashMap<String, Subscriber>,
}

impl MemoryStore {
    fn resolve(&self, key: &ArticleKey) -> Option<i64> {
        match key {
            ArticleKey::Id(id) => self.articles.contains_key(id).then_some(*id),
            ArticleKey::Url(url) => self.ids_by_url.get(url).copied(),
        }
    }

    fn insert_if_absent(&mut self, article: &NewArticle) -> bool {
        match self.ids_by_url.entry(article.article.url.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                self.next_id += 1;
                let id = self.next_id;
                slot.insert(id);
                self.articles.insert(id, StoredArticle::from_new(id, article));
                true
            }
        }
    }

    fn increment(&mut self, id: i64, counter: Counter, delta: i64) -> bool {
        match self.articles.get_mut(&id) {
            Some(article) => {
                let value = article.counter_mut(counter);
                *value = (*value + delta).max(0);
                true
            }
            None => false,
        }
    }

    fn matching(&self, filter: &ArticleFilter) -> Vec<&StoredArticle> {
        self.articles.values().filter(|a| filter.matches(a)).collect()
    }
}

/// Process-local store. The URL uniqueness check and the insert happen under
/// one write lock, so concurrent writers can never both insert a URL.
pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::default())),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn connect(_location: &str) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStore for MemoryStorage {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.store.read().await.ids_by_url.contains_key(url))
    }

    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool> {
        Ok(self.store.write().await.insert_if_absent(article))
    }

    async fn get(&self, key: &ArticleKey) -> Result<Option<StoredArticle>> {
        let store = self.store.read().await;
        Ok(store.resolve(key).and_then(|id| store.articles.get(&id).cloned()))
    }

    async fn count_matching(&self, filter: &ArticleFilter) -> Result<u64> {
        Ok(self.store.read().await.matching(filter).len() as u64)
    }

    async fn query(
        &self,
        filter: &ArticleFilter,
        sort: ArticleSort,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<StoredArticle>> {
        let store = self.store.read().await;
        let mut articles = store.matching(filter);
        articles.sort_by(|a, b| sort.compare(a, b));
        Ok(articles
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn increment_counter(&self, key: &ArticleKey, counter: Counter, delta: i64) -> Result<bool> {
        let mut store = self.store.write().await;
        match store.resolve(key) {
            Some(id) => Ok(store.increment(id, counter, delta)),
            None => Ok(false),
        }
    }

    async fn toggle_interaction(&self, user_id: &str, article_id: i64, kind: Interaction) -> Result<bool> {
        let mut store = self.store.write().await;
        if !store.articles.contains_key(&article_id) {
            return Err(nm_core::Error::NotFound(format!("article {}", article_id)));
        }
        let key = (user_id.to_string(), article_id, kind);
        if store.interactions.remove(&key).is_some() {
            store.increment(article_id, kind.counter(), -1);
            Ok(false)
        } else {
            store.next_seq += 1;
            let seq = store.next_seq;
            store.interactions.insert(key, seq);
            store.increment(article_id, kind.counter(), 1);
            Ok(true)
        }
    }

    async fn has_interaction(&self, user_id: &str, article_id: i64, kind: Interaction) -> Result<bool> {
        let store = self.store.read().await;
        Ok(store
            .interactions
            .contains_key(&(user_id.to_string(), article_id, kind)))
    }

    async fn interacted_articles(
        &self,
        user_id: &str,
        kind: Interaction,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<StoredArticle>> {
        let store = self.store.read().await;
        let mut entries: Vec<(u64, i64)> = store
            .interactions
            .iter()
            .filter(|((user, _, k), _)| user == user_id && *k == kind)
            .map(|((_, article_id, _), seq)| (*seq, *article_id))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries
            .into_iter()
            .filter_map(|(_, id)| store.articles.get(&id).cloned())
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        self.store
            .write()
            .await
            .subscribers
            .insert(subscriber.email.clone(), subscriber.clone());
        Ok(())
    }

    async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        let store = self.store.read().await;
        let mut subscribers: Vec<_> = store.subscribers.values().cloned().collect();
        subscribers.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(subscribers)
    }
}
