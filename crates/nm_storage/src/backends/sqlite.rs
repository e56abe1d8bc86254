use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nm_core::{
    fold_for_search, ArticleFilter, ArticleKey, ArticleSort, ArticleStore, Category, Counter, Error, Interaction,
    NewArticle, Result, SentimentLabel, StoredArticle, Subscriber,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use crate::StorageBackend;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS news_articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        content TEXT,
        image_url TEXT,
        source TEXT NOT NULL,
        author TEXT,
        published_at TEXT NOT NULL,
        provider TEXT NOT NULL,
        category TEXT NOT NULL,
        sentiment TEXT NOT NULL,
        sentiment_confidence REAL NOT NULL,
        fetched_at TEXT NOT NULL,
        view_count INTEGER NOT NULL DEFAULT 0,
        like_count INTEGER NOT NULL DEFAULT 0,
        save_count INTEGER NOT NULL DEFAULT 0,
        title_folded TEXT NOT NULL DEFAULT '',
        description_folded TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_news_articles_url ON news_articles (url)",
    "CREATE INDEX IF NOT EXISTS idx_news_articles_published_at ON news_articles (published_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_news_articles_category ON news_articles (category)",
    "CREATE INDEX IF NOT EXISTS idx_news_articles_sentiment ON news_articles (sentiment)",
    r#"
    CREATE TABLE IF NOT EXISTS article_interactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        article_id INTEGER NOT NULL REFERENCES news_articles (id),
        kind TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (user_id, article_id, kind)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscribers (
        email TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        categories TEXT NOT NULL,
        enabled INTEGER NOT NULL
    )
    "#,
    // Add future migrations here
];

/// Timestamps are stored as fixed-width UTC RFC 3339 so text order is time order.
fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Failed to parse date {:?}: {}", value, e)))
}

/// Connection-level failures mean the store is unreachable; everything else
/// is an ordinary storage error.
fn map_sqlx(context: &str, err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Tls(_) => Error::StoreUnavailable(format!("{}: {}", context, err)),
        other => Error::Storage(format!("{}: {}", context, other)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

pub struct SQLiteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be writable at the configured DATABASE_PATH"
    }

    async fn connect(location: &str) -> Result<Self> {
        Self::new_with_path(Path::new(location)).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StoreUnavailable(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| Error::StoreUnavailable(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Failed to connect to database: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| map_sqlx(&format!("Failed to run migration {}", i), e))?;
        }
        tracing::debug!("SQLite store ready at {}", db_path.display());

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    fn row_to_article(row: &SqliteRow) -> Result<StoredArticle> {
        let category: String = row.get("category");
        let sentiment: String = row.get("sentiment");
        Ok(StoredArticle {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            content: row.get("content"),
            url: row.get("url"),
            image_url: row.get("image_url"),
            source: row.get("source"),
            author: row.get("author"),
            published_at: decode_time(&row.get::<String, _>("published_at"))?,
            provider: row.get("provider"),
            category: Category::normalize(Some(&category)),
            sentiment: SentimentLabel::from_str(&sentiment)
                .map_err(|e| Error::Storage(format!("Corrupt sentiment column: {}", e)))?,
            sentiment_confidence: row.get("sentiment_confidence"),
            fetched_at: decode_time(&row.get::<String, _>("fetched_at"))?,
            view_count: row.get("view_count"),
            like_count: row.get("like_count"),
            save_count: row.get("save_count"),
        })
    }

    fn push_filter<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filter: &'a ArticleFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(category) = filter.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        if !filter.sentiments.is_empty() {
            builder.push(" AND sentiment IN (");
            let mut separated = builder.separated(", ");
            for sentiment in &filter.sentiments {
                separated.push_bind(sentiment.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(from) = &filter.published_from {
            builder.push(" AND published_at >= ").push_bind(encode_time(from));
        }
        if let Some(to) = &filter.published_to {
            builder.push(" AND published_at <= ").push_bind(encode_time(to));
        }
        // Plain substring match on the folded copies; no LIKE wildcards
        if let Some(search) = &filter.search {
            let needle = fold_for_search(search);
            builder
                .push(" AND (instr(title_folded, ")
                .push_bind(needle.clone())
                .push(") > 0 OR instr(description_folded, ")
                .push_bind(needle)
                .push(") > 0)");
        }
    }

    async fn resolve_id(&self, key: &ArticleKey) -> Result<Option<i64>> {
        let row = match key {
            ArticleKey::Id(id) => sqlx::query("SELECT id FROM news_articles WHERE id = ?").bind(*id),
            ArticleKey::Url(url) => sqlx::query("SELECT id FROM news_articles WHERE url = ?").bind(url.as_str()),
        }
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to resolve article", e))?;
        Ok(row.map(|r| r.get("id")))
    }
}

#[async_trait]
impl ArticleStore for SQLiteStorage {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Database ping failed: {}", e)))?;
        Ok(())
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM news_articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to check article", e))?;
        Ok(row.is_some())
    }

    async fn insert_if_absent(&self, new: &NewArticle) -> Result<bool> {
        let article = &new.article;
        let result = sqlx::query(
            r#"
            INSERT INTO news_articles
            (url, title, description, content, image_url, source, author, published_at,
             provider, category, sentiment, sentiment_confidence, fetched_at,
             title_folded, description_folded)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(article.description.as_deref())
        .bind(article.content.as_deref())
        .bind(article.image_url.as_deref())
        .bind(&article.source)
        .bind(article.author.as_deref())
        .bind(encode_time(&article.published_at))
        .bind(&article.provider)
        .bind(article.category.as_str())
        .bind(new.sentiment.label.as_str())
        .bind(new.sentiment.confidence)
        .bind(encode_time(&new.fetched_at))
        .bind(fold_for_search(&article.title))
        .bind(article.description.as_deref().map(fold_for_search))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(map_sqlx("Failed to store article", e)),
        }
    }

    async fn get(&self, key: &ArticleKey) -> Result<Option<StoredArticle>> {
        let row = match key {
            ArticleKey::Id(id) => sqlx::query("SELECT * FROM news_articles WHERE id = ?").bind(*id),
            ArticleKey::Url(url) => sqlx::query("SELECT * FROM news_articles WHERE url = ?").bind(url.as_str()),
        }
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to get article", e))?;
        row.as_ref().map(Self::row_to_article).transpose()
    }

    async fn count_matching(&self, filter: &ArticleFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM news_articles");
        Self::push_filter(&mut builder, filter);
        let row = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to count articles", e))?;
        Ok(row.get::<i64, _>("total").max(0) as u64)
    }

    async fn query(
        &self,
        filter: &ArticleFilter,
        sort: ArticleSort,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<StoredArticle>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM news_articles");
        Self::push_filter(&mut builder, filter);
        builder
            .push(format!(" ORDER BY {} DESC, id DESC LIMIT ", sort.column()))
            .push_bind(limit.min(i64::MAX as u64) as i64)
            .push(" OFFSET ")
            .push_bind(skip.min(i64::MAX as u64) as i64);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to query articles", e))?;
        rows.iter().map(Self::row_to_article).collect()
    }

    async fn increment_counter(&self, key: &ArticleKey, counter: Counter, delta: i64) -> Result<bool> {
        let column = counter.column();
        let sql = match key {
            ArticleKey::Id(_) => format!("UPDATE news_articles SET {0} = MAX(0, {0} + ?) WHERE id = ?", column),
            ArticleKey::Url(_) => format!("UPDATE news_articles SET {0} = MAX(0, {0} + ?) WHERE url = ?", column),
        };
        let query = sqlx::query(&sql).bind(delta);
        let query = match key {
            ArticleKey::Id(id) => query.bind(*id),
            ArticleKey::Url(url) => query.bind(url.as_str()),
        };
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to update counter", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle_interaction(&self, user_id: &str, article_id: i64, kind: Interaction) -> Result<bool> {
        if self.resolve_id(&ArticleKey::Id(article_id)).await?.is_none() {
            return Err(Error::NotFound(format!("article {}", article_id)));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx("Failed to begin transaction", e))?;

        let removed = sqlx::query("DELETE FROM article_interactions WHERE user_id = ? AND article_id = ? AND kind = ?")
            .bind(user_id)
            .bind(article_id)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx("Failed to remove interaction", e))?
            .rows_affected()
            > 0;

        if !removed {
            sqlx::query("INSERT INTO article_interactions (user_id, article_id, kind, created_at) VALUES (?, ?, ?, ?)")
                .bind(user_id)
                .bind(article_id)
                .bind(kind.as_str())
                .bind(encode_time(&Utc::now()))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx("Failed to add interaction", e))?;
        }

        let delta = if removed { -1 } else { 1 };
        sqlx::query(&format!(
            "UPDATE news_articles SET {0} = MAX(0, {0} + ?) WHERE id = ?",
            kind.counter().column()
        ))
        .bind(delta)
        .bind(article_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx("Failed to update counter", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx("Failed to commit interaction", e))?;
        Ok(!removed)
    }

    async fn has_interaction(&self, user_id: &str, article_id: i64, kind: Interaction) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM article_interactions WHERE user_id = ? AND article_id = ? AND kind = ?")
            .bind(user_id)
            .bind(article_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to check interaction", e))?;
        Ok(row.is_some())
    }

    async fn interacted_articles(
        &self,
        user_id: &str,
        kind: Interaction,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<StoredArticle>> {
        let rows = sqlx::query(
            r#"
            SELECT a.* FROM news_articles a
            JOIN article_interactions i ON i.article_id = a.id
            WHERE i.user_id = ? AND i.kind = ?
            ORDER BY i.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(limit.min(i64::MAX as u64) as i64)
        .bind(skip.min(i64::MAX as u64) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to list interactions", e))?;
        rows.iter().map(Self::row_to_article).collect()
    }

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        let categories = serde_json::to_string(&subscriber.categories)?;
        sqlx::query(
            r#"
            INSERT INTO subscribers (email, name, categories, enabled) VALUES (?, ?, ?, ?)
            ON CONFLICT (email) DO UPDATE SET
                name = excluded.name, categories = excluded.categories, enabled = excluded.enabled
            "#,
        )
        .bind(&subscriber.email)
        .bind(&subscriber.name)
        .bind(categories)
        .bind(subscriber.enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to store subscriber", e))?;
        Ok(())
    }

    async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query("SELECT * FROM subscribers ORDER BY email")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to list subscribers", e))?;

        let mut subscribers = Vec::with_capacity(rows.len());
        for row in rows {
            let categories: String = row.get("categories");
            subscribers.push(Subscriber {
                email: row.get("email"),
                name: row.get("name"),
                categories: serde_json::from_str(&categories)?,
                enabled: row.get("enabled"),
            });
        }
        Ok(subscribers)
    }
}
