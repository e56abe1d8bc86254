use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

pub mod handlers;
pub mod state;

pub use state::AppState;

pub async fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/api/news", get(handlers::list_news))
        .route("/api/news/saved", get(handlers::saved_news))
        .route("/api/news/categories", get(handlers::categories))
        .route("/api/news/fetch", post(handlers::fetch_news))
        .route("/api/news/:id", get(handlers::get_news))
        .route("/api/news/:id/like", post(handlers::like_news))
        .route("/api/news/:id/save", post(handlers::save_news))
        .route("/api/ingestion/status", get(handlers::ingestion_status))
        .route("/api/analyze", post(handlers::analyze_text))
        .route(
            "/api/analyze-image",
            post(handlers::analyze_image).layer(DefaultBodyLimit::max(handlers::MAX_UPLOAD_BYTES)),
        )
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Binds `addr` and serves the API until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = create_app(state).await;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

pub mod prelude {
    pub use crate::{create_app, serve, AppState};
    pub use nm_core::{Error, Result, StoredArticle};
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use nm_core::{
        ArticleFilter, ArticleKey, ArticleSort, ArticleStore, Category, Counter, ImageClassifier, Interaction,
        MemorySink, NewArticle, NormalizedArticle, RawArticle, Result, SentimentLabel, SentimentResult,
        StoredArticle, Subscriber,
    };
    use nm_inference::models::LexiconClassifier;
    use nm_ingest::{IngestionOrchestrator, NewsProvider, ProviderMetadata};
    use nm_storage::MemoryStorage;
    use serde_json::Value;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StaticProvider {
        delay: Option<std::time::Duration>,
    }

    #[async_trait]
    impl NewsProvider for StaticProvider {
        fn metadata(&self) -> ProviderMetadata {
            ProviderMetadata {
                name: "static",
                emoji: "📰",
            }
        }

        async fn fetch(&self, _category: Option<&str>) -> Result<Vec<RawArticle>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(vec![
                RawArticle {
                    title: "Volunteers celebrate a wonderful harvest".to_string(),
                    url: Some("https://example.com/fresh/1".to_string()),
                    source: "Wire".to_string(),
                    published_at: Utc::now(),
                    provider: "static".to_string(),
                    ..Default::default()
                },
                RawArticle {
                    title: "No link here".to_string(),
                    url: None,
                    source: "Wire".to_string(),
                    published_at: Utc::now(),
                    provider: "static".to_string(),
                    ..Default::default()
                },
            ])
        }
    }

    /// Labels every image negative and remembers the last content type it saw.
    #[derive(Default)]
    struct FixedImage {
        content_type: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl ImageClassifier for FixedImage {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn classify(&self, image_url: &str) -> Result<SentimentResult> {
            if image_url.ends_with(".jpg") {
                Ok(SentimentResult::new(SentimentLabel::Negative, 0.7))
            } else {
                Err(nm_core::Error::Classifier(format!("{} is not an image", image_url)))
            }
        }

        async fn classify_bytes(&self, _bytes: Vec<u8>, content_type: &str) -> Result<SentimentResult> {
            *self.content_type.lock().unwrap() = Some(content_type.to_string());
            Ok(SentimentResult::new(SentimentLabel::Negative, 0.7))
        }
    }

    /// Memory store whose connection check always fails.
    #[derive(Default)]
    struct UnreachableStore {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl ArticleStore for UnreachableStore {
        async fn ping(&self) -> Result<()> {
            Err(nm_core::Error::StoreUnavailable("connection refused".to_string()))
        }
        async fn exists(&self, url: &str) -> Result<bool> {
            self.inner.exists(url).await
        }
        async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool> {
            self.inner.insert_if_absent(article).await
        }
        async fn get(&self, key: &ArticleKey) -> Result<Option<StoredArticle>> {
            self.inner.get(key).await
        }
        async fn count_matching(&self, filter: &ArticleFilter) -> Result<u64> {
            self.inner.count_matching(filter).await
        }
        async fn query(
            &self,
            filter: &ArticleFilter,
            sort: ArticleSort,
            skip: u64,
            limit: u64,
        ) -> Result<Vec<StoredArticle>> {
            self.inner.query(filter, sort, skip, limit).await
        }
        async fn increment_counter(&self, key: &ArticleKey, counter: Counter, delta: i64) -> Result<bool> {
            self.inner.increment_counter(key, counter, delta).await
        }
        async fn toggle_interaction(&self, user_id: &str, article_id: i64, kind: Interaction) -> Result<bool> {
            self.inner.toggle_interaction(user_id, article_id, kind).await
        }
        async fn has_interaction(&self, user_id: &str, article_id: i64, kind: Interaction) -> Result<bool> {
            self.inner.has_interaction(user_id, article_id, kind).await
        }
        async fn interacted_articles(
            &self,
            user_id: &str,
            kind: Interaction,
            skip: u64,
            limit: u64,
        ) -> Result<Vec<StoredArticle>> {
            self.inner.interacted_articles(user_id, kind, skip, limit).await
        }
        async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
            self.inner.upsert_subscriber(subscriber).await
        }
        async fn subscribers(&self) -> Result<Vec<Subscriber>> {
            self.inner.subscribers().await
        }
    }

    async fn seed(store: &MemoryStorage, url: &str, category: Category, sentiment: SentimentLabel, age_days: i64) {
        let article = NewArticle {
            article: NormalizedArticle {
                title: format!("Story at {}", url),
                description: None,
                content: None,
                url: url.to_string(),
                image_url: None,
                source: "Wire".to_string(),
                author: None,
                published_at: Utc::now() - Duration::days(age_days),
                provider: "test".to_string(),
                category,
            },
            sentiment: SentimentResult::new(sentiment, 0.8),
            fetched_at: Utc::now(),
        };
        store.insert_if_absent(&article).await.unwrap();
    }

    async fn app_with(
        provider: StaticProvider,
        store: Arc<dyn ArticleStore>,
        image: Arc<dyn ImageClassifier>,
    ) -> Router {
        let orchestrator = IngestionOrchestrator::new(
            vec![Arc::new(provider) as Arc<dyn NewsProvider>],
            Arc::new(LexiconClassifier::new()),
            image,
            store,
        )
        .with_sink(Arc::new(MemorySink::new()));
        create_app(AppState::new(Arc::new(orchestrator))).await
    }

    async fn app() -> Router {
        let store = Arc::new(MemoryStorage::new());
        seed(&store, "https://example.com/a", Category::Technology, SentimentLabel::Positive, 0).await;
        seed(&store, "https://example.com/b", Category::Technology, SentimentLabel::Negative, 1).await;
        seed(&store, "https://example.com/c", Category::Sports, SentimentLabel::Neutral, 2).await;
        app_with(StaticProvider::default(), store, Arc::new(FixedImage::default())).await
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let boundary = "newsmood-boundary";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
            b = boundary,
            field = field,
            file_name = file_name,
            content_type = content_type,
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        Request::builder()
            .method("POST")
            .uri("/api/analyze-image")
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    }

    async fn call(app: &Router, method: &str, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header("X-User-Id", user);
        }
        send(app, request.body(Body::empty()).unwrap()).await
    }

    #[tokio::test]
    async fn test_list_news_filters_and_paginates() {
        let app = app().await;

        let (status, body) = call(&app, "GET", "/api/news", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total_count"], 3);
        assert_eq!(body["results"][0]["url"], "https://example.com/a");
        assert!(body["results"][0].get("is_liked").is_none());

        let (_, body) = call(&app, "GET", "/api/news?category=technology&page_size=1&page=2", None).await;
        assert_eq!(body["pagination"]["total_count"], 2);
        assert_eq!(body["pagination"]["total_pages"], 2);
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
        assert_eq!(body["results"][0]["url"], "https://example.com/b");

        let (_, body) = call(&app, "GET", "/api/news?sentiment=neutral", None).await;
        assert_eq!(body["results"][0]["url"], "https://example.com/c");
    }

    #[tokio::test]
    async fn test_list_news_rejects_bad_parameters() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/news?date_from=yesterday", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("yesterday"));

        let (status, _) = call(&app, "GET", "/api/news?sort_by=title", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_news_counts_views_for_identified_users() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/news/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view_count"], 0);

        let (_, body) = call(&app, "GET", "/api/news/1", Some("reader")).await;
        assert_eq!(body["view_count"], 1);
        assert_eq!(body["is_liked"], false);

        let (status, body) = call(&app, "GET", "/api/news/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_like_and_save_toggle() {
        let app = app().await;

        let (status, _) = call(&app, "POST", "/api/news/1/like", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "POST", "/api/news/1/like", Some("reader")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["liked"], true);
        let (_, body) = call(&app, "POST", "/api/news/1/like", Some("reader")).await;
        assert_eq!(body["liked"], false);

        let (_, body) = call(&app, "POST", "/api/news/2/save", Some("reader")).await;
        assert_eq!(body["saved"], true);
        let (_, body) = call(&app, "GET", "/api/news/saved", Some("reader")).await;
        assert_eq!(body["results"][0]["url"], "https://example.com/b");
        assert_eq!(body["results"][0]["is_saved"], true);
        assert_eq!(body["results"][0]["save_count"], 1);

        let (status, _) = call(&app, "POST", "/api/news/999/save", Some("reader")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_categories() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/news/categories", None).await;
        assert_eq!(status, StatusCode::OK);
        let categories = body["categories"].as_array().unwrap();
        assert_eq!(categories.len(), Category::ALL.len());
        assert!(categories.iter().any(|c| c["value"] == "technology"));
    }

    #[tokio::test]
    async fn test_fetch_runs_a_cycle_and_updates_status() {
        let app = app().await;
        let (_, status_body) = call(&app, "GET", "/api/ingestion/status", None).await;
        assert_eq!(status_body["state"], "idle");
        assert!(status_body["last_cycle"].is_null());

        let (status, body) = call(&app, "POST", "/api/news/fetch", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["saved_count"], 1);

        let (_, body) = call(&app, "POST", "/api/news/fetch", None).await;
        assert_eq!(body["saved_count"], 0);

        let (_, status_body) = call(&app, "GET", "/api/ingestion/status", None).await;
        assert_eq!(status_body["last_cycle"]["saved"], 0);
        assert!(status_body["scheduler"].is_null());
    }

    #[tokio::test]
    async fn test_fetch_with_store_down_is_503() {
        let app = app_with(
            StaticProvider::default(),
            Arc::new(UnreachableStore::default()),
            Arc::new(FixedImage::default()),
        )
        .await;
        let (status, body) = call(&app, "POST", "/api/news/fetch", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("connection refused"));

        let (_, status_body) = call(&app, "GET", "/api/ingestion/status", None).await;
        assert_eq!(status_body["state"], "idle");
    }

    #[tokio::test]
    async fn test_concurrent_fetch_is_409() {
        let slow = StaticProvider {
            delay: Some(std::time::Duration::from_millis(300)),
        };
        let app = app_with(slow, Arc::new(MemoryStorage::new()), Arc::new(FixedImage::default())).await;

        let first = {
            let app = app.clone();
            tokio::spawn(async move { call(&app, "POST", "/api/news/fetch", None).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (status, body) = call(&app, "POST", "/api/news/fetch", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let (status, body) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["saved_count"], 1);
    }

    #[tokio::test]
    async fn test_analyze_text() {
        let app = app().await;
        let (status, body) = send(
            &app,
            post_json("/api/analyze", serde_json::json!({ "text": "What a wonderful, happy day" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sentiment"], "positive");
        assert!(body["confidence"].as_f64().unwrap() > 0.0);

        let (status, body) = send(&app, post_json("/api/analyze", serde_json::json!({ "text": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = call(&app, "POST", "/api/analyze", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_image_upload() {
        let image = Arc::new(FixedImage::default());
        let app = app_with(StaticProvider::default(), Arc::new(MemoryStorage::new()), image.clone()).await;

        let (status, body) = send(&app, upload("image", "cat.JPG", "application/octet-stream", b"\xff\xd8\xff")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sentiment"], "negative");
        assert_eq!(body["confidence"], 0.7);
        assert_eq!(image.content_type.lock().unwrap().as_deref(), Some("image/jpeg"));

        let (status, body) = send(&app, upload("image", "notes.txt", "text/plain", b"hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid file type"));

        let (status, body) = send(&app, upload("photo", "cat.png", "image/png", b"\x89PNG")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No image file provided");

        let (status, _) = send(&app, upload("image", "cat.png", "image/png", b"")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_image_by_url() {
        let app = app().await;
        let (status, body) = send(
            &app,
            post_json(
                "/api/analyze-image",
                serde_json::json!({ "image_url": "https://example.com/cat.jpg" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sentiment"], "negative");

        let (status, body) = send(&app, post_json("/api/analyze-image", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No image file provided");

        let (status, body) = send(
            &app,
            post_json(
                "/api/analyze-image",
                serde_json::json!({ "image_url": "https://example.com/page.html" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }
}
