use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use nm_core::{
    ArticleStore, Error, EventSink, ImageClassifier, IngestEvent, NewArticle, NormalizedArticle, RawArticle,
    Result, SentimentResult, TextClassifier,
};
use nm_inference::{FusionPolicy, SentimentFusion};
use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::timeout;
use uuid::Uuid;

use crate::logging::TracingSink;
use crate::providers::NewsProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    Idle,
    Fetching,
    Fusing,
    Persisting,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub provider_timeout: Duration,
    pub classifier_timeout: Duration,
    pub max_concurrent_classifications: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(10),
            classifier_timeout: Duration::from_secs(10),
            max_concurrent_classifications: 8,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub category: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub skipped_without_url: usize,
    pub skipped_existing: usize,
    pub duplicates: usize,
    pub saved: usize,
    pub failed_providers: Vec<String>,
    pub classifier_failures: usize,
    pub store_failures: usize,
}

impl CycleReport {
    fn new(run_id: Uuid, category: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            category: category.map(str::to_string),
            started_at: now,
            finished_at: now,
            fetched: 0,
            skipped_without_url: 0,
            skipped_existing: 0,
            duplicates: 0,
            saved: 0,
            failed_providers: Vec::new(),
            classifier_failures: 0,
            store_failures: 0,
        }
    }
}

/// Summary of the last finished or refused cycle, for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub run_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub saved: Option<usize>,
    pub error: Option<String>,
}

impl CycleOutcome {
    pub fn from_result(started_at: DateTime<Utc>, result: &Result<CycleReport>) -> Self {
        match result {
            Ok(report) => Self {
                run_id: Some(report.run_id),
                started_at: report.started_at,
                finished_at: report.finished_at,
                saved: Some(report.saved),
                error: None,
            },
            Err(e) => Self {
                run_id: None,
                started_at,
                finished_at: Utc::now(),
                saved: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Drives providers, classifiers, fusion and the store through one cycle at a time.
pub struct IngestionOrchestrator {
    providers: Vec<Arc<dyn NewsProvider>>,
    text: Arc<dyn TextClassifier>,
    image: Arc<dyn ImageClassifier>,
    fusion: SentimentFusion,
    store: Arc<dyn ArticleStore>,
    sink: Arc<dyn EventSink>,
    config: OrchestratorConfig,
    state: Mutex<CycleState>,
    running: TokioMutex<()>,
    last_outcome: Mutex<Option<CycleOutcome>>,
}

impl IngestionOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn NewsProvider>>,
        text: Arc<dyn TextClassifier>,
        image: Arc<dyn ImageClassifier>,
        store: Arc<dyn ArticleStore>,
    ) -> Self {
        Self {
            providers,
            text,
            image,
            fusion: SentimentFusion::default(),
            store,
            sink: Arc::new(TracingSink::new()),
            config: OrchestratorConfig::default(),
            state: Mutex::new(CycleState::Idle),
            running: TokioMutex::new(()),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_fusion_policy(mut self, policy: FusionPolicy) -> Self {
        self.fusion = SentimentFusion::new(policy);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_outcome(&self) -> Option<CycleOutcome> {
        self.last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self) -> Arc<dyn ArticleStore> {
        self.store.clone()
    }

    pub fn text_classifier(&self) -> Arc<dyn TextClassifier> {
        self.text.clone()
    }

    pub fn image_classifier(&self) -> Arc<dyn ImageClassifier> {
        self.image.clone()
    }

    fn set_state(&self, state: CycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Runs one cycle and returns the number of newly saved articles.
    pub async fn fetch_and_store(&self, category: Option<&str>) -> Result<usize> {
        self.run_cycle(category).await.map(|report| report.saved)
    }

    /// Runs one cycle. Fails with `Error::CycleInProgress` when another cycle
    /// is running and with `Error::StoreUnavailable` when the store is down;
    /// every other failure is recorded in the event sink and the cycle goes on.
    pub async fn run_cycle(&self, category: Option<&str>) -> Result<CycleReport> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::info!("Skipping ingestion cycle: one is already in progress");
            return Err(Error::CycleInProgress);
        };

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, category = category.unwrap_or("all"), "Starting ingestion cycle");

        let result = self.execute(run_id, category).await;
        self.set_state(CycleState::Idle);

        match &result {
            Ok(report) => tracing::info!(
                %run_id,
                fetched = report.fetched,
                saved = report.saved,
                duplicates = report.duplicates,
                "Ingestion cycle finished"
            ),
            Err(e) => tracing::error!(%run_id, "Ingestion cycle aborted: {}", e),
        }
        *self.last_outcome.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(CycleOutcome::from_result(started_at, &result));
        result
    }

    async fn execute(&self, run_id: Uuid, category: Option<&str>) -> Result<CycleReport> {
        let mut report = CycleReport::new(run_id, category);
        self.store.ping().await?;

        self.set_state(CycleState::Fetching);
        let raw = self.fetch_all(category, &mut report).await;
        report.fetched = raw.len();

        let candidates = self.select_candidates(raw, &mut report).await?;

        self.set_state(CycleState::Fusing);
        let classified: Vec<(NewArticle, usize)> = stream::iter(candidates)
            .map(|article| self.classify(article))
            .buffer_unordered(self.config.max_concurrent_classifications.max(1))
            .collect()
            .await;

        self.set_state(CycleState::Persisting);
        for (article, failures) in classified {
            report.classifier_failures += failures;
            self.persist(article, &mut report).await?;
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Every provider runs in its own task under its own timeout; a failure
    /// only costs that provider's articles.
    async fn fetch_all(&self, category: Option<&str>, report: &mut CycleReport) -> Vec<RawArticle> {
        let limit = self.config.provider_timeout;
        let names: Vec<&'static str> = self.providers.iter().map(|p| p.metadata().name).collect();
        let handles: Vec<_> = self
            .providers
            .iter()
            .cloned()
            .map(|provider| {
                let category = category.map(str::to_string);
                tokio::spawn(async move { timeout(limit, provider.fetch(category.as_deref())).await })
            })
            .collect();

        let mut articles = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            let failure = match joined {
                Ok(Ok(Ok(fetched))) => {
                    tracing::debug!("{} returned {} articles", name, fetched.len());
                    articles.extend(fetched);
                    continue;
                }
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(_)) => format!("timed out after {:?}", limit),
                Err(e) => format!("task failed: {}", e),
            };
            report.failed_providers.push(name.to_string());
            self.sink.record(IngestEvent::ProviderFetchFailed {
                provider: name.to_string(),
                reason: failure,
            });
        }
        articles
    }

    async fn select_candidates(
        &self,
        raw: Vec<RawArticle>,
        report: &mut CycleReport,
    ) -> Result<Vec<NormalizedArticle>> {
        let mut candidates = Vec::with_capacity(raw.len());
        for article in raw {
            let Some(article) = NormalizedArticle::from_raw(article) else {
                report.skipped_without_url += 1;
                continue;
            };
            match self.store.exists(&article.url).await {
                Ok(true) => report.skipped_existing += 1,
                Ok(false) => candidates.push(article),
                Err(e) if e.is_fatal_for_cycle() => return Err(e),
                // The insert below still enforces uniqueness
                Err(e) => {
                    tracing::warn!("Existence check failed for {}: {}", article.url, e);
                    candidates.push(article);
                }
            }
        }
        Ok(candidates)
    }

    async fn classify(&self, article: NormalizedArticle) -> (NewArticle, usize) {
        let mut failures = 0;

        let text = match article.classification_text() {
            None => SentimentResult::sentinel(),
            Some(text) => match timeout(self.config.classifier_timeout, self.text.classify(&text)).await {
                Ok(Ok(result)) => result,
                outcome => {
                    failures += 1;
                    self.classifier_failed(self.text.name(), &article.url, outcome.map(|r| r.map(|_| ())));
                    SentimentResult::sentinel()
                }
            },
        };

        let image = match article.image_url.as_deref() {
            None => SentimentResult::sentinel(),
            Some(image_url) => match timeout(self.config.classifier_timeout, self.image.classify(image_url)).await {
                Ok(Ok(result)) => result,
                outcome => {
                    failures += 1;
                    self.classifier_failed(self.image.name(), &article.url, outcome.map(|r| r.map(|_| ())));
                    SentimentResult::sentinel()
                }
            },
        };

        let sentiment = self.fusion.fuse(&text, &image);
        (
            NewArticle {
                article,
                sentiment,
                fetched_at: Utc::now(),
            },
            failures,
        )
    }

    fn classifier_failed(
        &self,
        classifier: &str,
        url: &str,
        outcome: std::result::Result<Result<()>, tokio::time::error::Elapsed>,
    ) {
        let reason = match outcome {
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.config.classifier_timeout),
            Ok(Ok(())) => return,
        };
        self.sink.record(IngestEvent::ClassifierFailed {
            classifier: classifier.to_string(),
            url: url.to_string(),
            reason,
        });
    }

    async fn persist(&self, article: NewArticle, report: &mut CycleReport) -> Result<()> {
        match self.store.insert_if_absent(&article).await {
            Ok(true) => report.saved += 1,
            Ok(false) => {
                tracing::debug!("Duplicate URL not stored again: {}", article.article.url);
                report.duplicates += 1;
            }
            Err(e) if e.is_fatal_for_cycle() => return Err(e),
            Err(e) if e.is_duplicate() => report.duplicates += 1,
            Err(e) => {
                report.store_failures += 1;
                self.sink.record(IngestEvent::StoreWriteFailed {
                    url: article.article.url.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}
