use std::sync::Arc;

use nm_core::{ArticleStore, ImageClassifier, TextClassifier};
use nm_ingest::{IngestionOrchestrator, ScheduledTrigger};

pub struct AppState {
    pub store: Arc<dyn ArticleStore>,
    pub text: Arc<dyn TextClassifier>,
    pub image: Arc<dyn ImageClassifier>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub scheduler: Option<Arc<ScheduledTrigger>>,
}

impl AppState {
    /// Reads, writes and on-demand analysis share the orchestrator's store and classifiers.
    pub fn new(orchestrator: Arc<IngestionOrchestrator>) -> Self {
        Self {
            store: orchestrator.store(),
            text: orchestrator.text_classifier(),
            image: orchestrator.image_classifier(),
            orchestrator,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<ScheduledTrigger>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}
