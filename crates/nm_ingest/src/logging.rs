use std::collections::VecDeque;
use std::sync::Once;

use nm_core::{EventSink, IngestEvent};
use tracing::Level;

static INIT: Once = Once::new();

#[derive(Debug, Clone, Default)]
pub struct Logger {
    prefixes: VecDeque<String>,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            prefixes: VecDeque::new(),
        }
    }

    pub fn with_new_prefixes(mut self, prefix: String) -> Self {
        self.prefixes.clear();
        self.prefixes.push_back(prefix);
        self
    }

    pub fn with_prefix(mut self, prefix: String) -> Self {
        self.prefixes.push_back(prefix);
        self
    }

    fn prefix(&self) -> String {
        self.prefixes.iter().map(|p| format!("{} ", p)).collect()
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{}{}", self.prefix(), message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!("{}{}", self.prefix(), message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!("{}{}", self.prefix(), message);
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!("{}{}", self.prefix(), message);
    }
}

/// Installs the global fmt subscriber once. Later calls only hand out a logger.
pub fn init_logging(verbose: bool) -> Logger {
    if !tracing::dispatcher::has_been_set() {
        INIT.call_once(|| {
            let level = if verbose { Level::DEBUG } else { Level::INFO };
            // Another subscriber may have been installed in between
            let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
        });
    }
    Logger::new()
}

/// Production event sink: pipeline events become warn/error log lines.
#[derive(Debug, Clone)]
pub struct TracingSink {
    logger: Logger,
}

impl TracingSink {
    pub fn new() -> Self {
        Self {
            logger: Logger::new().with_new_prefixes("[ingest]".to_string()),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for TracingSink {
    fn record(&self, event: IngestEvent) {
        match &event {
            IngestEvent::StoreWriteFailed { .. } => self.logger.error(&event.to_string()),
            IngestEvent::ProviderFetchFailed { provider, .. } => self
                .logger
                .clone()
                .with_prefix(format!("[{}]", provider))
                .warn(&event.to_string()),
            IngestEvent::ClassifierFailed { .. } => self.logger.warn(&event.to_string()),
        }
    }
}
