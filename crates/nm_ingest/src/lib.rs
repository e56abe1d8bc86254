pub mod digest;
pub mod logging;
pub mod mailer;
pub mod orchestrator;
pub mod providers;
pub mod scheduler;

pub use digest::DigestService;
pub use logging::{init_logging, Logger, TracingSink};
pub use mailer::{create_mailer, BrevoMailer, LogMailer};
pub use orchestrator::{CycleOutcome, CycleReport, CycleState, IngestionOrchestrator, OrchestratorConfig};
pub use providers::{default_providers, NewsProvider, ProviderMetadata};
pub use scheduler::{spawn_digest_task, ScheduledTrigger};

pub mod prelude {
    pub use super::orchestrator::{CycleReport, IngestionOrchestrator};
    pub use super::providers::NewsProvider;
    pub use nm_core::{Error, RawArticle, Result};
}
