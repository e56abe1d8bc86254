pub mod category;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod types;

pub use category::Category;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use events::{EventSink, IngestEvent, MemorySink};
pub use models::{ImageClassifier, Mailer, TextClassifier};
pub use storage::ArticleStore;
pub use types::{
    fold_for_search, ArticleFilter, ArticleKey, ArticleSort, Counter, FusedSentiment, Interaction, NewArticle,
    NormalizedArticle, RawArticle, SentimentLabel, SentimentResult, StoredArticle, Subscriber,
};
