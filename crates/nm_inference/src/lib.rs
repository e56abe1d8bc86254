pub mod fusion;
pub mod models;

pub use fusion::{label_for_score, FusionPolicy, SentimentFusion};
pub use models::{create_image_classifier, create_text_classifier};

pub mod prelude {
    pub use super::fusion::{FusionPolicy, SentimentFusion};
    pub use super::models::{
        create_image_classifier, create_text_classifier, LexiconClassifier, NoImageClassifier,
    };
    pub use nm_core::{Error, ImageClassifier, Result, SentimentResult, TextClassifier};
}
