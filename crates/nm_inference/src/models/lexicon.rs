use std::fmt;
use nm_core::{Result, SentimentLabel, SentimentResult, TextClassifier};

const POSITIVE_WORDS: &[&str] = &[
    "achieve", "advance", "agreement", "approve", "best", "boost", "breakthrough", "celebrate",
    "cure", "gain", "good", "great", "growth", "happy", "hope", "improve", "innovative", "launch",
    "love", "peace", "praise", "profit", "rally", "record", "recover", "rescue", "rise", "safe",
    "strong", "succeed", "success", "surge", "win", "wins", "won",
];

const NEGATIVE_WORDS: &[&str] = &[
    "attack", "bad", "ban", "collapse", "conflict", "crash", "crisis", "damage", "dead", "death",
    "decline", "disaster", "drop", "fail", "failure", "fear", "fire", "flood", "fraud", "kill",
    "killed", "lawsuit", "loss", "plunge", "protest", "recession", "risk", "scandal", "shooting",
    "slump", "threat", "war", "warn", "weak", "worst",
];

/// Offline word-list classifier, used when no model endpoint is configured.
pub struct LexiconClassifier;

impl fmt::Debug for LexiconClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexiconClassifier").finish()
    }
}

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    fn score(text: &str) -> SentimentResult {
        let lowered = text.to_lowercase();
        let mut positive = 0usize;
        let mut negative = 0usize;
        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            if POSITIVE_WORDS.contains(&word) {
                positive += 1;
            } else if NEGATIVE_WORDS.contains(&word) {
                negative += 1;
            }
        }

        let hits = positive + negative;
        if hits == 0 {
            return SentimentResult::new(SentimentLabel::Neutral, 0.5);
        }

        let polarity = (positive as f64 - negative as f64) / hits as f64;
        if polarity.abs() < 0.2 {
            return SentimentResult::new(SentimentLabel::Neutral, 0.5);
        }
        let label = if polarity > 0.0 { SentimentLabel::Positive } else { SentimentLabel::Negative };
        // More evidence means more confidence, up to five hits
        let evidence = hits.min(5) as f64 / 5.0;
        SentimentResult::new(label, (0.4 + 0.55 * polarity.abs() * evidence).min(0.95))
    }
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TextClassifier for LexiconClassifier {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify(&self, text: &str) -> Result<SentimentResult> {
        Ok(Self::score(text))
    }
}
