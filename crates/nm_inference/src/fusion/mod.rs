use nm_core::{FusedSentiment, SentimentLabel, SentimentResult};

/// Weights and thresholds of the text/image fusion rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionPolicy {
    pub text_weight: f64,
    pub image_weight: f64,
    /// A lone non-neutral input must be strictly above this to win over a neutral one.
    pub override_threshold: f64,
    /// Weighted scores inside `[-band, band]` are neutral.
    pub neutral_band: f64,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            text_weight: 2.0,
            image_weight: 1.0,
            override_threshold: 0.40,
            neutral_band: 0.1,
        }
    }
}

/// Label for a signed weighted score. The band edges are neutral.
pub fn label_for_score(score: f64, band: f64) -> SentimentLabel {
    if score > band {
        SentimentLabel::Positive
    } else if score < -band {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

#[derive(Debug, Clone, Default)]
pub struct SentimentFusion {
    policy: FusionPolicy,
}

impl SentimentFusion {
    pub fn new(policy: FusionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    /// Combines the text and image results. Pass `SentimentResult::sentinel()`
    /// for a missing image or a failed classifier.
    pub fn fuse(&self, text: &SentimentResult, image: &SentimentResult) -> FusedSentiment {
        match (text.is_neutral(), image.is_neutral()) {
            (true, true) => {
                SentimentResult::new(SentimentLabel::Neutral, (text.confidence + image.confidence) / 2.0)
            }
            (true, false) => self.lone_opinion(image),
            (false, true) => self.lone_opinion(text),
            (false, false) => {
                let p = &self.policy;
                let total = p.text_weight + p.image_weight;
                let score = (p.text_weight * text.label.signed_value() * text.confidence
                    + p.image_weight * image.label.signed_value() * image.confidence)
                    / total;
                SentimentResult::new(label_for_score(score, p.neutral_band), score.abs())
            }
        }
    }

    fn lone_opinion(&self, other: &SentimentResult) -> FusedSentiment {
        if other.confidence > self.policy.override_threshold {
            *other
        } else {
            SentimentResult::new(SentimentLabel::Neutral, other.confidence)
        }
    }
}
