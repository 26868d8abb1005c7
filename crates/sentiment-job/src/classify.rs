//! Sentiment classification.
//!
//! The job only needs `text -> label`. [`Classify`] is that seam; the
//! built-in [`LexiconClassifier`] scores words against fixed lists and is what
//! the binary uses. Anything else (a model served over HTTP, a local ONNX
//! session) plugs in by implementing the trait.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// A discrete sentiment label, as written to the output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier failed: {message}")]
    Failed { message: String },
}

/// Something that turns text into a [`Sentiment`].
///
/// Implementations see only non-blank text; see [`classify_input`].
pub trait Classify {
    fn classify(&self, text: &str) -> impl Future<Output = Result<Sentiment, ClassifyError>> + Send;
}

/// Label a row's input. NULL and blank text are `neutral` without consulting
/// the classifier, so those rows still get filled and are not selected again.
pub async fn classify_input<C: Classify>(
    classifier: &C,
    text: Option<&str>,
) -> Result<Sentiment, ClassifyError> {
    match text.map(str::trim) {
        None | Some("") => Ok(Sentiment::Neutral),
        Some(text) => classifier.classify(text).await,
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "beautiful", "best", "brilliant", "calm", "clean", "comfortable",
    "delight", "delighted", "delightful", "easy", "efficient", "enjoy", "enjoyed", "excellent",
    "fantastic", "fast", "fine", "friendly", "glad", "good", "great", "happy", "helpful",
    "impressed", "kind", "like", "liked", "love", "loved", "lovely", "nice", "perfect", "pleasant",
    "pleased", "polite", "professional", "quick", "recommend", "reliable", "satisfied", "smooth",
    "superb", "thank", "thanks", "useful", "welcoming", "wonderful",
];

const NEGATIVE_WORDS: &[&str] = &[
    "angry", "annoyed", "awful", "bad", "broken", "careless", "confusing", "delay", "delayed",
    "difficult", "dirty", "disappointed", "disappointing", "dislike", "expensive", "fail",
    "failed", "frustrated", "frustrating", "hate", "hated", "horrible", "lost", "mess", "poor",
    "problem", "rude", "sad", "slow", "terrible", "unacceptable", "unhappy", "unhelpful",
    "useless", "waste", "worse", "worst", "wrong",
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "nothing", "hardly", "without", "isn't", "wasn't", "aren't", "weren't",
    "don't", "doesn't", "didn't", "can't", "cannot", "couldn't", "won't", "wouldn't", "shouldn't",
];

const INTENSIFIERS: &[&str] = &[
    "very", "really", "extremely", "so", "truly", "incredibly", "absolutely", "super",
];

/// Number of following tokens a negator flips.
const NEGATION_WINDOW: usize = 3;

/// Word-list sentiment scoring.
///
/// Each positive word scores +1 and each negative word -1; an intensifier
/// right before a sentiment word doubles it, and a negator flips the sign of
/// sentiment words within the next few tokens. The sign of the total is the
/// label.
#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    positive: HashSet<String>,
    negative: HashSet<String>,
    negators: HashSet<String>,
    intensifiers: HashSet<String>,
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        let set = |words: &[&str]| -> HashSet<String> {
            words.iter().map(|w| w.to_string()).collect()
        };
        Self {
            positive: set(POSITIVE_WORDS),
            negative: set(NEGATIVE_WORDS),
            negators: set(NEGATORS),
            intensifiers: set(INTENSIFIERS),
        }
    }
}

impl LexiconClassifier {
    /// Add domain words to the positive list.
    pub fn with_positive<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.positive
            .extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
        self
    }

    /// Add domain words to the negative list.
    pub fn with_negative<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.negative
            .extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
        self
    }

    /// Raw score of `text`; positive means positive sentiment.
    pub fn score(&self, text: &str) -> i32 {
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .map(|t| t.trim_matches('\''))
            .filter(|t| !t.is_empty());

        let mut score = 0;
        let mut negate_for = 0usize;
        let mut weight = 1;

        for token in tokens {
            if self.negators.contains(token) {
                negate_for = NEGATION_WINDOW;
                continue;
            }
            if self.intensifiers.contains(token) {
                weight = 2;
                continue;
            }

            let polarity = if self.positive.contains(token) {
                1
            } else if self.negative.contains(token) {
                -1
            } else {
                0
            };

            if polarity != 0 {
                let sign = if negate_for > 0 { -1 } else { 1 };
                score += polarity * weight * sign;
                negate_for = 0;
            } else {
                negate_for = negate_for.saturating_sub(1);
            }
            weight = 1;
        }

        score
    }
}

impl Classify for LexiconClassifier {
    async fn classify(&self, text: &str) -> Result<Sentiment, ClassifyError> {
        Ok(match self.score(text) {
            s if s > 0 => Sentiment::Positive,
            s if s < 0 => Sentiment::Negative,
            _ => Sentiment::Neutral,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn label(text: &str) -> Sentiment {
        let classifier = LexiconClassifier::default();
        block_on(classify_input(&classifier, Some(text))).unwrap()
    }

    fn block_on<F: Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[test]
    fn great_service_is_positive() {
        assert_eq!(label("great service"), Sentiment::Positive);
    }

    #[test]
    fn plain_negative() {
        assert_eq!(label("The staff were rude and the wait was terrible."), Sentiment::Negative);
    }

    #[test]
    fn negation_flips() {
        assert_eq!(label("not good at all"), Sentiment::Negative);
        assert_eq!(label("The form wasn't confusing"), Sentiment::Positive);
    }

    #[test]
    fn intensifier_outweighs_single_word() {
        // very good (+2) vs slow (-1)
        assert_eq!(label("very good, if a bit slow"), Sentiment::Positive);
    }

    #[test]
    fn no_sentiment_words_is_neutral() {
        assert_eq!(label("I filed the form on Tuesday"), Sentiment::Neutral);
    }

    #[test]
    fn null_and_blank_input_are_neutral() {
        let classifier = LexiconClassifier::default();
        assert_eq!(
            block_on(classify_input(&classifier, None)).unwrap(),
            Sentiment::Neutral
        );
        assert_eq!(
            block_on(classify_input(&classifier, Some("   \n"))).unwrap(),
            Sentiment::Neutral
        );
    }

    #[test]
    fn custom_words() {
        let classifier = LexiconClassifier::default().with_negative(["Queue"]);
        assert!(classifier.score("long queue") < 0);
    }

    #[test]
    fn labels_are_written_lowercase() {
        let written: Vec<String> = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative]
            .iter()
            .map(|label| label.to_string())
            .collect();
        assert_eq!(written, ["positive", "neutral", "negative"]);
    }

    proptest! {
        #[test]
        fn score_sign_matches_label(text in "\\PC*") {
            let classifier = LexiconClassifier::default();
            let score = classifier.score(&text);
            let sentiment = block_on(classifier.classify(&text)).unwrap();
            match sentiment {
                Sentiment::Positive => prop_assert!(score > 0),
                Sentiment::Negative => prop_assert!(score < 0),
                Sentiment::Neutral => prop_assert_eq!(score, 0),
            }
        }
    }
}
