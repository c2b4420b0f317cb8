//! Phrase detection over folded word tokens.
//!
//! Tech-stack vocabulary and role phrases are both matched as contiguous
//! token sequences, so `"ci/cd"` matches "CI / CD" and `"spark"` does not
//! match "sparkling".

use std::collections::BTreeSet;

use unicode_segmentation::UnicodeSegmentation;

use crate::utils::text::fold;

/// Tokenize a string into folded words.
pub fn tokenize(text: &str) -> Vec<String> {
    fold(text).unicode_words().map(String::from).collect()
}

/// A phrase compiled to its token sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    /// The phrase as configured
    pub label: String,
    tokens: Vec<String>,
}

impl Phrase {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let tokens = tokenize(&label);
        Self { label, tokens }
    }

    /// Whether the phrase occurs in a token stream.
    pub fn occurs_in(&self, haystack: &[String]) -> bool {
        if self.tokens.is_empty() || haystack.len() < self.tokens.len() {
            return false;
        }
        haystack
            .windows(self.tokens.len())
            .any(|window| window == self.tokens.as_slice())
    }
}

/// Detector for a fixed vocabulary of tech tokens.
#[derive(Debug, Clone, Default)]
pub struct StackDetector {
    vocabulary: Vec<Phrase>,
}

impl StackDetector {
    /// Build a detector from vocabulary terms.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let vocabulary = terms
            .into_iter()
            .map(|t| Phrase::new(fold(&t.into())))
            .filter(|p| !p.tokens.is_empty())
            .collect();
        Self { vocabulary }
    }

    /// Vocabulary terms present in the text, as folded labels.
    pub fn detect(&self, text: &str) -> BTreeSet<String> {
        let tokens = tokenize(text);
        self.detect_tokens(&tokens)
    }

    /// Same as [`detect`](Self::detect) over pre-tokenized text.
    pub fn detect_tokens(&self, tokens: &[String]) -> BTreeSet<String> {
        self.vocabulary
            .iter()
            .filter(|phrase| phrase.occurs_in(tokens))
            .map(|phrase| phrase.label.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_folds() {
        assert_eq!(
            tokenize("Engenheiro de Automação Sênior"),
            vec!["engenheiro", "de", "automacao", "senior"]
        );
    }

    #[test]
    fn test_phrase_multiword() {
        let phrase = Phrase::new("Hugging Face");
        assert!(phrase.occurs_in(&tokenize("Experience with hugging face models")));
        assert!(!phrase.occurs_in(&tokenize("hugging the face")));
    }

    #[test]
    fn test_detect_punctuated_terms() {
        let detector = StackDetector::new(["ci/cd", "scikit-learn", "python"]);
        let found = detector.detect("CI / CD pipelines, Scikit-Learn and Python 3");
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["ci/cd", "python", "scikit-learn"]
        );
    }

    #[test]
    fn test_detect_requires_whole_words() {
        let detector = StackDetector::new(["spark", "git"]);
        assert!(detector.detect("sparkling digital github").is_empty());
        assert_eq!(detector.detect("Spark and Git").len(), 2);
    }

    #[test]
    fn test_empty_text() {
        let detector = StackDetector::new(["python"]);
        assert!(detector.detect("").is_empty());
    }
}
