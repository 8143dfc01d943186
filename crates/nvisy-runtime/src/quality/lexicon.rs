//! Word recognition for the text heuristic.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{RuntimeError, RuntimeResult};

/// Decides whether a token is a plausible word.
///
/// Tokens arrive with surrounding punctuation already stripped.
pub trait Lexicon: fmt::Debug + Send + Sync {
    fn contains(&self, token: &str) -> bool;
}

/// Dictionary-free lexicon.
///
/// Accepts numbers, short alphanumeric identifiers (`R1`, `C12`) and
/// alphabetic tokens whose letter pattern looks pronounceable. Tokens in
/// non-Latin scripts are accepted as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicLexicon;

impl Lexicon for HeuristicLexicon {
    fn contains(&self, token: &str) -> bool {
        if is_number(token) {
            return true;
        }
        if !token.chars().all(char::is_alphabetic) {
            return is_identifier(token);
        }
        if !token.is_ascii() {
            return true;
        }

        let lower = token.to_ascii_lowercase();
        if lower.len() == 1 {
            return matches!(lower.as_str(), "a" | "i" | "o");
        }
        has_vowel(&lower) && longest_consonant_run(&lower) <= 4 && longest_repeat(&lower) < 3
    }
}

/// Lexicon backed by a word list, one word per line.
#[derive(Debug, Clone, Default)]
pub struct WordListLexicon {
    words: HashSet<String>,
}

impl WordListLexicon {
    /// Builds a lexicon from words; matching is case-insensitive.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        Self { words }
    }

    /// Loads a word list file. Blank lines and `#` comments are skipped.
    pub async fn load(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            RuntimeError::Config(format!("cannot read word list {}: {e}", path.display()))
        })?;
        let lexicon = Self::from_words(contents.lines().filter(|line| !line.trim_start().starts_with('#')));
        if lexicon.is_empty() {
            return Err(RuntimeError::Config(format!(
                "word list {} is empty",
                path.display()
            )));
        }
        Ok(lexicon)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Lexicon for WordListLexicon {
    fn contains(&self, token: &str) -> bool {
        is_number(token) || self.words.contains(&token.to_lowercase())
    }
}

fn is_number(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ':' | '/' | '-' | '%'))
}

fn is_identifier(token: &str) -> bool {
    token.chars().count() <= 4
        && token.chars().all(char::is_alphanumeric)
        && token.chars().any(char::is_alphabetic)
}

fn has_vowel(word: &str) -> bool {
    word.chars().any(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y'))
}

fn longest_consonant_run(word: &str) -> usize {
    word.chars()
        .fold((0, 0), |(longest, current), c| {
            if matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y') {
                (longest, 0)
            } else {
                let current = current + 1;
                (longest.max(current), current)
            }
        })
        .0
}

fn longest_repeat(word: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;
    for c in word.chars() {
        current = if previous == Some(c) { current + 1 } else { 1 };
        longest = longest.max(current);
        previous = Some(c);
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_accepts_words_and_numbers() {
        let lexicon = HeuristicLexicon;
        for token in ["document", "pipeline", "a", "The", "12.5", "2024-01-31", "R1", "Straße"] {
            assert!(lexicon.contains(token), "{token}");
        }
    }

    #[test]
    fn heuristic_rejects_noise() {
        let lexicon = HeuristicLexicon;
        for token in ["xkcdqzt", "q", "aaab", "rnrnrnrn", "Il1lI1l"] {
            assert!(!lexicon.contains(token), "{token}");
        }
    }

    #[test]
    fn word_list_is_case_insensitive() {
        let lexicon = WordListLexicon::from_words(["Resistor", "capacitor"]);
        assert!(lexicon.contains("resistor"));
        assert!(lexicon.contains("CAPACITOR"));
        assert!(lexicon.contains("47"));
        assert!(!lexicon.contains("inductor"));
    }

    #[tokio::test]
    async fn loads_word_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        tokio::fs::write(&path, "# comment\nvoltage\n\ncurrent\n").await.unwrap();

        let lexicon = WordListLexicon::load(&path).await.unwrap();
        assert_eq!(lexicon.len(), 2);
        assert!(lexicon.contains("Voltage"));
    }
}
