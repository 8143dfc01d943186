//! Text heuristic.

use nvisy_core::content::{ContentType, TextSpan};
use nvisy_core::quality::{FlagReason, Region, RegionFlag};

use super::{Lexicon, TypeScore};

/// Runs of more non-alphanumeric characters than this inside one token mark
/// it as garbled.
const GARBLED_RUN: usize = 3;

/// Token and character counts of one or more spans.
#[derive(Debug, Default, Clone, Copy)]
struct TextStats {
    tokens: usize,
    words: usize,
    known: usize,
    garbled: usize,
    chars: usize,
    low_confidence_chars: usize,
}

impl TextStats {
    fn measure(span: &TextSpan, lexicon: &dyn Lexicon, floor: f32) -> Self {
        let mut stats = Self::default();

        if span.words.is_empty() {
            let chars = non_whitespace(&span.text);
            stats.chars = chars;
            if span.confidence.is_some_and(|confidence| confidence < floor) {
                stats.low_confidence_chars = chars;
            }
            for token in span.text.split_whitespace() {
                stats.count_token(token, lexicon);
            }
        } else {
            for word in &span.words {
                let chars = non_whitespace(&word.text);
                stats.chars += chars;
                if word.confidence < floor {
                    stats.low_confidence_chars += chars;
                }
                for token in word.text.split_whitespace() {
                    stats.count_token(token, lexicon);
                }
            }
        }

        stats
    }

    fn count_token(&mut self, token: &str, lexicon: &dyn Lexicon) {
        self.tokens += 1;
        if is_garbled(token) {
            self.garbled += 1;
        }
        let word = token.trim_matches(|c: char| !c.is_alphanumeric());
        if !word.is_empty() {
            self.words += 1;
            if lexicon.contains(word) {
                self.known += 1;
            }
        }
    }

    fn add(mut self, other: Self) -> Self {
        self.tokens += other.tokens;
        self.words += other.words;
        self.known += other.known;
        self.garbled += other.garbled;
        self.chars += other.chars;
        self.low_confidence_chars += other.low_confidence_chars;
        self
    }

    fn known_ratio(&self) -> f32 {
        ratio(self.known, self.words)
    }

    fn low_confidence_ratio(&self) -> f32 {
        ratio(self.low_confidence_chars, self.chars)
    }

    fn garbled_ratio(&self) -> f32 {
        ratio(self.garbled, self.tokens)
    }

    fn value(&self) -> f32 {
        if self.tokens == 0 {
            return 0.0;
        }
        0.4 * self.known_ratio()
            + 0.4 * (1.0 - self.low_confidence_ratio())
            + 0.2 * (1.0 - self.garbled_ratio())
    }

    fn weakest_reason(&self) -> FlagReason {
        if self.garbled > 0 {
            FlagReason::Garbled
        } else if self.low_confidence_ratio() >= 1.0 - self.known_ratio() {
            FlagReason::LowConfidence
        } else {
            FlagReason::UnknownWords
        }
    }
}

/// Scores all spans together and flags each span below `threshold`.
pub(super) fn score<'a>(
    spans: impl Iterator<Item = &'a TextSpan>,
    lexicon: &dyn Lexicon,
    floor: f32,
    threshold: f32,
) -> TypeScore {
    let mut total = TextStats::default();
    let mut flags = Vec::new();

    for span in spans {
        let stats = TextStats::measure(span, lexicon, floor);
        if stats.value() < threshold {
            flags.push(RegionFlag::new(
                Region::element(span.position.page, span.position.order),
                ContentType::Text,
                stats.weakest_reason(),
            ));
        }
        total = total.add(stats);
    }

    TypeScore {
        value: total.value().clamp(0.0, 1.0),
        flags,
    }
}

fn is_garbled(token: &str) -> bool {
    let mut run = 0;
    for c in token.chars() {
        if c.is_alphanumeric() {
            run = 0;
        } else {
            run += 1;
            if run > GARBLED_RUN {
                return true;
            }
        }
    }
    false
}

fn non_whitespace(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

fn ratio(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        0.0
    } else {
        part as f32 / whole as f32
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::content::{Position, Word};

    use super::*;
    use crate::quality::HeuristicLexicon;

    fn score_of(span: TextSpan) -> TypeScore {
        score(std::iter::once(&span), &HeuristicLexicon, 0.6, 0.75)
    }

    #[test]
    fn detects_garbled_runs() {
        assert!(is_garbled("ab#$%&cd"));
        assert!(!is_garbled("a--b"));
        assert!(!is_garbled("(c)"));
    }

    #[test]
    fn clean_span_scores_one() {
        let span = TextSpan::plain(Position::new(0, 0), "the quick brown fox", Some(0.9));
        let scored = score_of(span);
        assert!((scored.value - 1.0).abs() < 1e-6);
        assert!(scored.flags.is_empty());
    }

    #[test]
    fn garbled_span_is_flagged() {
        let span = TextSpan::plain(Position::new(2, 1), "#%&@!! ~~~~ xqzkt", Some(0.9));
        let scored = score_of(span);
        assert!(scored.value < 0.75);
        assert_eq!(scored.flags[0].reason, FlagReason::Garbled);
        assert_eq!(scored.flags[0].region, Region::element(2, 1));
    }

    #[test]
    fn low_confidence_words_count_by_characters() {
        let words = vec![Word::new("document", 0.2), Word::new("is", 0.95)];
        let span = TextSpan::from_words(Position::new(0, 0), words);
        let scored = score_of(span);
        // 8 of 10 characters are below the floor.
        let expected = 0.4 + 0.4 * 0.2 + 0.2;
        assert!((scored.value - expected).abs() < 1e-6);
        assert_eq!(scored.flags[0].reason, FlagReason::LowConfidence);
    }

    #[test]
    fn whitespace_only_scores_zero() {
        let span = TextSpan::plain(Position::new(0, 0), "   ", None);
        assert_eq!(score_of(span).value, 0.0);
    }
}
