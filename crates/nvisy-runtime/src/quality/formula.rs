//! Formula heuristic.

use nvisy_core::content::{ContentType, Formula};
use nvisy_core::quality::{FlagReason, Region, RegionFlag};

use super::TypeScore;

/// Parse factor of a formula that came back as prose.
const FREE_TEXT_FACTOR: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parse {
    Structured,
    FreeText,
    Broken,
}

impl Parse {
    fn factor(self) -> f32 {
        match self {
            Self::Structured => 1.0,
            Self::FreeText => FREE_TEXT_FACTOR,
            Self::Broken => 0.0,
        }
    }
}

pub(super) fn score<'a>(formulas: impl Iterator<Item = &'a Formula>, threshold: f32) -> TypeScore {
    let mut values = Vec::new();
    let mut flags = Vec::new();

    for formula in formulas {
        let parse = classify(&formula.latex);
        let confidence = formula.confidence.unwrap_or(1.0).clamp(0.0, 1.0);
        let value = parse.factor() * confidence;

        let reason = match parse {
            Parse::Broken => Some(FlagReason::UnparsedFormula),
            Parse::FreeText => Some(FlagReason::FreeTextFormula),
            Parse::Structured if value < threshold => Some(FlagReason::LowConfidence),
            Parse::Structured => None,
        };
        if let Some(reason) = reason {
            flags.push(RegionFlag::new(
                Region::element(formula.position.page, formula.position.order),
                ContentType::Formulas,
                reason,
            ));
        }
        values.push(value);
    }

    TypeScore::mean(&values, flags)
}

fn classify(latex: &str) -> Parse {
    let latex = latex.trim();
    if latex.is_empty() || !balanced(latex) {
        return Parse::Broken;
    }
    if is_prose(latex) {
        return Parse::FreeText;
    }
    Parse::Structured
}

/// Braces, `\left`/`\right` and `\begin`/`\end` must pair up.
fn balanced(latex: &str) -> bool {
    let mut depth = 0i32;
    let mut escaped = false;
    for c in latex.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
        && latex.matches("\\left").count() == latex.matches("\\right").count()
        && latex.matches("\\begin{").count() == latex.matches("\\end{").count()
}

/// Several plain words and no math syntax at all.
fn is_prose(latex: &str) -> bool {
    let has_math = latex
        .chars()
        .any(|c| matches!(c, '\\' | '^' | '_' | '=' | '+' | '<' | '>' | '{' | '}'));
    let words = latex
        .split_whitespace()
        .filter(|word| word.len() >= 3 && word.chars().all(char::is_alphabetic))
        .count();
    !has_math && words >= 3
}

#[cfg(test)]
mod tests {
    use nvisy_core::content::Position;

    use super::*;

    #[test]
    fn classifies_latex() {
        assert_eq!(classify(r"E = mc^2"), Parse::Structured);
        assert_eq!(classify(r"\frac{a}{b} + \left( x \right)"), Parse::Structured);
        assert_eq!(classify(r"\frac{a}{b"), Parse::Broken);
        assert_eq!(classify(r"\left( x"), Parse::Broken);
        assert_eq!(classify(r"\{ x \}"), Parse::Structured);
        assert_eq!(classify("the energy equals mass times"), Parse::FreeText);
        assert_eq!(classify("  "), Parse::Broken);
    }

    #[test]
    fn free_text_is_flagged() {
        let formula = Formula {
            position: Position::new(4, 2),
            latex: "sum over all items".into(),
            confidence: Some(1.0),
        };
        let scored = score(std::iter::once(&formula), 0.6);
        assert!((scored.value - FREE_TEXT_FACTOR).abs() < 1e-6);
        assert_eq!(scored.flags[0].reason, FlagReason::FreeTextFormula);
    }

    #[test]
    fn confidence_scales_structured_formulas() {
        let formula = Formula {
            position: Position::new(0, 0),
            latex: r"\sqrt{x}".into(),
            confidence: Some(0.9),
        };
        let scored = score(std::iter::once(&formula), 0.6);
        assert!((scored.value - 0.9).abs() < 1e-6);
        assert!(scored.flags.is_empty());
    }
}
