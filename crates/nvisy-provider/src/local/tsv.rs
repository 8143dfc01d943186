//! Parser for `tesseract ... tsv` output.
//!
//! Columns: level, page_num, block_num, par_num, line_num, word_num, left,
//! top, width, height, conf, text. Only level 5 rows carry words; they are
//! grouped into one span per (block, paragraph, line).

use nvisy_core::content::{ContentElement, Position, TextSpan, Word};

const WORD_LEVEL: u8 = 5;
const COLUMNS: usize = 12;

type LineKey = (u32, u32, u32);

/// Converts TSV output for one image into text spans on `page`.
pub fn parse(tsv: &str, page: u32) -> Vec<ContentElement> {
    let mut lines: Vec<(LineKey, Vec<Word>)> = Vec::new();

    for row in tsv.lines().skip(1) {
        let columns: Vec<&str> = row.splitn(COLUMNS, '\t').collect();
        if columns.len() < COLUMNS {
            continue;
        }
        if columns[0].parse::<u8>().ok() != Some(WORD_LEVEL) {
            continue;
        }

        let text = columns[11].trim();
        if text.is_empty() {
            continue;
        }
        let Some(key) = line_key(&columns) else {
            continue;
        };
        let confidence = columns[10]
            .trim()
            .parse::<f32>()
            .map(|c| (c / 100.0).clamp(0.0, 1.0))
            .unwrap_or(0.0);

        let word = Word::new(text, confidence);
        match lines.last_mut() {
            Some((last, words)) if *last == key => words.push(word),
            _ => lines.push((key, vec![word])),
        }
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(order, (_, words))| {
            ContentElement::Text(TextSpan::from_words(Position::new(page, order as u32), words))
        })
        .collect()
}

fn line_key(columns: &[&str]) -> Option<LineKey> {
    Some((
        columns[2].parse().ok()?,
        columns[3].parse().ok()?,
        columns[4].parse().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2480\t3508\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t500\t40\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t100\t40\t96.5\tInvoice
5\t1\t1\t1\t1\t2\t120\t10\t100\t40\t91\tnumber
5\t1\t1\t1\t2\t1\t10\t60\t100\t40\t43.2\tT0ta1
5\t1\t1\t1\t2\t2\t10\t60\t100\t40\t-1\t 
";

    #[test]
    fn groups_words_by_line() {
        let spans = parse(SAMPLE, 4);
        assert_eq!(spans.len(), 2);

        let ContentElement::Text(first) = &spans[0] else {
            panic!("expected text span");
        };
        assert_eq!(first.text, "Invoice number");
        assert_eq!(first.position, Position::new(4, 0));
        assert!((first.words[0].confidence - 0.965).abs() < 1e-6);

        let ContentElement::Text(second) = &spans[1] else {
            panic!("expected text span");
        };
        assert_eq!(second.words.len(), 1);
        assert_eq!(second.position.order, 1);
    }

    #[test]
    fn tolerates_garbage() {
        assert!(parse("", 0).is_empty());
        assert!(parse("header only", 0).is_empty());
        assert!(parse("h\n5\tbroken row", 0).is_empty());
    }
}
