//! Table heuristic.

use nvisy_core::content::{ContentType, Table, TableCell};
use nvisy_core::quality::{FlagReason, Region, RegionFlag};

use super::TypeScore;

/// Cell contents engines emit when they saw a cell but not its text.
const PLACEHOLDERS: [&str; 7] = ["", "-", "—", "n/a", "?", "…", "..."];

const FILL_WEIGHT: f32 = 0.6;
const CONSISTENCY_WEIGHT: f32 = 0.4;

pub(super) fn score<'a>(tables: impl Iterator<Item = &'a Table>, threshold: f32) -> TypeScore {
    let mut values = Vec::new();
    let mut flags = Vec::new();

    for table in tables {
        let fill = fill_ratio(table);
        let consistency = consistency(table);
        let value = FILL_WEIGHT * fill + CONSISTENCY_WEIGHT * consistency;

        if value < threshold {
            let reason = if FILL_WEIGHT * (1.0 - fill) >= CONSISTENCY_WEIGHT * (1.0 - consistency) {
                FlagReason::SparseTable
            } else {
                FlagReason::IrregularTable
            };
            flags.push(RegionFlag::new(
                Region::element(table.position.page, table.position.order),
                ContentType::Tables,
                reason,
            ));
        }
        values.push(value);
    }

    TypeScore::mean(&values, flags)
}

/// Share of cells with real content.
fn fill_ratio(table: &Table) -> f32 {
    let total = table.cell_count();
    if total == 0 {
        return 0.0;
    }
    let filled = table.rows.iter().flatten().filter(|cell| !is_placeholder(cell)).count();
    filled as f32 / total as f32
}

/// Share of rows whose width equals the modal width.
fn consistency(table: &Table) -> f32 {
    if table.rows.is_empty() {
        return 0.0;
    }
    let width = table.column_count();
    let regular = table.rows.iter().filter(|row| row.len() == width).count();
    regular as f32 / table.rows.len() as f32
}

fn is_placeholder(cell: &TableCell) -> bool {
    let text = cell.text.trim().to_lowercase();
    PLACEHOLDERS.contains(&text.as_str())
}

#[cfg(test)]
mod tests {
    use nvisy_core::content::Position;

    use super::*;

    fn table(rows: &[&[&str]]) -> Table {
        Table {
            position: Position::new(1, 0),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|text| TableCell::new(*text)).collect())
                .collect(),
        }
    }

    #[test]
    fn full_regular_table_scores_one() {
        let t = table(&[&["a", "b"], &["1", "2"]]);
        let scored = score(std::iter::once(&t), 0.75);
        assert!((scored.value - 1.0).abs() < 1e-6);
        assert!(scored.flags.is_empty());
    }

    #[test]
    fn placeholders_do_not_count_as_filled() {
        let t = table(&[&["a", "N/A"], &["-", " "]]);
        assert!((fill_ratio(&t) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn ragged_rows_are_irregular() {
        let t = table(&[&["a", "b", "c"], &["d"], &["e"], &["f", "g", "h"], &["i"]]);
        let scored = score(std::iter::once(&t), 0.95);
        assert!((consistency(&t) - 0.6).abs() < 1e-6);
        assert_eq!(scored.flags[0].reason, FlagReason::IrregularTable);
    }
}
