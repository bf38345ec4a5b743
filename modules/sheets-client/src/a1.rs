//! A1-notation helpers.

use crate::error::{Result, SheetsError};

/// 1-based column number to its letter name: 1 → "A", 27 → "AA".
pub fn column_letter(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Letter name to its 1-based column number: "A" → 1, "AA" → 27.
pub fn column_number(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(SheetsError::InvalidRange("empty column name".to_string()));
    }
    letters.chars().try_fold(0u32, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return Err(SheetsError::InvalidRange(format!("bad column name {letters:?}")));
        }
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        acc.checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| SheetsError::InvalidRange(format!("column {letters:?} out of range")))
    })
}

/// Whole-column range for a 1-based column number: 3 → "C:C".
pub fn whole_column(column: u32) -> String {
    let letter = column_letter(column);
    format!("{letter}:{letter}")
}

/// Rectangular range spanning `width` columns from `start_column` over rows
/// `first_row..=last_row`: ("B", 6, 3, 10) → "B3:G10".
pub fn block_range(start_column: &str, width: u32, first_row: u32, last_row: u32) -> Result<String> {
    if width == 0 {
        return Err(SheetsError::InvalidRange("zero-width range".to_string()));
    }
    if first_row == 0 || last_row < first_row {
        return Err(SheetsError::InvalidRange(format!(
            "rows {first_row}..={last_row}"
        )));
    }
    let start = column_number(start_column)?;
    let end = column_letter(start + width - 1);
    Ok(format!("{}{first_row}:{end}{last_row}", column_letter(start)))
}

/// Qualify a range with a worksheet name: ("Data sheet", "A:A") → "'Data sheet'!A:A".
pub fn qualified(sheet: &str, range: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_round_trip_at_boundaries() {
        for (n, s) in [(1, "A"), (26, "Z"), (27, "AA"), (52, "AZ"), (53, "BA"), (702, "ZZ"), (703, "AAA")] {
            assert_eq!(column_letter(n), s);
            assert_eq!(column_number(s).unwrap(), n);
        }
    }

    #[test]
    fn column_number_is_case_insensitive() {
        assert_eq!(column_number("b").unwrap(), 2);
    }

    #[test]
    fn column_number_rejects_garbage() {
        assert!(column_number("").is_err());
        assert!(column_number("B2").is_err());
    }

    #[test]
    fn block_range_spans_width_and_rows() {
        assert_eq!(block_range("B", 6, 3, 10).unwrap(), "B3:G10");
        assert_eq!(block_range("A", 1, 5, 5).unwrap(), "A5:A5");
        assert_eq!(block_range("Y", 3, 1, 2).unwrap(), "Y1:AA2");
    }

    #[test]
    fn block_range_rejects_inverted_rows() {
        assert!(block_range("A", 2, 10, 3).is_err());
        assert!(block_range("A", 0, 1, 3).is_err());
    }

    #[test]
    fn qualified_quotes_sheet_name() {
        assert_eq!(whole_column(1), "A:A");
        assert_eq!(qualified("Groups", "A:A"), "'Groups'!A:A");
        assert_eq!(qualified("Bob's", "B2:C3"), "'Bob''s'!B2:C3");
    }
}
