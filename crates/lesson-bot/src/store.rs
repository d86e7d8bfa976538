//! Row store abstraction over the request spreadsheet.
//!
//! Rows and columns are 1-based, matching what a person sees in the sheet:
//! `find_row` returning `Some(2)` means spreadsheet row 2.

use std::future::Future;

use crate::errors::StoreError;

/// One sheet of the tabular store.
///
/// The engine only reads whole columns and overwrites single cells; it never
/// inserts or deletes rows.
pub trait RowStore: Send + Sync {
    /// Every cell in `column`, top to bottom. Trailing empty cells may be omitted.
    fn read_column(
        &self,
        column: u32,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Overwrite one cell.
    fn write_cell(
        &self,
        row: u32,
        column: u32,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Row whose `key_column` cell equals `key` after trimming.
    fn find_row(
        &self,
        key_column: u32,
        key: &str,
    ) -> impl Future<Output = Result<Option<u32>, StoreError>> + Send {
        async move {
            let keys = self.read_column(key_column).await?;
            Ok(find_row(&keys, key))
        }
    }
}

/// Opens sheets by spreadsheet id and sheet title.
pub trait Workbook: Send + Sync {
    type Sheet: RowStore;

    fn open(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> impl Future<Output = Result<Self::Sheet, StoreError>> + Send;
}

/// 1-based row of the first cell equal to `key` (both sides trimmed).
///
/// Exact string comparison; an empty key never matches.
pub fn find_row(column: &[String], key: &str) -> Option<u32> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    column
        .iter()
        .position(|cell| cell.trim() == key)
        .and_then(|idx| u32::try_from(idx + 1).ok())
}

/// A1-notation letters for a 1-based column index (`1` → `A`, `27` → `AA`).
pub fn column_letter(column: u32) -> Option<String> {
    if column == 0 {
        return None;
    }
    let mut n = column;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    Some(letters.into_iter().rev().collect())
}
