//! スプレッドシートの読み込み
//!
//! 先頭シートをタブ区切りテキストに平坦化し、表形式として決定的パースに渡す。

use crate::error::{CutlistError, Result};
use calamine::{open_workbook_auto, Reader};
use std::path::Path;

/// 先頭シートをTSVテキストに変換
pub fn read_first_sheet_as_tsv(path: &Path) -> Result<String> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| CutlistError::Spreadsheet(format!("{}: {}", path.display(), e)))?;

    let sheet_names = workbook.sheet_names();
    let sheet_name = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| CutlistError::Spreadsheet(format!("{}: シートがありません", path.display())))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| CutlistError::Spreadsheet(format!("{}: {}", sheet_name, e)))?;

    let lines: Vec<String> = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| cell_text(&cell.to_string()))
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect();

    Ok(join_rows(lines))
}

/// セル内の改行・タブは空白に置き換える
fn cell_text(raw: &str) -> String {
    raw.replace(['\t', '\r', '\n'], " ").trim().to_string()
}

/// 行末の空セルを落とし、空行は空行のまま残す
fn join_rows(lines: Vec<String>) -> String {
    lines
        .into_iter()
        .map(|line| line.trim_end_matches('\t').to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_flattens_breaks() {
        assert_eq!(cell_text(" Side\tpanel\n"), "Side panel");
    }

    #[test]
    fn test_join_rows_trims_trailing_cells() {
        let text = join_rows(vec!["Part\tL\tW\t\t".into(), "".into(), "A\t100\t50".into()]);
        assert_eq!(text, "Part\tL\tW\n\nA\t100\t50");
    }

    #[test]
    fn test_unreadable_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        let result = read_first_sheet_as_tsv(&path);
        assert!(matches!(result, Err(CutlistError::Spreadsheet(_))));
    }
}
