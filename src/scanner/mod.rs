mod spreadsheet;

pub use spreadsheet::read_first_sheet_as_tsv;

use crate::error::{CutlistError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Spreadsheet,
}

#[derive(Debug, Clone)]
pub struct CutlistInput {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: InputKind,
}

impl CutlistInput {
    /// 入力をテキストとして読む（スプレッドシートはTSVに平坦化）
    pub fn read_text(&self) -> Result<String> {
        match self.kind {
            InputKind::Text => {
                let bytes = std::fs::read(&self.path)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            InputKind::Spreadsheet => read_first_sheet_as_tsv(&self.path),
        }
    }

    /// キャッシュファイルを置くフォルダ
    pub fn folder(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

const TEXT_EXTENSIONS: &[&str] = &["txt", "csv", "tsv"];
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

fn input_kind(path: &Path) -> Option<InputKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(InputKind::Text)
    } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        Some(InputKind::Spreadsheet)
    } else {
        None
    }
}

fn to_input(path: &Path, kind: InputKind) -> CutlistInput {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    CutlistInput {
        path: path.to_path_buf(),
        file_name,
        kind,
    }
}

/// ファイルまたはフォルダを入力リストに変換
///
/// 単一ファイルは拡張子が不明でもテキストとして扱う。
pub fn scan_path(path: &Path) -> Result<Vec<CutlistInput>> {
    if path.is_file() {
        let kind = input_kind(path).unwrap_or(InputKind::Text);
        return Ok(vec![to_input(path, kind)]);
    }
    if path.is_dir() {
        return scan_folder(path);
    }
    Err(CutlistError::FileNotFound(path.display().to_string()))
}

pub fn scan_folder(folder: &Path) -> Result<Vec<CutlistInput>> {
    if !folder.exists() {
        return Err(CutlistError::FolderNotFound(folder.display().to_string()));
    }

    let mut inputs = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)  // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || is_hidden(path) {
            continue;
        }

        if let Some(kind) = input_kind(path) {
            inputs.push(to_input(path, kind));
        }
    }

    // ファイル名でソート
    inputs.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    Ok(inputs)
}

/// キャッシュファイル（.cutlist-cache.json）などの隠しファイル
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;

    #[test]
    fn test_input_kind() {
        assert_eq!(input_kind(Path::new("a.txt")), Some(InputKind::Text));
        assert_eq!(input_kind(Path::new("a.CSV")), Some(InputKind::Text));
        assert_eq!(input_kind(Path::new("a.xlsx")), Some(InputKind::Spreadsheet));
        assert_eq!(input_kind(Path::new("a.ods")), Some(InputKind::Spreadsheet));
        assert_eq!(input_kind(Path::new("a.pdf")), None);
        assert_eq!(input_kind(Path::new("noext")), None);
    }

    #[test]
    fn test_scan_folder_not_found() {
        let result = scan_folder(Path::new("/nonexistent/folder"));
        assert!(matches!(result, Err(CutlistError::FolderNotFound(_))));
    }

    #[test]
    fn test_scan_folder_with_inputs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();

        File::create(dir.join("b.csv")).unwrap().write_all(b"L,W\n1,2").unwrap();
        File::create(dir.join("a.txt")).unwrap().write_all(b"720x560").unwrap();
        File::create(dir.join("c.xlsx")).unwrap().write_all(b"dummy").unwrap();
        File::create(dir.join("photo.jpg")).unwrap().write_all(b"dummy").unwrap();
        File::create(dir.join(".cutlist-cache.json")).unwrap().write_all(b"{}").unwrap();
        fs::create_dir(dir.join("nested.txt")).unwrap();

        let result = scan_folder(dir).unwrap();
        let names: Vec<&str> = result.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.csv", "c.xlsx"]);
        assert_eq!(result[2].kind, InputKind::Spreadsheet);
    }

    #[test]
    fn test_scan_single_file_any_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notes.md");
        fs::write(&path, "Shelf 560 x 300").unwrap();

        let result = scan_path(&path).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, InputKind::Text);
        assert_eq!(result[0].read_text().unwrap(), "Shelf 560 x 300");
        assert_eq!(result[0].folder(), temp_dir.path());
    }

    #[test]
    fn test_scan_path_missing() {
        let result = scan_path(Path::new("/nonexistent/cutlist.txt"));
        assert!(matches!(result, Err(CutlistError::FileNotFound(_))));
    }
}
