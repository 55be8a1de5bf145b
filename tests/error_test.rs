//! エラーケーステスト
//!
//! 各種エラー条件でのエラーハンドリングを検証

use cutlist_ingest::config::Config;
use cutlist_ingest::error::CutlistError;
use cutlist_ingest::scanner;
use std::path::Path;
use tempfile::tempdir;

/// 存在しないフォルダをスキャンした場合
#[test]
fn test_scan_nonexistent_folder() {
    let result = scanner::scan_folder(Path::new("/nonexistent/path/12345"));
    assert!(result.is_err());

    let err = result.unwrap_err();
    assert!(matches!(err, CutlistError::FolderNotFound(_)));
}

/// 存在しないパスを解析対象にした場合
#[test]
fn test_scan_nonexistent_path() {
    let err = scanner::scan_path(Path::new("/nonexistent/list.csv")).unwrap_err();
    assert!(matches!(err, CutlistError::FileNotFound(_)));
}

/// 空のフォルダをスキャンした場合
#[test]
fn test_scan_empty_folder() {
    let dir = tempdir().expect("Failed to create temp dir");
    let result = scanner::scan_folder(dir.path());

    // 空フォルダはエラーではなく空のVecを返す
    assert!(result.is_ok());
    assert!(result.unwrap().is_empty());
}

/// カットリストのないフォルダをスキャンした場合
#[test]
fn test_scan_folder_no_cutlists() {
    let dir = tempdir().expect("Failed to create temp dir");

    std::fs::write(dir.path().join("photo.jpg"), "jpeg").unwrap();
    std::fs::write(dir.path().join("data.json"), "{}").unwrap();

    let result = scanner::scan_folder(dir.path());
    assert!(result.is_ok());
    assert!(result.unwrap().is_empty());
}

/// 壊れたスプレッドシートは Spreadsheet エラー
#[test]
fn test_broken_spreadsheet() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("list.xlsx"), "not a workbook").unwrap();

    let inputs = scanner::scan_folder(dir.path()).unwrap();
    assert_eq!(inputs.len(), 1);
    let err = inputs[0].read_text().unwrap_err();
    assert!(matches!(err, CutlistError::Spreadsheet(_)));
}

/// 不正な板厚は設定エラー（保存前に検証）
#[test]
fn test_invalid_thickness_rejected() {
    let mut config = Config::default();
    let err = config.set_thickness(-3.0).unwrap_err();
    assert!(matches!(err, CutlistError::Config(_)));
    assert_eq!(config.default_thickness_mm, 18.0);

    let err = config.set_default_material("   ".to_string()).unwrap_err();
    assert!(matches!(err, CutlistError::Config(_)));
}

/// CutlistErrorのDisplay実装確認
#[test]
fn test_error_display() {
    let errors = vec![
        CutlistError::Config("テスト設定エラー".to_string()),
        CutlistError::MissingProviderCommand("claude".to_string()),
        CutlistError::FileNotFound("list.csv".to_string()),
        CutlistError::FolderNotFound("/path/to/folder".to_string()),
        CutlistError::Spreadsheet("シートがありません".to_string()),
        CutlistError::ProviderCall("AI呼び出し失敗".to_string()),
        CutlistError::NoInputsFound("フォルダ".to_string()),
    ];

    for err in errors {
        let display = format!("{}", err);
        assert!(!display.is_empty(), "エラーメッセージが空: {:?}", err);
    }
}

/// 共通ライブラリのエラーはそのまま表示される
#[test]
fn test_common_error_transparent() {
    let err: CutlistError = cutlist_common::Error::Provider("timeout".to_string()).into();
    assert_eq!(err.to_string(), "Provider error: timeout");
}

/// IOエラーからの変換
#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: CutlistError = io_err.into();
    assert!(matches!(err, CutlistError::Io(_)));
    assert!(err.to_string().contains("file not found"));
}
