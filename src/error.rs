use thiserror::Error;

#[derive(Error, Debug)]
pub enum CutlistError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("AIコマンドが見つかりません: {0}（PATHを確認するか `cutlist config --set-provider-command` で指定してください）")]
    MissingProviderCommand(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("スプレッドシート読み込みエラー: {0}")]
    Spreadsheet(String),

    #[error("AI呼び出しエラー: {0}")]
    ProviderCall(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("カットリストが見つかりません: {0}")]
    NoInputsFound(String),

    #[error(transparent)]
    Parse(#[from] cutlist_common::Error),
}

pub type Result<T> = std::result::Result<T, CutlistError>;
