//! cutlist-ingest
//!
//! カットリスト（CSV/TSV・スプレッドシート・自由記述）を取り込み、
//! cutlist_common の3層パイプラインで部材に変換するCLIのライブラリ部分。

pub mod ai_provider;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod scanner;
