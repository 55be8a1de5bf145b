//! 言語モデルによるフォールバック（第3層）
//!
//! 前の2層で読めなかった残余テキストだけを外部の言語モデルに渡す。
//! 呼び出し手段（CLI・HTTPなど）は `LlmProvider` の実装側に任せ、
//! ここではインターフェースとプロンプト・応答の解読だけを持つ。

pub mod prompt;
pub mod response;

pub use prompt::build_cutlist_prompt;
pub use response::{extract_json, parse_llm_response};

use crate::error::Result;
use crate::types::{CutPart, ParseOptions};
use async_trait::async_trait;

/// 言語モデルの呼び出し結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmParseOutcome {
    pub success: bool,
    pub parts: Vec<CutPart>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl LlmParseOutcome {
    /// 失敗結果
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            parts: Vec::new(),
            error: Some(message.into()),
            warnings: Vec::new(),
        }
    }

    /// モデルの生応答を解読して結果を作る
    pub fn from_response(raw: &str, options: &ParseOptions) -> Self {
        match parse_llm_response(raw, options) {
            Ok((parts, warnings)) if parts.is_empty() => Self {
                success: false,
                parts,
                error: Some("Model returned no usable parts".to_string()),
                warnings,
            },
            Ok((parts, warnings)) => Self {
                success: true,
                parts,
                error: None,
                warnings,
            },
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// 言語モデルの呼び出し口
///
/// 未設定・利用不可の場合でもパイプラインは警告を出して続行する。
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// ログ・警告用の名前
    fn name(&self) -> &str;

    /// 呼び出し可能か
    fn is_configured(&self) -> bool;

    /// テキストを部材に変換する
    async fn parse_text(&self, text: &str, options: &ParseOptions) -> Result<LlmParseOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_response_success() {
        let raw = r#"[{"label": "Door", "length": 700, "width": 400}]"#;
        let outcome = LlmParseOutcome::from_response(raw, &ParseOptions::default());
        assert!(outcome.success);
        assert_eq!(outcome.parts.len(), 1);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_outcome_from_response_empty_array() {
        let outcome = LlmParseOutcome::from_response("[]", &ParseOptions::default());
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_outcome_from_response_no_json() {
        let outcome = LlmParseOutcome::from_response("Sorry, I can't help", &ParseOptions::default());
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("JSON"));
    }
}
