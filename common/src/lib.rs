//! Cutlist Common Library
//!
//! カットリスト解析のコア。CLIとホスト側サービスで共有される。
//!
//! - 正規化ユーティリティ（`normalize`）
//! - 形式判定とパースモード推奨（`format`）
//! - 決定的パース・ライン解析・言語モデルの3層（`deterministic` / `regex_parser` / `llm`）
//! - 3層パイプライン（`pipeline`）

pub mod deterministic;
pub mod error;
pub mod format;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod regex_parser;
pub mod types;
pub mod validate;

pub use deterministic::{
    can_parse_deterministically, deterministic_delimiter, parse_deterministic, DeterministicParseResult,
};
pub use error::{Error, Result};
pub use format::mode::{analyze_text_for_parser_mode, ParserMode, ParserModeRecommendation};
pub use format::{detect_format, get_parsing_strategy, FormatDetectionResult, ParsingStrategy, SourceFormat};
pub use llm::{extract_json, LlmParseOutcome, LlmProvider};
pub use pipeline::{fast_parse, parse_three_layers, smart_parse, Layer, ParseStats, ThreeLayerParseResult};
pub use regex_parser::{parse_text_batch, RegexParseResult};
pub use types::{CutPart, DimOrder, Operation, ParseOptions, SourceMethod, Units};
pub use validate::validate_part;
