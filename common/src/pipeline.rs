//! 3層パイプライン
//!
//! 形式判定 → 決定的パース → ライン解析 → 言語モデル の順に、
//! 前の層が読めなかった行（残余）だけを次の層へ渡す。
//!
//! ## 処理フロー
//! 1. 空入力なら `Empty input` エラー付きの結果を返す
//! 2. 整形・行数上限での切り詰め・形式判定
//! 3. 実行する層の計画（表形式なら決定的パースから）
//! 4. 各層を順に実行（層の失敗は警告に変換して続行）
//! 5. 部材IDの振り直し・検証・集計
//!
//! どの層の失敗でも全体は失敗しない。

use crate::deterministic::{deterministic_delimiter, parse_deterministic_lines};
use crate::format::mode::{analyze_text_for_parser_mode, ParserMode, ParserModeRecommendation};
use crate::format::{
    detect_format, get_parsing_strategy, DetectionMethod, FormatDetectionResult, ParsingStrategy,
    SourceFormat,
};
use crate::llm::LlmProvider;
use crate::normalize::{clean_text, mean_confidence, non_blank_lines};
use crate::regex_parser::parse_text_batch;
use crate::types::{CutPart, Delimiter, FailedRow, ParseOptions};
use crate::validate::annotate_part;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// パース層
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Deterministic,
    Regex,
    Llm,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Deterministic => "deterministic",
            Layer::Regex => "regex",
            Layer::Llm => "llm",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 集計
///
/// `failed = total_lines - parts`（0で止める）。
/// 各部材が1行から来る場合は
/// `parsed_* + unresolved + skipped == total_lines` が成り立つ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// 空行を除いた入力行数
    pub total_lines: usize,
    pub parsed_deterministic: usize,
    pub parsed_regex: usize,
    pub parsed_llm: usize,
    pub failed: usize,
    /// どの層でも読めなかった行数
    pub unresolved: usize,
    /// ヘッダー行・空データ行として読み飛ばした行数
    pub skipped: usize,
}

impl ParseStats {
    pub fn parsed_total(&self) -> usize {
        self.parsed_deterministic + self.parsed_regex + self.parsed_llm
    }
}

/// パイプライン全体の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeLayerParseResult {
    pub parts: Vec<CutPart>,
    pub stats: ParseStats,
    pub detected_format: FormatDetectionResult,
    pub strategy: ParsingStrategy,
    /// 言語モデル層の前に残余テキストで求めた推奨モード
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_mode: Option<ParserModeRecommendation>,
    pub layers_used: Vec<Layer>,
    pub average_confidence: f64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// 最後まで読めなかった行
    pub unresolved_lines: Vec<FailedRow>,
    pub elapsed_ms: u64,
}

impl ThreeLayerParseResult {
    pub fn is_success(&self) -> bool {
        !self.parts.is_empty() && self.errors.is_empty()
    }
}

/// 層の間で受け渡す未解決行（行番号付き）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Residue {
    lines: Vec<FailedRow>,
}

impl Residue {
    /// テキストの空でない全行
    pub fn from_text(text: &str) -> Self {
        let lines = non_blank_lines(text)
            .into_iter()
            .map(|(index, raw)| FailedRow {
                index,
                raw: raw.to_string(),
                reason: String::new(),
            })
            .collect();
        Self { lines }
    }

    pub fn from_failed(lines: Vec<FailedRow>) -> Self {
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn as_lines(&self) -> Vec<(usize, &str)> {
        self.lines.iter().map(|l| (l.index, l.raw.as_str())).collect()
    }

    /// 改行で連結したテキスト（言語モデル・モード判定用）
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 行番号順に連結する
    pub fn merge(mut self, other: Residue) -> Self {
        self.lines.extend(other.lines);
        self.lines.sort_by_key(|l| l.index);
        self
    }

    pub fn into_failed(self) -> Vec<FailedRow> {
        self.lines
    }
}

/// 1層分の出力
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub parts: Vec<CutPart>,
    pub residue: Residue,
    pub skipped: usize,
    pub warnings: Vec<String>,
    /// 以降の層を実行しない
    pub halt: bool,
    /// ヘッダーより前の行（停止してもライン解析には回す）
    pub preamble: Residue,
}

/// 決定的パース層
pub fn deterministic_stage(
    residue: &Residue,
    options: &ParseOptions,
    delimiter_hint: Option<Delimiter>,
) -> StageOutput {
    let mut layer_options = options.clone();
    if layer_options.delimiter.is_none() {
        layer_options.delimiter = delimiter_hint;
    }

    let result = parse_deterministic_lines(&residue.as_lines(), &layer_options);

    // 列判定できなければ入力をそのまま次の層へ
    if result.header_index.is_none() {
        let reason = result
            .failed_rows
            .first()
            .map(|r| r.reason.clone())
            .unwrap_or_else(|| "no header row".to_string());
        return StageOutput {
            residue: residue.clone(),
            warnings: vec![format!("Deterministic layer declined: {}", reason)],
            ..StageOutput::default()
        };
    }

    let header_skipped = usize::from(options.skip_header);
    let header_index = result.header_index.unwrap_or(0);
    let (preamble, failed): (Vec<FailedRow>, Vec<FailedRow>) = result
        .failed_rows
        .into_iter()
        .partition(|row| row.index < header_index);
    StageOutput {
        skipped: result.skipped_rows + header_skipped,
        halt: result.skip_other_layers,
        parts: result.parts,
        residue: Residue::from_failed(failed),
        warnings: Vec::new(),
        preamble: Residue::from_failed(preamble),
    }
}

/// ライン解析層
pub fn regex_stage(residue: &Residue, options: &ParseOptions) -> StageOutput {
    let result = parse_text_batch(&residue.as_lines(), options);
    StageOutput {
        parts: result.parts,
        residue: Residue::from_failed(result.failed_lines),
        ..StageOutput::default()
    }
}

/// 言語モデル層
///
/// 失敗・タイムアウト・未設定はすべて警告に変換し、残余はそのまま残す。
pub async fn llm_stage(
    residue: &Residue,
    options: &ParseOptions,
    provider: Option<&dyn LlmProvider>,
) -> StageOutput {
    let unresolved = |warning: String| StageOutput {
        residue: residue.clone(),
        warnings: vec![warning],
        ..StageOutput::default()
    };

    if !options.use_llm_fallback {
        return unresolved(format!(
            "LLM fallback disabled; {} line(s) left unparsed",
            residue.len()
        ));
    }

    let provider = match provider {
        Some(p) if p.is_configured() => p,
        Some(p) => {
            return unresolved(format!(
                "LLM provider '{}' is not configured; {} line(s) left unparsed",
                p.name(),
                residue.len()
            ))
        }
        None => {
            return unresolved(format!(
                "No LLM provider configured; {} line(s) left unparsed",
                residue.len()
            ))
        }
    };

    let text = residue.text();
    let call = provider.parse_text(&text, options);
    let outcome = match options.llm_timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                return unresolved(format!(
                    "LLM provider '{}' timed out after {:?}",
                    provider.name(),
                    limit
                ))
            }
        },
        None => call.await,
    };

    match outcome {
        Ok(outcome) if outcome.success => StageOutput {
            parts: outcome.parts,
            warnings: outcome.warnings,
            ..StageOutput::default()
        },
        Ok(outcome) => {
            let mut output = unresolved(format!(
                "LLM provider '{}' returned no parts: {}",
                provider.name(),
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
            output.warnings.extend(outcome.warnings);
            output
        }
        Err(e) => unresolved(format!("LLM provider '{}' failed: {}", provider.name(), e)),
    }
}

/// 層を順に流す状態
struct Cascade {
    options: ParseOptions,
    started: Instant,
    detected_format: FormatDetectionResult,
    strategy: ParsingStrategy,
    plan: Vec<Layer>,
    delimiter_hint: Option<Delimiter>,
    residue: Residue,
    /// 停止後も未解決のまま残す行
    held: Residue,
    total_lines: usize,
    collected: Vec<(Layer, Vec<CutPart>)>,
    skipped: usize,
    warnings: Vec<String>,
    parser_mode: Option<ParserModeRecommendation>,
    halted: bool,
}

impl Cascade {
    /// 入力の準備と層の計画。空入力は完成した結果を返す。
    fn prepare(text: &str, options: &ParseOptions) -> Result<Self, ThreeLayerParseResult> {
        let started = Instant::now();

        if text.trim().is_empty() {
            return Err(ThreeLayerParseResult {
                parts: Vec::new(),
                stats: ParseStats::default(),
                detected_format: detect_format(""),
                strategy: ParsingStrategy::Llm,
                parser_mode: None,
                layers_used: Vec::new(),
                average_confidence: 0.0,
                warnings: Vec::new(),
                errors: vec!["Empty input".to_string()],
                unresolved_lines: Vec::new(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        let mut warnings = Vec::new();
        let cleaned = clean_text(text);
        let line_count = cleaned.lines().count();
        let cleaned = if options.max_lines > 0 && line_count > options.max_lines {
            warnings.push(format!(
                "Input truncated to {} lines ({} received)",
                options.max_lines, line_count
            ));
            warn!(max = options.max_lines, received = line_count, "入力を切り詰めました");
            cleaned
                .lines()
                .take(options.max_lines)
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            cleaned
        };

        let detected_format = match options.format_hint {
            Some(format) if format != SourceFormat::Auto => FormatDetectionResult {
                format,
                confidence: 1.0,
                method: DetectionMethod::Hint,
                metadata: detect_format(&cleaned).metadata,
            },
            _ => detect_format(&cleaned),
        };
        let strategy = get_parsing_strategy(detected_format.format);

        // 事前判定で通った区切り文字を決定的パースでも使う
        let table_delimiter = deterministic_delimiter(&cleaned);
        let delimiter_hint = detected_format.delimiter().or(table_delimiter);

        let mut plan = Vec::new();
        if strategy == ParsingStrategy::Deterministic || table_delimiter.is_some() {
            plan.push(Layer::Deterministic);
        }
        plan.push(Layer::Regex);
        if !(strategy == ParsingStrategy::Llm && !options.use_llm_fallback) {
            plan.push(Layer::Llm);
        }

        debug!(
            format = %detected_format.format,
            confidence = detected_format.confidence,
            ?strategy,
            ?plan,
            "形式判定"
        );

        let residue = Residue::from_text(&cleaned);
        Ok(Self {
            options: options.clone(),
            started,
            detected_format,
            strategy,
            plan,
            delimiter_hint,
            total_lines: residue.len(),
            residue,
            held: Residue::default(),
            collected: Vec::new(),
            skipped: 0,
            warnings,
            parser_mode: None,
            halted: false,
        })
    }

    /// 残余がなく停止もしていなければ続行
    fn should_continue(&self) -> bool {
        !self.halted && !self.residue.is_empty()
    }

    fn absorb(&mut self, layer: Layer, output: StageOutput) {
        debug!(
            layer = %layer,
            parts = output.parts.len(),
            residue = output.residue.len(),
            halt = output.halt,
            "層の実行完了"
        );
        for warning in &output.warnings {
            warn!(layer = %layer, "{}", warning);
        }
        self.warnings.extend(output.warnings);
        self.skipped += output.skipped;
        if output.halt && !output.preamble.is_empty() {
            // 表は読み終えたが、前置き行はライン解析だけ通す
            self.held = std::mem::take(&mut self.held).merge(output.residue);
            self.residue = output.preamble;
            self.plan.retain(|l| *l == Layer::Regex);
            self.halted = false;
        } else {
            self.residue = output.residue.merge(output.preamble);
            self.halted = output.halt;
        }
        if !output.parts.is_empty() {
            self.collected.push((layer, output.parts));
        }
    }

    /// 同期で実行できる層を流す（言語モデル層の手前で止まる）
    fn run_local_layers(&mut self) {
        while self.should_continue() {
            let output = match self.plan.first() {
                Some(Layer::Deterministic) => {
                    deterministic_stage(&self.residue, &self.options, self.delimiter_hint)
                }
                Some(Layer::Regex) => regex_stage(&self.residue, &self.options),
                Some(Layer::Llm) | None => break,
            };
            let layer = self.plan.remove(0);
            self.absorb(layer, output);
        }
    }

    async fn run_llm_layer(&mut self, provider: Option<&dyn LlmProvider>) {
        if !self.should_continue() || self.plan.first() != Some(&Layer::Llm) {
            return;
        }
        let layer = self.plan.remove(0);

        let recommendation = analyze_text_for_parser_mode(&self.residue.text());
        debug!(
            recommended = ?recommendation.recommended,
            confidence = recommendation.confidence,
            "残余テキストの推奨モード"
        );
        let will_call = self.options.use_llm_fallback && provider.is_some_and(|p| p.is_configured());
        if will_call && recommendation.recommended == ParserMode::Pattern {
            let warning = format!(
                "Remaining {} line(s) look pattern-parseable ({:.2}); sending to LLM anyway",
                self.residue.len(),
                recommendation.confidence
            );
            warn!("{}", warning);
            self.warnings.push(warning);
        }
        self.parser_mode = Some(recommendation);

        let output = llm_stage(&self.residue, &self.options, provider).await;
        self.absorb(layer, output);
    }

    /// 言語モデルを使わない場合の締め
    fn skip_llm_layer(&mut self) {
        if self.should_continue() && self.plan.first() == Some(&Layer::Llm) {
            self.warnings.push(format!(
                "LLM fallback disabled; {} line(s) left unparsed",
                self.residue.len()
            ));
        }
    }

    fn finish(self) -> ThreeLayerParseResult {
        let mut layers_used = Vec::new();
        let mut parts = Vec::new();
        let mut stats = ParseStats {
            total_lines: self.total_lines,
            skipped: self.skipped,
            unresolved: self.residue.len() + self.held.len(),
            ..ParseStats::default()
        };

        for (layer, layer_parts) in self.collected {
            match layer {
                Layer::Deterministic => stats.parsed_deterministic += layer_parts.len(),
                Layer::Regex => stats.parsed_regex += layer_parts.len(),
                Layer::Llm => stats.parsed_llm += layer_parts.len(),
            }
            if !layers_used.contains(&layer) {
                layers_used.push(layer);
            }
            parts.extend(layer_parts);
        }

        for (i, part) in parts.iter_mut().enumerate() {
            part.part_id = format!("P{:03}", i + 1);
            annotate_part(part);
        }

        stats.failed = stats.total_lines.saturating_sub(parts.len());

        let mut warnings = self.warnings;
        if stats.unresolved > 0 {
            warnings.push(format!("{} line(s) could not be parsed", stats.unresolved));
        }
        let errors = if parts.is_empty() {
            vec!["No parts could be parsed".to_string()]
        } else {
            Vec::new()
        };

        let average_confidence = mean_confidence(&parts);
        let elapsed_ms = self.started.elapsed().as_millis() as u64;

        info!(
            parts = parts.len(),
            layers = ?layers_used,
            unresolved = stats.unresolved,
            confidence = average_confidence,
            elapsed_ms,
            "パース完了"
        );

        ThreeLayerParseResult {
            parts,
            stats,
            detected_format: self.detected_format,
            strategy: self.strategy,
            parser_mode: self.parser_mode,
            layers_used,
            average_confidence,
            warnings,
            errors,
            unresolved_lines: self.residue.merge(self.held).into_failed(),
            elapsed_ms,
        }
    }
}

/// 3層すべてを実行する
///
/// `provider` が None または未設定の場合、言語モデル層は警告だけ残してスキップする。
pub async fn parse_three_layers(
    text: &str,
    options: &ParseOptions,
    provider: Option<&dyn LlmProvider>,
) -> ThreeLayerParseResult {
    let mut cascade = match Cascade::prepare(text, options) {
        Ok(cascade) => cascade,
        Err(result) => return result,
    };
    cascade.run_local_layers();
    cascade.run_llm_layer(provider).await;
    cascade.finish()
}

/// 言語モデル層を有効にして実行する
pub async fn smart_parse(
    text: &str,
    options: &ParseOptions,
    provider: Option<&dyn LlmProvider>,
) -> ThreeLayerParseResult {
    let options = ParseOptions {
        use_llm_fallback: true,
        ..options.clone()
    };
    parse_three_layers(text, &options, provider).await
}

/// 言語モデル層を使わずに同期で実行する
pub fn fast_parse(text: &str, options: &ParseOptions) -> ThreeLayerParseResult {
    let options = ParseOptions {
        use_llm_fallback: false,
        ..options.clone()
    };
    let mut cascade = match Cascade::prepare(text, &options) {
        Ok(cascade) => cascade,
        Err(result) => return result,
    };
    cascade.run_local_layers();
    cascade.skip_llm_layer();
    cascade.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::llm::LlmParseOutcome;
    use crate::types::{Size, SourceMethod};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const MIXED: &str = "Part\tL\tW\tQty\nA\t100\t50\t2\nB\t200\t100\t1\nSide panel 720x560 qty 2";

    /// 決まった応答を返す言語モデル
    struct ScriptedProvider {
        configured: bool,
        response: std::result::Result<String, String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn replying(response: &str) -> Self {
            Self {
                configured: true,
                response: Ok(response.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                ..Self::replying("")
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn parse_text(&self, _text: &str, options: &ParseOptions) -> Result<LlmParseOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.response {
                Ok(raw) => Ok(LlmParseOutcome::from_response(raw, options)),
                Err(message) => Err(Error::Provider(message.clone())),
            }
        }
    }

    // =============================================
    // 空入力・切り詰め
    // =============================================

    #[test]
    fn test_empty_input() {
        let result = fast_parse("   \n  ", &ParseOptions::default());
        assert_eq!(result.errors, vec!["Empty input".to_string()]);
        assert!(result.parts.is_empty());
        assert_eq!(result.detected_format.format, SourceFormat::FreeForm);
        assert_eq!(result.stats, ParseStats::default());
    }

    #[test]
    fn test_truncates_long_input() {
        let text = (0..20)
            .map(|i| format!("Shelf {} 560x300", i))
            .collect::<Vec<_>>()
            .join("\n");
        let options = ParseOptions {
            max_lines: 5,
            ..ParseOptions::default()
        };
        let result = fast_parse(&text, &options);
        assert_eq!(result.parts.len(), 5);
        assert_eq!(result.stats.total_lines, 5);
        assert!(result.warnings.iter().any(|w| w.contains("truncated")));
    }

    // =============================================
    // 層の連携
    // =============================================

    #[test]
    fn test_sentence_before_table() {
        let text = "Side panel 720x560 qty 2\nPart\tL\tW\tQty\nA\t100\t50\t2\nB\t200\t100\t1";
        let result = fast_parse(text, &ParseOptions::default());
        assert_eq!(result.layers_used, vec![Layer::Deterministic, Layer::Regex]);
        assert_eq!(result.stats.parsed_deterministic, 2);
        assert_eq!(result.stats.parsed_regex, 1);
        assert!(result.unresolved_lines.is_empty());
        assert_eq!(result.parts[2].size, Size::new(720.0, 560.0));
    }

    #[tokio::test]
    async fn test_title_before_table_stays_out_of_llm() {
        let provider = ScriptedProvider::replying(r#"[{"L": 100, "W": 50}]"#);
        let text = "Kitchen job 42\nPart\tL\tW\nA\t100\t50\nB\t200\t80";
        let result = smart_parse(text, &ParseOptions::default(), Some(&provider)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.layers_used, vec![Layer::Deterministic]);
        assert_eq!(result.stats.unresolved, 1);
        assert_eq!(result.unresolved_lines[0].raw, "Kitchen job 42");
        let stats = &result.stats;
        assert_eq!(stats.parsed_total() + stats.unresolved + stats.skipped, stats.total_lines);
    }

    #[test]
    fn test_short_csv_uses_checked_delimiter() {
        let result = fast_parse("Length,Width\n720,560", &ParseOptions::default());
        assert_eq!(result.layers_used, vec![Layer::Deterministic]);
        assert_eq!(result.parts.len(), 1);
        assert_eq!(result.parts[0].size, Size::new(720.0, 560.0));
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_overflowing_dimension_not_accepted() {
        let text = format!("Shelf {}x300", "9".repeat(400));
        let result = fast_parse(&text, &ParseOptions::default());
        assert!(result.parts.is_empty());
        assert_eq!(result.stats.unresolved, 1);
    }

    #[test]
    fn test_mixed_table_and_sentence() {
        let result = fast_parse(MIXED, &ParseOptions::default());
        assert_eq!(result.layers_used, vec![Layer::Deterministic, Layer::Regex]);
        assert_eq!(result.stats.parsed_deterministic, 2);
        assert_eq!(result.stats.parsed_regex, 1);
        assert_eq!(result.parts.len(), 3);
        assert_eq!(result.parts[2].size, Size::new(720.0, 560.0));
        assert_eq!(result.parts[2].qty, 2);
        assert_eq!(result.parts[2].audit.source_method, SourceMethod::PasteParser);
        let ids: Vec<&str> = result.parts.iter().map(|p| p.part_id.as_str()).collect();
        assert_eq!(ids, vec!["P001", "P002", "P003"]);
    }

    #[test]
    fn test_clean_table_skips_other_layers() {
        let text = "Part,Length,Width,Qty\nSide,720,560,2\nTop,800,560,1\nShelf,560,300,3";
        let result = fast_parse(text, &ParseOptions::default());
        assert_eq!(result.layers_used, vec![Layer::Deterministic]);
        assert_eq!(result.strategy, ParsingStrategy::Deterministic);
        assert_eq!(result.stats.parsed_deterministic, 3);
        assert_eq!(result.stats.skipped, 1);
        assert_eq!(result.stats.unresolved, 0);
        assert!((result.average_confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_free_text_goes_to_regex() {
        let text = "Side panel 720x560 qty 2\nShelf 560x300 x3\nsome note about delivery";
        let result = fast_parse(text, &ParseOptions::default());
        assert_eq!(result.layers_used, vec![Layer::Regex]);
        assert_eq!(result.stats.parsed_regex, 2);
        assert_eq!(result.stats.unresolved, 1);
        assert_eq!(result.unresolved_lines[0].index, 2);
        assert!(result.warnings.iter().any(|w| w.contains("could not be parsed")));
    }

    #[test]
    fn test_conservation_of_lines() {
        let text = "Part,L,W\nA,100,50\nSubtotal,,\nB,oops,50\nnot a part at all";
        let result = fast_parse(text, &ParseOptions::default());
        let stats = &result.stats;
        assert_eq!(stats.total_lines, 5);
        assert_eq!(stats.parsed_total() + stats.unresolved + stats.skipped, stats.total_lines);
        assert_eq!(stats.failed, stats.total_lines - result.parts.len());
    }

    #[test]
    fn test_idempotent_without_llm() {
        let first = fast_parse(MIXED, &ParseOptions::default());
        let second = fast_parse(MIXED, &ParseOptions::default());
        assert_eq!(first.parts, second.parts);
        assert_eq!(first.stats, second.stats);
        assert_eq!(first.layers_used, second.layers_used);
    }

    #[test]
    fn test_dimension_invariant() {
        let text = "Part,L,W,T,Qty\nA,100,50,-3,0\nB,0,0,,\nC 1/2 x 3/4\nD 720x560x0";
        let result = fast_parse(text, &ParseOptions::default());
        assert!(!result.parts.is_empty());
        assert!(result.parts.iter().all(|p| p.satisfies_invariants()));
    }

    #[test]
    fn test_format_hint_overrides_detection() {
        let options = ParseOptions {
            format_hint: Some(SourceFormat::Excel),
            ..ParseOptions::default()
        };
        let result = fast_parse("L W\n100 50", &options);
        assert_eq!(result.detected_format.method, DetectionMethod::Hint);
        assert_eq!(result.strategy, ParsingStrategy::Deterministic);
    }

    #[test]
    fn test_space_aligned_table_uses_metadata_delimiter() {
        let text = "Part name    Length    Width\nSide panel   720       560\nTop          800       560";
        let result = fast_parse(text, &ParseOptions::default());
        assert_eq!(result.detected_format.format, SourceFormat::GenericTable);
        assert_eq!(result.layers_used, vec![Layer::Deterministic]);
        assert_eq!(result.parts[0].label.as_deref(), Some("Side panel"));
    }

    #[test]
    fn test_validation_warning_attached() {
        let text = "Part,L,W,T\nA,720,560,250";
        let result = fast_parse(text, &ParseOptions::default());
        assert!(!result.parts[0].audit.warnings.is_empty());
    }

    // =============================================
    // 言語モデル層
    // =============================================

    #[tokio::test]
    async fn test_llm_resolves_residue() {
        let provider = ScriptedProvider::replying(
            r#"[{"label": "Door", "L": 700, "W": 400, "qty": 2, "confidence": 0.6}]"#,
        );
        let text = "Side panel 720x560 qty 2\ntwo doors, the usual size for the upper cabinets";
        let result = smart_parse(text, &ParseOptions::default(), Some(&provider)).await;
        assert_eq!(result.layers_used, vec![Layer::Regex, Layer::Llm]);
        assert_eq!(result.stats.parsed_llm, 1);
        assert_eq!(result.stats.unresolved, 0);
        assert_eq!(result.parts[1].part_id, "P002");
        assert!(result.parser_mode.is_some());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_llm_not_called_when_nothing_left() {
        let provider = ScriptedProvider::replying("[]");
        let result = smart_parse("Shelf 560x300", &ParseOptions::default(), Some(&provider)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.layers_used, vec![Layer::Regex]);
        assert!(result.parser_mode.is_none());
    }

    #[tokio::test]
    async fn test_llm_failure_becomes_warning() {
        let provider = ScriptedProvider::failing("boom");
        let text = "Shelf 560x300\nplease make me a nice bookcase";
        let result = smart_parse(text, &ParseOptions::default(), Some(&provider)).await;
        assert_eq!(result.parts.len(), 1);
        assert!(result.errors.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("boom")));
        assert_eq!(result.stats.unresolved, 1);
    }

    #[tokio::test]
    async fn test_llm_unconfigured_warns() {
        let provider = ScriptedProvider {
            configured: false,
            ..ScriptedProvider::replying("[]")
        };
        let text = "Shelf 560x300\nplease make me a nice bookcase";
        let result = smart_parse(text, &ParseOptions::default(), Some(&provider)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(result.warnings.iter().any(|w| w.contains("not configured")));

        let result = smart_parse(text, &ParseOptions::default(), None).await;
        assert!(result.warnings.iter().any(|w| w.contains("No LLM provider")));
    }

    #[tokio::test]
    async fn test_llm_timeout() {
        let provider = ScriptedProvider {
            delay: Some(Duration::from_millis(200)),
            ..ScriptedProvider::replying(r#"[{"L": 1, "W": 1}]"#)
        };
        let options = ParseOptions {
            llm_timeout: Some(Duration::from_millis(10)),
            ..ParseOptions::default()
        };
        let result = smart_parse("a bookcase please", &options, Some(&provider)).await;
        assert!(result.parts.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("timed out")));
        assert_eq!(result.errors, vec!["No parts could be parsed".to_string()]);
    }

    #[tokio::test]
    async fn test_pattern_recommendation_warns_before_llm() {
        let provider = ScriptedProvider::replying(r#"[{"L": 100, "W": 50}]"#);
        let text = (0..5)
            .map(|i| format!("item{}\tbirch\tedge\tnote", i))
            .collect::<Vec<_>>()
            .join("\n");
        let result = smart_parse(&text, &ParseOptions::default(), Some(&provider)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let mode = result.parser_mode.as_ref().expect("parser mode");
        assert_eq!(mode.recommended, ParserMode::Pattern);
        assert!(result.warnings.iter().any(|w| w.contains("pattern-parseable")));
    }

    #[tokio::test]
    async fn test_fast_never_exceeds_smart() {
        let provider = ScriptedProvider::replying(r#"[{"label": "Door", "L": 700, "W": 400}]"#);
        let text = "Side panel 720x560 qty 2\nthe doors we talked about yesterday";
        let smart = smart_parse(text, &ParseOptions::default(), Some(&provider)).await;
        let fast = fast_parse(text, &ParseOptions::default());
        assert!(fast.parts.len() <= smart.parts.len());
        assert!(fast.errors.is_empty());
    }
}
