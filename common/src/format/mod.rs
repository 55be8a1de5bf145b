//! 入力形式の判定
//!
//! 生テキストがどのソフトの出力か、表形式か、自由記述かを判定し、
//! 最初に試すパース戦略を決める。
//!
//! ## 判定順（最初に一致したものを採用）
//! 1. ソフト固有の署名（製品名・バージョン表記）
//! 2. 1行目のヘッダー署名
//! 3. 区切り文字の構造解析
//! 4. 自由記述

pub mod mode;

use crate::normalize::non_blank_lines;
use crate::types::Delimiter;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 入力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    CutlistPlus,
    CabinetVision,
    Mozaik,
    MaxCut,
    OpenCutList,
    CutlistOptimizer,
    Microvellum,
    SketchList,
    CaiTemplate,
    /// タブ/カンマ区切りの汎用表
    Excel,
    /// 空白揃えの表
    GenericTable,
    FreeForm,
    Auto,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::CutlistPlus => "cutlist_plus",
            SourceFormat::CabinetVision => "cabinet_vision",
            SourceFormat::Mozaik => "mozaik",
            SourceFormat::MaxCut => "max_cut",
            SourceFormat::OpenCutList => "open_cut_list",
            SourceFormat::CutlistOptimizer => "cutlist_optimizer",
            SourceFormat::Microvellum => "microvellum",
            SourceFormat::SketchList => "sketch_list",
            SourceFormat::CaiTemplate => "cai_template",
            SourceFormat::Excel => "excel",
            SourceFormat::GenericTable => "generic_table",
            SourceFormat::FreeForm => "free_form",
            SourceFormat::Auto => "auto",
        }
    }

    /// 名前から形式を取得（CLI・設定ファイル用）
    pub fn from_name(name: &str) -> Option<Self> {
        let key = name.trim().to_lowercase().replace(['-', ' '], "_");
        [
            SourceFormat::CutlistPlus,
            SourceFormat::CabinetVision,
            SourceFormat::Mozaik,
            SourceFormat::MaxCut,
            SourceFormat::OpenCutList,
            SourceFormat::CutlistOptimizer,
            SourceFormat::Microvellum,
            SourceFormat::SketchList,
            SourceFormat::CaiTemplate,
            SourceFormat::Excel,
            SourceFormat::GenericTable,
            SourceFormat::FreeForm,
            SourceFormat::Auto,
        ]
        .into_iter()
        .find(|f| f.as_str() == key)
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 判定方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Pattern,
    Header,
    Structure,
    Heuristic,
    /// 呼び出し側の指定
    Hint,
}

/// 構造解析で得た補足情報
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<Delimiter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_headers: Option<bool>,
}

/// 形式判定の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDetectionResult {
    pub format: SourceFormat,
    pub confidence: f64,
    pub method: DetectionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FormatMetadata>,
}

impl FormatDetectionResult {
    fn new(format: SourceFormat, confidence: f64, method: DetectionMethod) -> Self {
        Self {
            format,
            confidence,
            method,
            metadata: None,
        }
    }

    /// 判定結果が示す区切り文字
    pub fn delimiter(&self) -> Option<Delimiter> {
        self.metadata.as_ref().and_then(|m| m.delimiter)
    }
}

/// パース戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStrategy {
    Deterministic,
    Regex,
    Llm,
}

lazy_static::lazy_static! {
    /// ソフト固有の署名と信頼度
    ///
    /// 製品名そのものは高く、略称は低くする
    static ref SOFTWARE_SIGNATURES: Vec<(Regex, SourceFormat, f64)> = vec![
        (Regex::new(r"(?i)#\s*CAI\s*(?:cutlist\s*)?v\d+(?:\.\d+)*").unwrap(), SourceFormat::CaiTemplate, 0.99),
        (Regex::new(r"(?i)\bCAI[\s_\-]?(?:template|cutlist)\b").unwrap(), SourceFormat::CaiTemplate, 0.97),
        (Regex::new(r"(?i)\bcut\s*list\s*plus\b").unwrap(), SourceFormat::CutlistPlus, 0.95),
        (Regex::new(r"(?i)\bcabinet\s*vision\b").unwrap(), SourceFormat::CabinetVision, 0.95),
        (Regex::new(r"(?i)\bmozaik\b").unwrap(), SourceFormat::Mozaik, 0.95),
        (Regex::new(r"(?i)\bmax\s*cut\b").unwrap(), SourceFormat::MaxCut, 0.95),
        (Regex::new(r"(?i)\bopen\s*cut\s*list\b").unwrap(), SourceFormat::OpenCutList, 0.95),
        (Regex::new(r"(?i)\bmicrovellum\b").unwrap(), SourceFormat::Microvellum, 0.95),
        (Regex::new(r"(?i)\bcut\s*list\s*optimi[sz]er\b").unwrap(), SourceFormat::CutlistOptimizer, 0.9),
        (Regex::new(r"(?i)\bsketch\s*list\b").unwrap(), SourceFormat::SketchList, 0.9),
        (Regex::new(r"\bCV\s*\d+(?:\.\d+)+\b").unwrap(), SourceFormat::CabinetVision, 0.8),
        (Regex::new(r"\bCLP\b").unwrap(), SourceFormat::CutlistPlus, 0.75),
        (Regex::new(r"\bOCL\b").unwrap(), SourceFormat::OpenCutList, 0.75),
    ];

    /// 1行目のヘッダー署名
    static ref HEADER_SIGNATURES: Vec<(Regex, SourceFormat)> = vec![
        (Regex::new(r"(?i)^part\s*id[\t,;]\s*label[\t,;]\s*qty[\t,;]\s*length[\t,;]\s*width[\t,;]\s*thickness").unwrap(), SourceFormat::CaiTemplate),
        (Regex::new(r"(?i)^(?:number|#)[\t,;]\s*name[\t,;]\s*count[\t,;]\s*cutting\s*length").unwrap(), SourceFormat::OpenCutList),
        (Regex::new(r"(?i)^type[\t,;]\s*name[\t,;]\s*length[\t,;]\s*width[\t,;]\s*quantity").unwrap(), SourceFormat::MaxCut),
        (Regex::new(r"(?i)^length[\t,;]\s*width[\t,;]\s*qty[\t,;]\s*label").unwrap(), SourceFormat::CutlistOptimizer),
        (Regex::new(r"(?i)^(?:qty|quantity)[\t,;]\s*width[\t,;]\s*(?:height|length)[\t,;]\s*(?:material|matl)").unwrap(), SourceFormat::Mozaik),
        (Regex::new(r"(?i)^part\s*#?[\t,;]\s*description[\t,;]\s*(?:copies|qty)[\t,;]\s*(?:thickness|length)").unwrap(), SourceFormat::CutlistPlus),
    ];
}

/// 入力形式を判定する
///
/// 空入力は `free_form` / 信頼度0 / heuristic を返す。失敗しない。
pub fn detect_format(text: &str) -> FormatDetectionResult {
    if text.trim().is_empty() {
        return FormatDetectionResult::new(SourceFormat::FreeForm, 0.0, DetectionMethod::Heuristic);
    }

    // 1. ソフト固有の署名
    for (pattern, format, confidence) in SOFTWARE_SIGNATURES.iter() {
        if pattern.is_match(text) {
            let mut result = FormatDetectionResult::new(*format, *confidence, DetectionMethod::Pattern);
            result.metadata = analyze_structure(text).and_then(|r| r.metadata);
            return result;
        }
    }

    // 2. ヘッダー署名
    if let Some((_, first_line)) = non_blank_lines(text).first() {
        for (pattern, format) in HEADER_SIGNATURES.iter() {
            if pattern.is_match(first_line.trim()) {
                let mut result = FormatDetectionResult::new(*format, 0.8, DetectionMethod::Header);
                let mut metadata = analyze_structure(text)
                    .and_then(|r| r.metadata)
                    .unwrap_or_default();
                metadata.has_headers = Some(true);
                result.metadata = Some(metadata);
                return result;
            }
        }
    }

    // 3. 構造解析
    if let Some(result) = analyze_structure(text) {
        return result;
    }

    // 4. 自由記述
    FormatDetectionResult::new(SourceFormat::FreeForm, 0.5, DetectionMethod::Heuristic)
}

/// 区切り文字の出現数から表形式かどうかを判定する
///
/// 2行以上必要。タブ→カンマの順に、1行あたりの平均出現数が2以上かつ
/// 各行のばらつきが平均±1以内なら表とみなす。
pub fn analyze_structure(text: &str) -> Option<FormatDetectionResult> {
    let lines: Vec<&str> = non_blank_lines(text).into_iter().map(|(_, l)| l).collect();
    if lines.len() < 2 {
        return None;
    }

    for (delimiter, confidence) in [(Delimiter::Tab, 0.85), (Delimiter::Comma, 0.80)] {
        let counts: Vec<usize> = lines.iter().map(|l| delimiter.count_in(l)).collect();
        let avg = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        let consistent = counts.iter().all(|c| (*c as f64 - avg).abs() <= 1.0);

        if avg >= 2.0 && consistent {
            let mut result = FormatDetectionResult::new(SourceFormat::Excel, confidence, DetectionMethod::Structure);
            result.metadata = Some(FormatMetadata {
                delimiter: Some(delimiter),
                column_count: Some(avg.round() as usize + 1),
                has_headers: Some(first_row_looks_like_header(&lines, delimiter)),
            });
            return Some(result);
        }
    }

    lazy_static::lazy_static! {
        static ref SPACE_RUN_RE: Regex = Regex::new(r"\S {2,}\S").unwrap();
    }

    let spaced = lines.iter().filter(|l| SPACE_RUN_RE.is_match(l)).count();
    if spaced as f64 / lines.len() as f64 >= 0.8 {
        let columns: Vec<usize> = lines.iter().map(|l| Delimiter::MultiSpace.split(l).len()).collect();
        let avg = columns.iter().sum::<usize>() as f64 / columns.len() as f64;
        let mut result = FormatDetectionResult::new(SourceFormat::GenericTable, 0.7, DetectionMethod::Structure);
        result.metadata = Some(FormatMetadata {
            delimiter: Some(Delimiter::MultiSpace),
            column_count: Some(avg.round() as usize),
            has_headers: Some(first_row_looks_like_header(&lines, Delimiter::MultiSpace)),
        });
        return Some(result);
    }

    None
}

/// 1行目に数値セルがなく、2行目に数値セルがあればヘッダーとみなす
fn first_row_looks_like_header(lines: &[&str], delimiter: Delimiter) -> bool {
    let has_number = |line: &str| {
        delimiter
            .split(line)
            .iter()
            .any(|cell| !cell.is_empty() && cell.parse::<f64>().is_ok())
    };
    match (lines.first(), lines.get(1)) {
        (Some(first), Some(second)) => !has_number(first) && has_number(second),
        _ => false,
    }
}

/// 形式から最初に試すパース戦略を決める
pub fn get_parsing_strategy(format: SourceFormat) -> ParsingStrategy {
    match format {
        SourceFormat::CutlistPlus
        | SourceFormat::CabinetVision
        | SourceFormat::Mozaik
        | SourceFormat::MaxCut
        | SourceFormat::OpenCutList
        | SourceFormat::CutlistOptimizer
        | SourceFormat::Microvellum
        | SourceFormat::SketchList
        | SourceFormat::CaiTemplate
        | SourceFormat::Excel
        | SourceFormat::GenericTable => ParsingStrategy::Deterministic,
        SourceFormat::FreeForm => ParsingStrategy::Llm,
        SourceFormat::Auto => ParsingStrategy::Regex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================
    // detect_format テスト
    // =============================================

    #[test]
    fn test_detect_empty() {
        let result = detect_format("   \n\t ");
        assert_eq!(result.format, SourceFormat::FreeForm);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, DetectionMethod::Heuristic);
    }

    #[test]
    fn test_detect_software_signature() {
        let text = "Exported by Cabinet Vision\nPart\tL\tW\nA\t100\t50";
        let result = detect_format(text);
        assert_eq!(result.format, SourceFormat::CabinetVision);
        assert_eq!(result.method, DetectionMethod::Pattern);
        assert!(result.confidence >= 0.9);
    }

    #[test]
    fn test_detect_signature_abbreviation_scores_lower() {
        let literal = detect_format("OpenCutList export");
        let abbrev = detect_format("OCL export");
        assert_eq!(literal.format, SourceFormat::OpenCutList);
        assert_eq!(abbrev.format, SourceFormat::OpenCutList);
        assert!(literal.confidence > abbrev.confidence);
    }

    #[test]
    fn test_detect_cai_version_string() {
        let result = detect_format("# CAI v2.1\nlabel,length,width\nA,1,2");
        assert_eq!(result.format, SourceFormat::CaiTemplate);
        assert_eq!(result.confidence, 0.99);
    }

    #[test]
    fn test_detect_header_signature() {
        let text = "Length,Width,Qty,Label,Enabled\n720,560,2,Side,true";
        let result = detect_format(text);
        assert_eq!(result.format, SourceFormat::CutlistOptimizer);
        assert_eq!(result.method, DetectionMethod::Header);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_detect_tab_structure() {
        let text = "Part\tL\tW\tQty\nA\t100\t50\t2\nB\t200\t80\t1";
        let result = detect_format(text);
        assert_eq!(result.format, SourceFormat::Excel);
        assert_eq!(result.confidence, 0.85);
        let metadata = result.metadata.unwrap();
        assert_eq!(metadata.delimiter, Some(Delimiter::Tab));
        assert_eq!(metadata.column_count, Some(4));
        assert_eq!(metadata.has_headers, Some(true));
    }

    #[test]
    fn test_detect_comma_structure() {
        let text = "Part,L,W\nA,100,50\nB,200,80";
        let result = detect_format(text);
        assert_eq!(result.format, SourceFormat::Excel);
        assert_eq!(result.confidence, 0.80);
        assert_eq!(result.delimiter(), Some(Delimiter::Comma));
    }

    #[test]
    fn test_detect_space_table() {
        let text = "Side    720   560\nShelf   560   300\nBack    720   540";
        let result = detect_format(text);
        assert_eq!(result.format, SourceFormat::GenericTable);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.delimiter(), Some(Delimiter::MultiSpace));
    }

    #[test]
    fn test_detect_free_form() {
        let text = "Side panel 720x560 qty 2\nShelf 560 by 300, four of them";
        let result = detect_format(text);
        assert_eq!(result.format, SourceFormat::FreeForm);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_detect_single_line_is_free_form() {
        let result = detect_format("A\t100\t50\t2");
        assert_eq!(result.format, SourceFormat::FreeForm);
    }

    // =============================================
    // get_parsing_strategy テスト
    // =============================================

    #[test]
    fn test_parsing_strategy_lookup() {
        assert_eq!(get_parsing_strategy(SourceFormat::Excel), ParsingStrategy::Deterministic);
        assert_eq!(get_parsing_strategy(SourceFormat::Mozaik), ParsingStrategy::Deterministic);
        assert_eq!(get_parsing_strategy(SourceFormat::FreeForm), ParsingStrategy::Llm);
        assert_eq!(get_parsing_strategy(SourceFormat::Auto), ParsingStrategy::Regex);
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(SourceFormat::from_name("free-form"), Some(SourceFormat::FreeForm));
        assert_eq!(SourceFormat::from_name("Cabinet Vision"), Some(SourceFormat::CabinetVision));
        assert_eq!(SourceFormat::from_name("unknown"), None);
    }
}
