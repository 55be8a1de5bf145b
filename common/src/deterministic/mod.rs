//! 決定的パース（第1層）
//!
//! 表形式の入力をヘッダーから列判定し、全データ行を部材に変換する。
//! 行単位の失敗は記録して次の行へ進み、全体としては失敗しない。
//!
//! ## 処理フロー
//! 1. 空行を除外
//! 2. 区切り文字の決定（指定 → 自動検出 → タブ）
//! 3. ヘッダー行から列の対応を作る（長さ・幅の列は必須）
//! 4. データ行ごとに部材化（空行扱い / 行失敗 / 成功）
//! 5. 成功率から信頼度と後続層スキップの可否を決める

pub mod columns;

pub use columns::{detect_column_mapping, infer_rotation, RotationHint};

use crate::normalize::edges::decode_edgeband_code;
use crate::normalize::{non_blank_lines, parse_numeric_cell, snippet};
use crate::types::{
    ColumnField, ColumnMapping, CutPart, Delimiter, FailedRow, Operation, ParseOptions, Size,
    SourceMethod,
};
use tracing::debug;

/// 決定的パースの信頼度上限
pub const DETERMINISTIC_CONFIDENCE: f64 = 0.95;

/// 後続層をスキップする成功率
pub const SKIP_OTHER_LAYERS_RATE: f64 = 0.9;

/// ヘッダー行を探す範囲
const HEADER_SEARCH_LINES: usize = 5;

/// 決定的パースの結果
#[derive(Debug, Clone, PartialEq)]
pub struct DeterministicParseResult {
    pub parts: Vec<CutPart>,
    pub failed_rows: Vec<FailedRow>,
    pub delimiter: Delimiter,
    pub mapping: ColumnMapping,
    /// ヘッダー行の行番号
    pub header_index: Option<usize>,
    /// 成功行 + 失敗行（空行扱いの行は含めない）
    pub total_data_rows: usize,
    /// 空行扱いで読み飛ばした行数
    pub skipped_rows: usize,
    pub confidence: f64,
    pub skip_other_layers: bool,
}

impl DeterministicParseResult {
    fn empty(delimiter: Delimiter) -> Self {
        Self {
            parts: Vec::new(),
            failed_rows: Vec::new(),
            delimiter,
            mapping: ColumnMapping::default(),
            header_index: None,
            total_data_rows: 0,
            skipped_rows: 0,
            confidence: 0.0,
            skip_other_layers: false,
        }
    }

    /// 行単位の成功率
    pub fn success_rate(&self) -> f64 {
        if self.total_data_rows == 0 {
            0.0
        } else {
            self.parts.len() as f64 / self.total_data_rows as f64
        }
    }
}

/// テキストを決定的にパースする
pub fn parse_deterministic(text: &str, options: &ParseOptions) -> DeterministicParseResult {
    parse_deterministic_lines(&non_blank_lines(text), options)
}

/// 行番号付きの行をパースする（カスケードの残余行用）
pub fn parse_deterministic_lines(
    lines: &[(usize, &str)],
    options: &ParseOptions,
) -> DeterministicParseResult {
    let raw_lines: Vec<&str> = lines.iter().map(|(_, l)| *l).collect();
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(&raw_lines));

    if lines.is_empty() {
        return DeterministicParseResult::empty(delimiter);
    }

    let rows: Vec<Vec<String>> = raw_lines.iter().map(|l| delimiter.split(l)).collect();

    let Some((header_pos, mapping)) = find_header(&rows) else {
        let mut result = DeterministicParseResult::empty(delimiter);
        result.failed_rows.push(FailedRow {
            index: lines[0].0,
            raw: lines[0].1.to_string(),
            reason: "No length/width columns detected in header row".to_string(),
        });
        debug!(?delimiter, "決定的パース: 長さ・幅の列が見つかりません");
        return result;
    };

    debug!(?delimiter, header = header_pos, ?mapping, "決定的パース: 列判定");

    let mut result = DeterministicParseResult::empty(delimiter);
    result.header_index = Some(lines[header_pos].0);

    // ヘッダーより前の行は次の層へ回す
    for (index, raw) in lines.iter().take(header_pos) {
        result.failed_rows.push(FailedRow {
            index: *index,
            raw: raw.to_string(),
            reason: "Line precedes header row".to_string(),
        });
    }

    let data_start = if options.skip_header { header_pos + 1 } else { header_pos };

    for (pos, cells) in rows.iter().enumerate().skip(data_start) {
        let (index, raw) = lines[pos];
        let part_id = format!("P{:03}", result.parts.len() + 1);
        match parse_row(cells, &mapping, options, &part_id) {
            Ok(Some(mut part)) => {
                part.audit.source_ref = Some(format!("row:{}", index + 1));
                part.audit.parsed_text_snippet = Some(snippet(raw, 120));
                result.parts.push(part);
            }
            Ok(None) => result.skipped_rows += 1,
            Err(reason) => result.failed_rows.push(FailedRow {
                index,
                raw: raw.to_string(),
                reason,
            }),
        }
    }

    let preamble = header_pos;
    result.total_data_rows = result.parts.len() + result.failed_rows.len() - preamble;
    if result.total_data_rows > 0 {
        let rate = result.success_rate();
        result.confidence = rate * DETERMINISTIC_CONFIDENCE;
        result.skip_other_layers = rate >= SKIP_OTHER_LAYERS_RATE;
    }
    result.mapping = mapping;

    debug!(
        parts = result.parts.len(),
        failed = result.failed_rows.len(),
        skipped = result.skipped_rows,
        confidence = result.confidence,
        "決定的パース完了"
    );

    result
}

/// ヘッダー行を探す
///
/// 1行目で長さ・幅が判定できなければ、先頭数行の前置き（タイトル行など）を
/// 読み飛ばしてヘッダーを探す。
fn find_header(rows: &[Vec<String>]) -> Option<(usize, ColumnMapping)> {
    rows.iter()
        .take(HEADER_SEARCH_LINES)
        .enumerate()
        .map(|(pos, cells)| (pos, detect_column_mapping(cells)))
        .find(|(_, mapping)| mapping.has_dimensions())
}

/// 区切り文字を自動検出する
///
/// 先頭5行でタブ・カンマ・セミコロン・パイプを数え、最多かつ3回以上のものを採用。
/// 該当なしはタブ。
pub fn detect_delimiter(lines: &[&str]) -> Delimiter {
    let sample: Vec<&str> = lines.iter().take(5).copied().collect();

    let mut best: Option<(Delimiter, usize)> = None;
    for candidate in Delimiter::CANDIDATES {
        let count: usize = sample.iter().map(|l| candidate.count_in(l)).sum();
        if best.map(|(_, c)| count > c).unwrap_or(true) {
            best = Some((candidate, count));
        }
    }

    match best {
        Some((delimiter, count)) if count >= 3 => delimiter,
        _ => Delimiter::Tab,
    }
}

/// 1行を部材に変換する
///
/// - `Ok(Some)` 成功
/// - `Ok(None)` 長さ・幅とも空/0 の行（読み飛ばし）
/// - `Err` 行の失敗理由
fn parse_row(
    cells: &[String],
    mapping: &ColumnMapping,
    options: &ParseOptions,
    part_id: &str,
) -> Result<Option<CutPart>, String> {
    let required = mapping.required_cells();
    if cells.len() < required {
        return Err(format!(
            "Row has {} column(s), expected at least {}",
            cells.len(),
            required
        ));
    }

    let cell = |field: ColumnField| -> Option<&str> {
        mapping
            .get(field)
            .and_then(|i| cells.get(i))
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    };
    let number = |field: ColumnField| cell(field).and_then(parse_numeric_cell);
    let units_for = |field: ColumnField| mapping.unit_for(field).unwrap_or_else(|| options.units());

    let length = number(ColumnField::Length);
    let width = number(ColumnField::Width);

    if length.unwrap_or(0.0) == 0.0 && width.unwrap_or(0.0) == 0.0 {
        return Ok(None);
    }

    let length = match length {
        Some(v) if v > 0.0 => v,
        _ => {
            return Err(format!(
                "Invalid length: '{}'",
                cell(ColumnField::Length).unwrap_or("")
            ))
        }
    };
    let width = match width {
        Some(v) if v > 0.0 => v,
        _ => {
            return Err(format!(
                "Invalid width: '{}'",
                cell(ColumnField::Width).unwrap_or("")
            ))
        }
    };

    let size = Size::new(
        units_for(ColumnField::Length).to_mm(length),
        units_for(ColumnField::Width).to_mm(width),
    );

    let thickness = number(ColumnField::Thickness)
        .filter(|t| *t > 0.0)
        .map(|t| units_for(ColumnField::Thickness).to_mm(t))
        .unwrap_or_else(|| options.thickness());

    let material = cell(ColumnField::Material).unwrap_or_else(|| options.material());

    let mut part = CutPart::new(part_id, size, thickness, material, SourceMethod::ExcelTable);
    part.label = cell(ColumnField::Label).map(str::to_string);
    part.notes = cell(ColumnField::Notes).map(str::to_string);
    part.qty = number(ColumnField::Qty)
        .map(|q| q.round().max(1.0) as u32)
        .unwrap_or(1);

    part.allow_rotation = Some(true);
    if let Some(hint) = cell(ColumnField::Grain).and_then(infer_rotation) {
        part.allow_rotation = Some(hint.allow_rotation);
        part.grain = hint.grain;
    }

    if let Some(edging) = cell(ColumnField::Edgeband).and_then(decode_edgeband_code) {
        part.push_op(Operation::Edging(edging));
    }

    part.audit.confidence = Some(DETERMINISTIC_CONFIDENCE);
    part.audit.human_verified = false;

    Ok(Some(part))
}

/// 決定的パースが可能かを事前に判定する
pub fn can_parse_deterministically(text: &str) -> bool {
    deterministic_delimiter(text).is_some()
}

/// 決定的パースできる区切り文字を返す
///
/// - 2行以上
/// - 区切り文字を含む行が2行以上かつ全体の半分以上で、
///   それらの列数が平均±1以内
/// - その先頭行から長さ・幅の列が判定できる
pub fn deterministic_delimiter(text: &str) -> Option<Delimiter> {
    let lines: Vec<&str> = non_blank_lines(text).into_iter().map(|(_, l)| l).collect();
    if lines.len() < 2 {
        return None;
    }

    Delimiter::CANDIDATES.into_iter().find(|delimiter| {
        let delimited: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|l| delimiter.count_in(l) > 0)
            .collect();
        if delimited.len() < 2 || delimited.len() * 2 < lines.len() {
            return false;
        }

        let counts: Vec<usize> = delimited.iter().map(|l| delimiter.split(l).len()).collect();
        let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        if counts.iter().any(|c| (*c as f64 - mean).abs() > 1.0) {
            return false;
        }

        detect_column_mapping(&delimiter.split(delimited[0])).has_dimensions()
    })
}
