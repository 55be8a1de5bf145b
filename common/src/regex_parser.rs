//! 正規表現によるライン解析（第2層）
//!
//! 1行 = 1部材として自由記述を読む。
//! 寸法が見つからない行は失敗として次の層へ回す。
//!
//! 読み取る要素:
//! - 寸法: `720x560`, `720 x 560 x 18`, `23 1/2" x 11 1/4"`, `720 by 560`, `L 720 W 560`
//! - 数量: `qty 2`, `x2`, `2 pcs`, `(2)`, `2 @`, 行頭の `2 side panels`
//! - 板厚: `18mm thick`, `t=18`, 3つ目の寸法, `18mm MDF`
//! - 材料・木目・エッジ・溝/穴/ルーター加工

use crate::normalize::edges::parse_edge_notation;
use crate::normalize::spoken::replace_spoken_numbers;
use crate::normalize::units::{parse_mixed_number, parse_unit_token, to_mm};
use crate::normalize::{clean_text, combine_confidence, extract_label, non_blank_lines, snippet};
use crate::types::{
    CutPart, DimOrder, FailedRow, Grain, Operation, ParseOptions, Size, SourceMethod, Units,
};
use regex::{Captures, Regex};
use tracing::debug;

/// ライン解析の信頼度上限
pub const REGEX_CONFIDENCE_CAP: f64 = 0.9;

const BASE_CONFIDENCE: f64 = 0.7;

const NUM: &str = r"\d+(?:[\s\-]\d+/\d+|/\d+|\.\d+)?";
const UNIT: &str = r#"mm|cm|inches|inch|in\b|""#;
const MATERIAL_WORDS: &str = "plywood|ply|mdf|hdf|melamine|particleboard|chipboard|oak|birch|walnut|maple|pine|cherry|beech|veneer|laminate|hardboard|osb";

lazy_static::lazy_static! {
    static ref DIM_X_RE: Regex = Regex::new(&format!(
        r"(?i)(?P<a>{n})(?:\s*(?P<ua>{u}))?(?P<s1>\s*[x\*]\s*)(?P<b>{n})(?:\s*(?P<ub>{u}))?(?:(?P<s2>\s*[x\*]\s*)(?P<c>{n})(?:\s*(?P<uc>{u}))?)?",
        n = NUM, u = UNIT
    )).unwrap();
    static ref DIM_BY_RE: Regex = Regex::new(&format!(
        r"(?i)(?P<a>{n})\s*(?P<ua>{u})?\s+by\s+(?P<b>{n})\s*(?P<ub>{u})?",
        n = NUM, u = UNIT
    )).unwrap();
    static ref DIM_LW_RE: Regex = Regex::new(&format!(
        r"(?i)\b(?:l|len|length)\s*[:=]?\s*(?P<a>{n})\s*(?P<ua>{u})?[\s,;/]*(?:\band\s+)?\b(?:w|wid|width)\s*[:=]?\s*(?P<b>{n})\s*(?P<ub>{u})?",
        n = NUM, u = UNIT
    )).unwrap();
    static ref DIM_WL_RE: Regex = Regex::new(&format!(
        r"(?i)\b(?:w|wid|width)\s*[:=]?\s*(?P<b>{n})\s*(?P<ub>{u})?[\s,;/]*(?:\band\s+)?\b(?:l|len|length)\s*[:=]?\s*(?P<a>{n})\s*(?P<ua>{u})?",
        n = NUM, u = UNIT
    )).unwrap();

    static ref QTY_KEYWORD_RE: Regex = Regex::new(r"(?i)\b(?:qty|quantity|count)\s*[:=\-]?\s*(\d+)").unwrap();
    static ref QTY_SUFFIX_RE: Regex = Regex::new(r"(?i)\b(\d+)\s*(?:pcs?|pieces?|off|nos)\b").unwrap();
    static ref QTY_TIMES_RE: Regex = Regex::new(r"(?i)(?:^|\s)[x\*]\s?(\d+)\b").unwrap();
    static ref QTY_PAREN_RE: Regex = Regex::new(r"\((\d+)\)").unwrap();
    static ref QTY_AT_RE: Regex = Regex::new(r"\b(\d+)\s*@").unwrap();
    static ref QTY_LEADING_RE: Regex = Regex::new(r"(?i)^\s*(\d+)\s*(?:x|pcs?|off|@)?\s+[a-z]").unwrap();

    static ref THICK_WORD_RE: Regex = Regex::new(&format!(
        r"(?i)(?P<v>{n})\s*(?P<u>{u})?\s*(?:thick|thk|thickness)\b",
        n = NUM, u = UNIT
    )).unwrap();
    static ref THICK_LABEL_RE: Regex = Regex::new(&format!(
        r"(?i)\b(?:t|thk|thickness)\s*[:=]\s*(?P<v>{n})\s*(?P<u>{u})?",
        n = NUM, u = UNIT
    )).unwrap();
    static ref THICK_MATERIAL_RE: Regex = Regex::new(&format!(
        r#"(?i)(?P<v>{n})\s*(?P<u>mm|")\s*(?:{m})\b"#,
        n = NUM, m = MATERIAL_WORDS
    )).unwrap();

    static ref MATERIAL_RE: Regex = Regex::new(&format!(r"(?i)\b(?:{})\b", MATERIAL_WORDS)).unwrap();

    static ref GRAIN_LENGTH_RE: Regex = Regex::new(
        r"(?i)\bgrain\s*(?:runs\s+|direction\s*:?\s*|along\s+(?:the\s+)?|with\s+(?:the\s+)?)?(?:length|long(?:ways|wise)?)\b|\blong\s+grain\b"
    ).unwrap();
    static ref GRAIN_WIDTH_RE: Regex = Regex::new(
        r"(?i)\bgrain\s*(?:runs\s+|direction\s*:?\s*|along\s+(?:the\s+)?|with\s+(?:the\s+)?)?(?:width|wide|short|cross(?:ways|wise)?)\b|\bcross\s+grain\b"
    ).unwrap();
    static ref NO_GRAIN_RE: Regex = Regex::new(r"(?i)\b(?:no\s+grain|grain\s*:?\s*none|any\s+grain)\b").unwrap();
    static ref NO_ROTATE_RE: Regex = Regex::new(
        r"(?i)\b(?:no\s+rotat\w*|do\s+not\s+rotate|don'?t\s+rotate|fixed\s+grain)\b"
    ).unwrap();

    static ref GROOVE_RE: Regex = Regex::new(r"(?i)\b(?:groove|dado|rebate|rabbet)[^,;\n]*").unwrap();
    static ref HOLE_RE: Regex = Regex::new(
        r"(?i)\b(?:\d+\s*)?(?:holes?|drill(?:ing|ed)?|hinge\s+bores?|shelf\s+pins?|system\s*32)[^,;\n]*"
    ).unwrap();
    static ref ROUTING_RE: Regex = Regex::new(r"(?i)\b(?:route|routed|routing|cnc|cut-?out|radius|rounded)[^,;\n]*").unwrap();
    static ref NOTES_RE: Regex = Regex::new(r"(?i)\bnotes?\s*[:=]\s*(.+)$").unwrap();
}

/// ライン解析の結果
#[derive(Debug, Clone, PartialEq)]
pub struct RegexParseResult {
    pub parts: Vec<CutPart>,
    pub failed_lines: Vec<FailedRow>,
    pub confidence: f64,
}

/// 寸法の読み取り結果
struct DimensionMatch {
    first: f64,
    second: f64,
    third: Option<f64>,
    units: Units,
    /// L/W を明示した記法
    labelled: bool,
    fractional_inference: bool,
    start: usize,
    end: usize,
}

/// テキスト全体を行ごとに解析する
pub fn parse_text(text: &str, options: &ParseOptions) -> RegexParseResult {
    parse_text_batch(&non_blank_lines(text), options)
}

/// 行番号付きの行をまとめて解析する
pub fn parse_text_batch(lines: &[(usize, &str)], options: &ParseOptions) -> RegexParseResult {
    let mut parts = Vec::new();
    let mut failed_lines = Vec::new();

    for (index, raw) in lines {
        match parse_line(raw, options) {
            Ok(mut part) => {
                part.part_id = format!("P{:03}", parts.len() + 1);
                part.audit.source_ref = Some(format!("line:{}", index + 1));
                parts.push(part);
            }
            Err(reason) => failed_lines.push(FailedRow {
                index: *index,
                raw: raw.to_string(),
                reason,
            }),
        }
    }

    let attempted = parts.len() + failed_lines.len();
    let confidence = if attempted == 0 {
        0.0
    } else {
        let mean = crate::normalize::mean_confidence(&parts);
        mean * parts.len() as f64 / attempted as f64
    };

    debug!(
        parts = parts.len(),
        failed = failed_lines.len(),
        confidence,
        "ライン解析完了"
    );

    RegexParseResult {
        parts,
        failed_lines,
        confidence,
    }
}

/// 1行を部材に変換する
///
/// 寸法が読めない行は `Err(理由)`
pub fn parse_line(line: &str, options: &ParseOptions) -> Result<CutPart, String> {
    let text = replace_spoken_numbers(&clean_text(line));
    let text = text.trim();
    if text.is_empty() {
        return Err("Empty line".to_string());
    }

    let dims = find_dimensions(text, options).ok_or_else(|| "No dimensions found".to_string())?;

    let (length, width) = if dims.labelled {
        (dims.first, dims.second)
    } else {
        options.dim_order_hint.arrange(dims.first, dims.second)
    };
    if length <= 0.0 || width <= 0.0 {
        return Err(format!("Invalid dimensions: {} x {}", dims.first, dims.second));
    }

    let prefix = &text[..dims.start];
    let remainder = format!("{} {}", prefix, &text[dims.end..]);

    let mut adjustments = Vec::new();
    let mut warnings = Vec::new();

    if dims.fractional_inference {
        warnings.push("Units inferred as inches from fractional dimensions".to_string());
        adjustments.push(-0.1);
    }
    if options.dim_order_hint == DimOrder::Infer && !dims.labelled && dims.second > dims.first {
        warnings.push("Dimensions swapped so that L is the longer side".to_string());
    }

    let thickness = find_thickness(&remainder, dims.units)
        .or(dims.third)
        .filter(|t| *t > 0.0);
    if thickness.is_some() {
        adjustments.push(0.05);
    }

    let material = find_material(text);
    if material.is_some() {
        adjustments.push(0.05);
    }

    let qty = find_qty(&remainder, prefix);
    if qty.is_some() {
        adjustments.push(0.05);
    }

    let label = extract_label(prefix);
    if label.is_some() {
        adjustments.push(0.1);
    }

    let mut part = CutPart::new(
        "",
        Size::new(length, width),
        thickness.unwrap_or_else(|| options.thickness()),
        material.unwrap_or_else(|| options.material().to_string()),
        SourceMethod::PasteParser,
    );
    part.label = label;
    part.qty = qty.unwrap_or(1).max(1);
    part.notes = NOTES_RE.captures(text).map(|cap| cap[1].trim().to_string());

    apply_grain(&mut part, text);

    if let Some(edging) = parse_edge_notation(text) {
        part.push_op(Operation::Edging(edging));
    }
    for op in find_operations(text) {
        part.push_op(op);
    }

    part.audit.parsed_text_snippet = Some(snippet(line, 120));
    part.audit.confidence = Some(combine_confidence(
        BASE_CONFIDENCE,
        &adjustments,
        REGEX_CONFIDENCE_CAP,
    ));
    part.audit.warnings = warnings;

    Ok(part)
}

/// 寸法を探す（×記法 → by 記法 → L/W 明示の順）
fn find_dimensions(text: &str, options: &ParseOptions) -> Option<DimensionMatch> {
    if let Some(cap) = DIM_X_RE.captures(text) {
        return dimension_from_captures(&cap, options, false, true);
    }
    if let Some(cap) = DIM_BY_RE.captures(text) {
        return dimension_from_captures(&cap, options, false, false);
    }
    if let Some(cap) = DIM_LW_RE.captures(text).or_else(|| DIM_WL_RE.captures(text)) {
        return dimension_from_captures(&cap, options, true, false);
    }
    None
}

fn dimension_from_captures(
    cap: &Captures,
    options: &ParseOptions,
    labelled: bool,
    allow_third: bool,
) -> Option<DimensionMatch> {
    let whole = cap.get(0)?;
    let a = cap.name("a")?;
    let b = cap.name("b")?;

    // "560x300 x2" の3つ目は数量
    let third = if allow_third {
        match (cap.name("s1"), cap.name("s2"), cap.name("c")) {
            (Some(s1), Some(s2), Some(c)) if !is_qty_suffix(s1.as_str(), s2.as_str()) => Some(c),
            _ => None,
        }
    } else {
        None
    };

    let end = if third.is_some() {
        whole.end()
    } else {
        cap.name("ub").map(|m| m.end()).unwrap_or_else(|| b.end())
    };

    let explicit_unit = ["ua", "ub", "uc"]
        .iter()
        .filter(|name| third.is_some() || **name != "uc")
        .filter_map(|name| cap.name(name))
        .find_map(|m| parse_unit_token(m.as_str()));

    let numbers: Vec<&str> = [Some(a), Some(b), third]
        .iter()
        .flatten()
        .map(|m| m.as_str())
        .collect();
    let fractional = numbers.iter().any(|n| n.contains('/'));

    let (units, fractional_inference) = match (explicit_unit, options.units) {
        (Some(u), _) => (u, false),
        (None, Some(u)) => (u, false),
        (None, None) if fractional => (Units::Inch, true),
        (None, None) => (Units::Mm, false),
    };

    let value = |text: &str, unit_group: &str| -> Option<f64> {
        let raw = parse_mixed_number(text)?;
        let own = cap.name(unit_group).and_then(|m| parse_unit_token(m.as_str()));
        Some(to_mm(raw, own.unwrap_or(units))).filter(|v| v.is_finite())
    };

    Some(DimensionMatch {
        first: value(a.as_str(), "ua")?,
        second: value(b.as_str(), "ub")?,
        third: match third {
            Some(c) => Some(value(c.as_str(), "uc")?),
            None => None,
        },
        units,
        labelled,
        fractional_inference,
        start: whole.start().min(a.start()).min(b.start()),
        end: end.max(a.end()).max(b.end()),
    })
}

/// 3つ目の区切りが " x2" 型（前に空白・後ろに空白なし）で、
/// 1つ目の区切りに空白がない場合は数量とみなす
fn is_qty_suffix(first_sep: &str, second_sep: &str) -> bool {
    let qty_shaped = second_sep.starts_with(char::is_whitespace)
        && !second_sep.ends_with(char::is_whitespace);
    qty_shaped && !first_sep.contains(char::is_whitespace)
}

fn find_qty(remainder: &str, prefix: &str) -> Option<u32> {
    let patterns: [&Regex; 5] = [
        &*QTY_KEYWORD_RE,
        &*QTY_SUFFIX_RE,
        &*QTY_TIMES_RE,
        &*QTY_PAREN_RE,
        &*QTY_AT_RE,
    ];
    patterns
        .iter()
        .find_map(|re| re.captures(remainder))
        .or_else(|| QTY_LEADING_RE.captures(prefix))
        .and_then(|cap| cap[1].parse::<u32>().ok())
}

fn find_thickness(remainder: &str, units: Units) -> Option<f64> {
    [&*THICK_WORD_RE, &*THICK_LABEL_RE, &*THICK_MATERIAL_RE]
        .iter()
        .find_map(|re| re.captures(remainder))
        .and_then(|cap| {
            let value = parse_mixed_number(&cap["v"])?;
            let unit = cap
                .name("u")
                .and_then(|m| parse_unit_token(m.as_str()))
                .unwrap_or(units);
            Some(to_mm(value, unit))
        })
}

/// 材料キーワードを連結して材料IDにする（"Birch Plywood" → "birch-plywood"）
fn find_material(text: &str) -> Option<String> {
    let words: Vec<String> = MATERIAL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .fold(Vec::new(), |mut acc, w| {
            if !acc.contains(&w) {
                acc.push(w);
            }
            acc
        });
    if words.is_empty() {
        None
    } else {
        Some(words.join("-"))
    }
}

fn apply_grain(part: &mut CutPart, text: &str) {
    part.allow_rotation = Some(true);

    if NO_GRAIN_RE.is_match(text) {
        part.grain = Some(Grain::None);
    } else if GRAIN_LENGTH_RE.is_match(text) {
        part.grain = Some(Grain::Length);
        part.allow_rotation = Some(false);
    } else if GRAIN_WIDTH_RE.is_match(text) {
        part.grain = Some(Grain::Width);
        part.allow_rotation = Some(false);
    }

    if NO_ROTATE_RE.is_match(text) {
        part.allow_rotation = Some(false);
    }
}

fn find_operations(text: &str) -> Vec<Operation> {
    let mut ops = Vec::new();
    if let Some(m) = GROOVE_RE.find(text) {
        ops.push(Operation::Groove {
            side: None,
            note: m.as_str().trim().to_string(),
        });
    }
    if let Some(m) = HOLE_RE.find(text) {
        ops.push(Operation::Hole {
            pattern: m.as_str().trim().to_string(),
        });
    }
    if let Some(m) = ROUTING_RE.find(text) {
        ops.push(Operation::Routing {
            note: m.as_str().trim().to_string(),
        });
    }
    ops
}
