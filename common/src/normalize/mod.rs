//! 正規化ユーティリティ
//!
//! 各パース層が共有する前処理と小さな判定関数群。
//!
//! ## 内容
//! 1. テキスト整形（全角→半角、改行・空白・寸法記号の統一）
//! 2. 単位換算（`units`）
//! 3. 話し言葉の数値（`spoken`）
//! 4. エッジ貼り表記（`edges`）
//! 5. ラベル抽出と信頼度の基本演算

pub mod edges;
pub mod spoken;
pub mod units;

use crate::types::CutPart;
use regex::Regex;

/// 入力テキストを整形する
///
/// - CRLF/CR → LF
/// - 全角英数記号 → 半角
/// - NBSP → 空白
/// - 寸法記号（×, ✕, ＊）→ `x`
/// - 行末の空白を除去（タブ区切りの空セルは残す）
pub fn clean_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let converted: String = unified
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            'Ａ'..='Ｚ' => char::from_u32(c as u32 - 'Ａ' as u32 + 'A' as u32).unwrap_or(c),
            'ａ'..='ｚ' => char::from_u32(c as u32 - 'ａ' as u32 + 'a' as u32).unwrap_or(c),
            '×' | '✕' | '✖' | '＊' => 'x',
            '，' => ',',
            '．' => '.',
            '－' | '–' | '—' => '-',
            '　' | '\u{a0}' => ' ',
            '″' | '“' | '”' => '"',
            '′' | '‘' | '’' => '\'',
            _ => c,
        })
        .collect();

    converted
        .lines()
        .map(|line| line.trim_end_matches([' ', '\u{a0}']))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 空行を除いた行と元の行番号
pub fn non_blank_lines(text: &str) -> Vec<(usize, &str)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect()
}

/// 行内の連続空白を1つにまとめる
pub fn collapse_whitespace(line: &str) -> String {
    lazy_static::lazy_static! {
        static ref WS_RE: Regex = Regex::new(r"\s+").unwrap();
    }
    WS_RE.replace_all(line.trim(), " ").to_string()
}

/// セル値から数値を取り出す
///
/// 数字・小数点・マイナス以外を除去してから、先頭の数値部分を読む。
/// `"720mm"` → 720, `"1,200"` → 1200, `"abc"` → None
pub fn parse_numeric_cell(cell: &str) -> Option<f64> {
    let stripped: String = cell
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    lazy_static::lazy_static! {
        static ref NUMERIC_PREFIX_RE: Regex = Regex::new(r"^-?(\d+\.?\d*|\.\d+)").unwrap();
    }

    NUMERIC_PREFIX_RE
        .find(&stripped)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// 寸法より前の部分からラベルを抽出する
///
/// 区切り記号や数量表記を取り除き、空なら None
pub fn extract_label(prefix: &str) -> Option<String> {
    lazy_static::lazy_static! {
        static ref QTY_PREFIX_RE: Regex = Regex::new(r"(?i)^\s*\d+\s*(x|pcs?|off|@)?\s+").unwrap();
        static ref TRAILING_RE: Regex = Regex::new(r"[\s:=,;\-\(\[@#]+$").unwrap();
        static ref LEADING_RE: Regex = Regex::new(r"^[\s:=,;\-\)\]\.\*•]+").unwrap();
    }

    let without_qty = QTY_PREFIX_RE.replace(prefix, "");
    let trimmed = TRAILING_RE.replace(&without_qty, "");
    let trimmed = LEADING_RE.replace(&trimmed, "");
    let label = collapse_whitespace(&trimmed);

    if label.is_empty() || label.chars().all(|c| !c.is_alphabetic()) {
        None
    } else {
        Some(label)
    }
}

/// 入力の先頭を切り出す（監査用スニペット）
pub fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// 信頼度を 0〜1 に収める
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// 基準値に加減点を足して信頼度を求める
pub fn combine_confidence(base: f64, adjustments: &[f64], cap: f64) -> f64 {
    let total = adjustments.iter().fold(base, |acc, adj| acc + adj);
    clamp_confidence(total.min(cap))
}

/// 部材の平均信頼度（未設定は 0.8 とみなす）
pub fn mean_confidence(parts: &[CutPart]) -> f64 {
    if parts.is_empty() {
        return 0.0;
    }
    let sum: f64 = parts.iter().map(|p| p.confidence_or_default()).sum();
    sum / parts.len() as f64
}
