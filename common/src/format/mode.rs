//! パーサーモード推定
//!
//! 形式判定とは独立に、テキストを「パターン解析で足りるか」
//! 「AI解析が必要か」で分類する補助ヒューリスティック。
//!
//! 5つの指標（構造・寸法密度・自然文らしさ・行の一貫性・行あたりトークン数）と
//! 表記揺れ検出の結果を、pattern / ai の2つの得点に振り分けて比較する。
//! 点数と閾値は調整用の値で、比較の向きだけが意味を持つ。

use super::{detect_format, SourceFormat};
use crate::normalize::non_blank_lines;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 推奨モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserMode {
    Pattern,
    Ai,
}

/// 表記揺れ（同じ項目に複数の書き方が混在しているか）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatVariation {
    pub quantity_notations: usize,
    pub dimension_separators: usize,
    pub edge_notations: usize,
    pub operation_notations: usize,
    /// 2種類以上の書き方が混在している項目数
    pub fields_with_variation: usize,
}

impl FormatVariation {
    pub fn has_variation(&self) -> bool {
        self.fields_with_variation > 0
    }
}

/// 判定に使った指標
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModeMetrics {
    pub structural_score: f64,
    pub dimension_density: f64,
    pub natural_language_score: f64,
    pub consistency_score: f64,
    pub avg_tokens_per_line: f64,
    pub variation: FormatVariation,
}

/// 推定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserModeRecommendation {
    pub recommended: ParserMode,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub metrics: ModeMetrics,
    pub pattern_score: f64,
    pub ai_score: f64,
}

lazy_static::lazy_static! {
    static ref DIMENSION_RE: Regex = Regex::new(
        r#"(?i)\d+(?:\.\d+)?\s*(?:mm|cm|"|in)?\s*(?:[x×*]|\bby\b)\s*\d+"#
    ).unwrap();
    static ref BORDER_RE: Regex = Regex::new(r"^[\s|+\-=_]{5,}$").unwrap();
    static ref CSV_NUMERIC_RE: Regex = Regex::new(r"\d+\s*[,;]\s*\d+").unwrap();
    static ref SENTENCE_END_RE: Regex = Regex::new(r"[.!?](?:\s+[A-Z]|\s*$)").unwrap();
    static ref IMPERATIVE_RE: Regex = Regex::new(
        r"(?i)\b(please|can you|could you|would you|i need you to|help me)\b"
    ).unwrap();

    static ref QTY_WORD_RE: Regex = Regex::new(r"(?i)\b(?:qty|quantity|count)\s*[:=]?\s*\d+").unwrap();
    static ref QTY_TIMES_RE: Regex = Regex::new(r"(?i)(?:^|\s)x\d+\b|^\s*\d+\s*x\s+[a-z]").unwrap();
    static ref QTY_PARENS_RE: Regex = Regex::new(r"\(\s*\d+\s*\)").unwrap();
    static ref QTY_PIECES_RE: Regex = Regex::new(r"(?i)\b\d+\s*(?:pcs?|pieces?|off)\b").unwrap();
    static ref QTY_AT_RE: Regex = Regex::new(r"^\s*\d+\s*@").unwrap();

    static ref SEP_X_RE: Regex = Regex::new(r"(?i)\d\s*x\s*\d").unwrap();
    static ref SEP_TIMES_RE: Regex = Regex::new(r"\d\s*[×✕]\s*\d").unwrap();
    static ref SEP_STAR_RE: Regex = Regex::new(r"\d\s*\*\s*\d").unwrap();
    static ref SEP_BY_RE: Regex = Regex::new(r"(?i)\d\s+by\s+\d").unwrap();

    static ref EDGE_CODE_RE: Regex = Regex::new(r"(?i)\b(?:2L2W|4S|2L1W|1L2W|1L1W|2L|2W|LW|3S)\b").unwrap();
    static ref EDGE_WORD_RE: Regex = Regex::new(r"(?i)\b(?:all\s+edges|edges?\s+all|long\s+edges?|short\s+edges?|front\s+edge)\b").unwrap();
    static ref EDGE_EB_RE: Regex = Regex::new(r"(?i)\bEB\b|\bbanding\b").unwrap();

    static ref OP_GROOVE_RE: Regex = Regex::new(r"(?i)\b(?:groove|dado|rebate|rabbet)").unwrap();
    static ref OP_HOLE_RE: Regex = Regex::new(r"(?i)\b(?:holes?|drill|bore|hinge)").unwrap();
    static ref OP_ROUTE_RE: Regex = Regex::new(r"(?i)\b(?:rout|profile|cnc)").unwrap();
    static ref OP_ABBREV_RE: Regex = Regex::new(r"\b(?:GRV|DRL|RTE|HNG)\b").unwrap();
}

/// 自然文らしさの手がかり
const NATURAL_LANGUAGE_INDICATORS: &[&str] = &[
    "please", "thanks", "thank you", "could you", "can you", "i need", "i want", "we need",
    "i'd like", "would like", "make", "about", "around", "approximately", "roughly",
    "should", "would", "with", "and", "for the", "of them", "each", "also", "then",
    "long", "wide", "tall", "thick", "large", "small", "nice", "some",
];

/// テキストに対してパーサーモードを推定する
pub fn analyze_text_for_parser_mode(text: &str) -> ParserModeRecommendation {
    let lines: Vec<&str> = non_blank_lines(text).into_iter().map(|(_, l)| l).collect();
    let metrics = compute_metrics(&lines);

    if let Some(reason) = should_force_ai(&lines) {
        return forced(ParserMode::Ai, 0.9, reason, metrics);
    }
    if let Some(reason) = should_force_pattern(text, &lines) {
        return forced(ParserMode::Pattern, 0.95, reason, metrics);
    }

    let mut pattern_score: f64 = 0.0;
    let mut ai_score: f64 = 0.0;
    let mut reasons = Vec::new();

    if metrics.structural_score > 0.5 {
        pattern_score += 3.0;
        reasons.push(format!("table structure ({:.2})", metrics.structural_score));
    } else if metrics.structural_score > 0.2 {
        pattern_score += 1.0;
        reasons.push(format!("partial table structure ({:.2})", metrics.structural_score));
    }

    if metrics.dimension_density > 0.7 {
        pattern_score += 2.0;
        reasons.push(format!("dense dimension tokens ({:.2})", metrics.dimension_density));
    } else if metrics.dimension_density > 0.3 {
        pattern_score += 1.0;
        reasons.push(format!("some dimension tokens ({:.2})", metrics.dimension_density));
    } else if metrics.dimension_density == 0.0 {
        ai_score += 2.0;
        reasons.push("no NxM dimension tokens".to_string());
    }

    if metrics.natural_language_score > 0.5 {
        ai_score += 3.0;
        reasons.push(format!("natural language ({:.2})", metrics.natural_language_score));
    } else if metrics.natural_language_score > 0.2 {
        ai_score += 1.0;
        reasons.push(format!("some prose ({:.2})", metrics.natural_language_score));
    }

    if metrics.consistency_score > 0.7 {
        pattern_score += 2.0;
        reasons.push(format!("consistent lines ({:.2})", metrics.consistency_score));
    } else if metrics.consistency_score < 0.4 {
        ai_score += 1.0;
        reasons.push(format!("irregular lines ({:.2})", metrics.consistency_score));
    }

    if metrics.avg_tokens_per_line > 15.0 {
        ai_score += 2.0;
        reasons.push(format!("long lines ({:.1} tokens)", metrics.avg_tokens_per_line));
    } else if metrics.avg_tokens_per_line > 0.0 && metrics.avg_tokens_per_line <= 6.0 {
        pattern_score += 1.0;
        reasons.push(format!("short lines ({:.1} tokens)", metrics.avg_tokens_per_line));
    }

    match metrics.variation.fields_with_variation {
        0 => {}
        1 => {
            ai_score += 3.0;
            reasons.push("mixed notations for one field".to_string());
        }
        _ => {
            ai_score += 4.0;
            reasons.push(format!(
                "mixed notations across {} fields",
                metrics.variation.fields_with_variation
            ));
        }
    }

    let total = pattern_score + ai_score;
    let confidence = if total > 0.0 {
        ((pattern_score - ai_score).abs() / total + 0.5).min(0.95)
    } else {
        0.5
    };
    let recommended = if ai_score > pattern_score {
        ParserMode::Ai
    } else {
        ParserMode::Pattern
    };

    ParserModeRecommendation {
        recommended,
        confidence,
        reasons,
        metrics,
        pattern_score,
        ai_score,
    }
}

fn forced(
    mode: ParserMode,
    confidence: f64,
    reason: String,
    metrics: ModeMetrics,
) -> ParserModeRecommendation {
    let (pattern_score, ai_score) = match mode {
        ParserMode::Pattern => (1.0, 0.0),
        ParserMode::Ai => (0.0, 1.0),
    };
    ParserModeRecommendation {
        recommended: mode,
        confidence,
        reasons: vec![reason],
        metrics,
        pattern_score,
        ai_score,
    }
}

/// AI解析を強制する条件
///
/// - 区切り文字のない長い1行
/// - 依頼文（please / can you など）
pub fn should_force_ai(lines: &[&str]) -> Option<String> {
    if lines.len() == 1 {
        let line = lines[0];
        let has_delimiter = line.contains(['\t', ',', ';', '|']);
        if line.chars().count() > 200 && !has_delimiter {
            return Some("single long line without delimiters".to_string());
        }
    }

    lines
        .iter()
        .find_map(|l| IMPERATIVE_RE.find(l))
        .map(|m| format!("imperative phrase \"{}\"", m.as_str().to_lowercase()))
}

/// パターン解析を強制する条件
///
/// - 形式判定の信頼度が0.9以上で自由記述ではない
/// - 5行以上がすべて同じ数（3以上）のタブを持つ
pub fn should_force_pattern(text: &str, lines: &[&str]) -> Option<String> {
    let detection = detect_format(text);
    if detection.confidence >= 0.9 && detection.format != SourceFormat::FreeForm {
        return Some(format!(
            "known format {} ({:.2})",
            detection.format, detection.confidence
        ));
    }

    if lines.len() >= 5 {
        let first = lines[0].matches('\t').count();
        if first >= 3 && lines.iter().all(|l| l.matches('\t').count() == first) {
            return Some(format!("uniform tab table ({} tabs per line)", first));
        }
    }

    None
}

fn compute_metrics(lines: &[&str]) -> ModeMetrics {
    if lines.is_empty() {
        return ModeMetrics::default();
    }
    let n = lines.len() as f64;

    // 構造
    let tab_lines = lines.iter().filter(|l| l.contains('\t')).count() as f64;
    let pipe_lines = lines.iter().filter(|l| l.matches('|').count() >= 2).count() as f64;
    let border_lines = lines.iter().filter(|l| BORDER_RE.is_match(l)).count() as f64;
    let csv_lines = lines.iter().filter(|l| CSV_NUMERIC_RE.is_match(l)).count() as f64;
    let structural_score =
        ((tab_lines * 1.0 + pipe_lines * 0.8 + border_lines * 0.5 + csv_lines * 0.7) / n).min(1.0);

    // 寸法密度
    let dim_hits: usize = lines.iter().map(|l| DIMENSION_RE.find_iter(l).count()).sum();
    let dimension_density = (dim_hits as f64 / n).min(1.0);

    // 自然文らしさ
    let mut nl_hits = 0usize;
    for line in lines {
        let lower = format!(" {} ", line.to_lowercase());
        nl_hits += NATURAL_LANGUAGE_INDICATORS
            .iter()
            .filter(|w| lower.contains(&format!(" {} ", w)))
            .count();
        nl_hits += SENTENCE_END_RE.find_iter(line).count();
    }
    let natural_language_score = (nl_hits as f64 / n / 3.0).min(1.0);

    // 行の一貫性
    let lengths: Vec<f64> = lines.iter().map(|l| l.chars().count() as f64).collect();
    let tokens: Vec<f64> = lines.iter().map(|l| l.split_whitespace().count() as f64).collect();
    let (len_mean, len_var) = mean_and_variance(&lengths);
    let (tok_mean, tok_var) = mean_and_variance(&tokens);
    let cv = if len_mean > 0.0 { len_var.sqrt() / len_mean } else { 0.0 };
    let mut consistency_score = 1.0 / (1.0 + cv);
    if lines.len() > 1 && tok_var < 1.0 {
        consistency_score = (consistency_score + 0.2).min(1.0);
    }

    ModeMetrics {
        structural_score,
        dimension_density,
        natural_language_score,
        consistency_score,
        avg_tokens_per_line: tok_mean,
        variation: detect_format_variation(lines),
    }
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, var)
}

/// 表記揺れを検出する
///
/// 数量・寸法区切り・エッジ・加工の4項目それぞれについて、
/// 文書内で使われている書き方の種類数を数える。
pub fn detect_format_variation(lines: &[&str]) -> FormatVariation {
    let count_kinds = |patterns: &[(&str, &Regex)]| -> usize {
        let mut kinds = HashSet::new();
        for line in lines {
            for (name, re) in patterns {
                if re.is_match(line) {
                    kinds.insert(*name);
                }
            }
        }
        kinds.len()
    };

    let quantity_notations = count_kinds(&[
        ("word", &*QTY_WORD_RE),
        ("times", &*QTY_TIMES_RE),
        ("parens", &*QTY_PARENS_RE),
        ("pieces", &*QTY_PIECES_RE),
        ("at", &*QTY_AT_RE),
    ]);
    let dimension_separators = count_kinds(&[
        ("x", &*SEP_X_RE),
        ("times", &*SEP_TIMES_RE),
        ("star", &*SEP_STAR_RE),
        ("by", &*SEP_BY_RE),
    ]);
    let edge_notations = count_kinds(&[
        ("code", &*EDGE_CODE_RE),
        ("word", &*EDGE_WORD_RE),
        ("eb", &*EDGE_EB_RE),
    ]);
    let operation_notations = count_kinds(&[
        ("groove", &*OP_GROOVE_RE),
        ("hole", &*OP_HOLE_RE),
        ("route", &*OP_ROUTE_RE),
        ("abbrev", &*OP_ABBREV_RE),
    ]);

    let fields_with_variation = [
        quantity_notations,
        dimension_separators,
        edge_notations,
        operation_notations,
    ]
    .iter()
    .filter(|c| **c >= 2)
    .count();

    FormatVariation {
        quantity_notations,
        dimension_separators,
        edge_notations,
        operation_notations,
        fields_with_variation,
    }
}
