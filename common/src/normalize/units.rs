//! 単位換算
//!
//! mm / cm / inch の表記を検出し、mm単位に揃える。
//! インチは分数表記（`23 1/2`, `23-1/2`, `3/4"`）にも対応する。

use crate::types::Units;
use regex::Regex;

/// 単位表記から単位を判定
pub fn parse_unit_token(token: &str) -> Option<Units> {
    match token.trim().to_lowercase().as_str() {
        "mm" | "millimeter" | "millimeters" | "millimetre" | "millimetres" => Some(Units::Mm),
        "cm" | "centimeter" | "centimeters" | "centimetre" | "centimetres" => Some(Units::Cm),
        "in" | "inch" | "inches" | "\"" | "''" => Some(Units::Inch),
        _ => None,
    }
}

/// ヘッダーの単位表記を判定
///
/// `"L (mm)"`, `"Width [in]"`, `"Thickness, cm"` など
pub fn unit_from_header(header: &str) -> Option<Units> {
    lazy_static::lazy_static! {
        static ref HEADER_UNIT_RE: Regex = Regex::new(
            r#"(?i)[\(\[,\s]\s*(mm|cm|in|inch|inches|")\s*[\)\]]?\s*$"#
        ).unwrap();
    }

    HEADER_UNIT_RE
        .captures(header.trim())
        .and_then(|cap| parse_unit_token(&cap[1]))
}

/// テキスト中で最初に現れる単位
pub fn detect_unit_in_text(text: &str) -> Option<Units> {
    lazy_static::lazy_static! {
        static ref TEXT_UNIT_RE: Regex = Regex::new(
            r#"(?i)\d\s*(mm|cm|inches|inch|in\b|")"#
        ).unwrap();
    }

    TEXT_UNIT_RE
        .captures(text)
        .and_then(|cap| parse_unit_token(&cap[1]))
}

/// 分数を含む数値を読む
///
/// `"23 1/2"` → 23.5, `"23-1/2"` → 23.5, `"3/4"` → 0.75, `"18.5"` → 18.5
pub fn parse_mixed_number(text: &str) -> Option<f64> {
    lazy_static::lazy_static! {
        static ref MIXED_RE: Regex = Regex::new(r"^(\d+)[\s\-]+(\d+)/(\d+)$").unwrap();
        static ref FRACTION_RE: Regex = Regex::new(r"^(\d+)/(\d+)$").unwrap();
        static ref DECIMAL_RE: Regex = Regex::new(r"^\d+(\.\d+)?$|^\.\d+$").unwrap();
    }

    let text = text.trim();

    if let Some(cap) = MIXED_RE.captures(text) {
        let whole: f64 = cap[1].parse().ok()?;
        let num: f64 = cap[2].parse().ok()?;
        let den: f64 = cap[3].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(whole + num / den).filter(|v| v.is_finite());
    }

    if let Some(cap) = FRACTION_RE.captures(text) {
        let num: f64 = cap[1].parse().ok()?;
        let den: f64 = cap[2].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den).filter(|v| v.is_finite());
    }

    if DECIMAL_RE.is_match(text) {
        return text.parse().ok().filter(|v: &f64| v.is_finite());
    }

    None
}

/// 値と単位から mm を求める
pub fn to_mm(value: f64, units: Units) -> f64 {
    let mm = units.to_mm(value);
    // 0.01mm 単位に丸める
    (mm * 100.0).round() / 100.0
}

/// 単位付きの長さ表記を mm で読む
///
/// 単位がなければ `default_units` を使う
pub fn parse_length_mm(token: &str, default_units: Units) -> Option<f64> {
    lazy_static::lazy_static! {
        static ref LENGTH_RE: Regex = Regex::new(
            r#"(?i)^\s*([\d./\s\-]*\d)\s*(mm|cm|inches|inch|in|")?\s*$"#
        ).unwrap();
    }

    let cap = LENGTH_RE.captures(token)?;
    let value = parse_mixed_number(&cap[1])?;
    let units = cap
        .get(2)
        .and_then(|m| parse_unit_token(m.as_str()))
        .unwrap_or(default_units);
    Some(to_mm(value, units)).filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_token() {
        assert_eq!(parse_unit_token("MM"), Some(Units::Mm));
        assert_eq!(parse_unit_token("cm"), Some(Units::Cm));
        assert_eq!(parse_unit_token("\""), Some(Units::Inch));
        assert_eq!(parse_unit_token("ft"), None);
    }

    #[test]
    fn test_unit_from_header() {
        assert_eq!(unit_from_header("L (mm)"), Some(Units::Mm));
        assert_eq!(unit_from_header("Width [in]"), Some(Units::Inch));
        assert_eq!(unit_from_header("Thickness, cm"), Some(Units::Cm));
        assert_eq!(unit_from_header("Length"), None);
    }

    #[test]
    fn test_detect_unit_in_text() {
        assert_eq!(detect_unit_in_text("24\" x 30\""), Some(Units::Inch));
        assert_eq!(detect_unit_in_text("72cm by 56cm"), Some(Units::Cm));
        assert_eq!(detect_unit_in_text("Side 720x560"), None);
        assert_eq!(detect_unit_in_text("shelf 10 in deep"), Some(Units::Inch));
    }

    #[test]
    fn test_parse_mixed_number() {
        assert_eq!(parse_mixed_number("23 1/2"), Some(23.5));
        assert_eq!(parse_mixed_number("23-1/2"), Some(23.5));
        assert_eq!(parse_mixed_number("3/4"), Some(0.75));
        assert_eq!(parse_mixed_number("18.5"), Some(18.5));
        assert_eq!(parse_mixed_number("1/0"), None);
        assert_eq!(parse_mixed_number("abc"), None);
        assert_eq!(parse_mixed_number(&"9".repeat(400)), None);
    }

    #[test]
    fn test_parse_length_mm() {
        assert_eq!(parse_length_mm("720", Units::Mm), Some(720.0));
        assert_eq!(parse_length_mm("72cm", Units::Mm), Some(720.0));
        assert_eq!(parse_length_mm("10\"", Units::Mm), Some(254.0));
        assert_eq!(parse_length_mm("3/4 in", Units::Mm), Some(19.05));
        assert_eq!(parse_length_mm("10", Units::Inch), Some(254.0));
        assert_eq!(parse_length_mm("ten", Units::Mm), None);
        assert_eq!(parse_length_mm(&format!("{}in", "9".repeat(400)), Units::Mm), None);
    }
}
