//! エッジ貼り表記
//!
//! - 短縮コード（`4S`, `2L2W`, `LW` など）の解読
//! - 自由記述（"edge all", "both long edges", "EB: 2L1W"）の解読

use crate::types::{EdgeSide, Edging};
use regex::Regex;

use EdgeSide::{L1, L2, W1, W2};

/// 短縮コード → 貼る辺
///
/// `NONE` は「貼らない」を明示するコード
pub const EDGEBAND_CODES: &[(&str, &[EdgeSide])] = &[
    ("ALL", &[L1, L2, W1, W2]),
    ("4S", &[L1, L2, W1, W2]),
    ("4E", &[L1, L2, W1, W2]),
    ("2L2W", &[L1, L2, W1, W2]),
    ("3S", &[L1, L2, W1]),
    ("2L1W", &[L1, L2, W1]),
    ("1L2W", &[L1, W1, W2]),
    ("2L", &[L1, L2]),
    ("2W", &[W1, W2]),
    ("LW", &[L1, W1]),
    ("1L1W", &[L1, W1]),
    ("1L", &[L1]),
    ("L", &[L1]),
    ("FRONT", &[L1]),
    ("F", &[L1]),
    ("1W", &[W1]),
    ("W", &[W1]),
    ("NONE", &[]),
];

/// 短縮コードを解読する
///
/// 未知のコード・`NONE`・空欄は None（加工なし）
pub fn decode_edgeband_code(code: &str) -> Option<Edging> {
    let normalized: String = code
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '+')
        .collect();

    if normalized.is_empty() {
        return None;
    }

    EDGEBAND_CODES
        .iter()
        .find(|(key, _)| *key == normalized)
        .map(|(_, sides)| Edging::from_sides(sides))
        .filter(|edging| !edging.is_empty())
}

/// 自由記述からエッジ貼りを読み取る
pub fn parse_edge_notation(text: &str) -> Option<Edging> {
    lazy_static::lazy_static! {
        static ref CODE_RE: Regex = Regex::new(
            r"(?i)\b(?:eb|edge\s*band(?:ing|ed)?|edgeband(?:ing|ed)?|edging|edges?|banding|banded)\s*[:=]?\s*([0-9]?[lw][0-9]?[lw]?|[234][se]|all|front|none)\b"
        ).unwrap();
        static ref ALL_RE: Regex = Regex::new(
            r"(?i)\b(?:all\s+(?:4\s+|four\s+)?(?:edges|sides)|(?:4|four)\s+(?:edges|sides)|edged?\s+all\s+(?:round|around)|all\s+round)\b"
        ).unwrap();
        static ref LONG_RE: Regex = Regex::new(
            r"(?i)\b(both|2|two|1|one)\s+long\s+(?:edges?|sides?)\b"
        ).unwrap();
        static ref SHORT_RE: Regex = Regex::new(
            r"(?i)\b(both|2|two|1|one)\s+short\s+(?:edges?|sides?)\b"
        ).unwrap();
        static ref FRONT_RE: Regex = Regex::new(r"(?i)\bfront\s+edge\b").unwrap();
    }

    if let Some(cap) = CODE_RE.captures(text) {
        if let Some(edging) = decode_edgeband_code(&cap[1]) {
            return Some(edging);
        }
    }

    if ALL_RE.is_match(text) {
        return Some(Edging::from_sides(&EdgeSide::ALL));
    }

    let mut sides = Vec::new();
    if let Some(cap) = LONG_RE.captures(text) {
        match cap[1].to_lowercase().as_str() {
            "1" | "one" => sides.push(L1),
            _ => sides.extend([L1, L2]),
        }
    }
    if let Some(cap) = SHORT_RE.captures(text) {
        match cap[1].to_lowercase().as_str() {
            "1" | "one" => sides.push(W1),
            _ => sides.extend([W1, W2]),
        }
    }
    if sides.is_empty() && FRONT_RE.is_match(text) {
        sides.push(L1);
    }

    if sides.is_empty() {
        None
    } else {
        Some(Edging::from_sides(&sides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table_size() {
        assert_eq!(EDGEBAND_CODES.len(), 18);
    }

    #[test]
    fn test_decode_all_four() {
        for code in ["2L2W", "4S", "ALL", "all", " 4s "] {
            let edging = decode_edgeband_code(code).expect(code);
            assert_eq!(edging.applied_sides(), vec![L1, L2, W1, W2]);
            assert!(edging.edges.values().all(|e| e.apply));
        }
    }

    #[test]
    fn test_decode_partial() {
        assert_eq!(decode_edgeband_code("2L").unwrap().applied_sides(), vec![L1, L2]);
        assert_eq!(decode_edgeband_code("LW").unwrap().applied_sides(), vec![L1, W1]);
        assert_eq!(decode_edgeband_code("2l1w").unwrap().applied_sides(), vec![L1, L2, W1]);
    }

    #[test]
    fn test_decode_none_codes() {
        assert!(decode_edgeband_code("-").is_none());
        assert!(decode_edgeband_code("0").is_none());
        assert!(decode_edgeband_code("").is_none());
        assert!(decode_edgeband_code("NONE").is_none());
        assert!(decode_edgeband_code("XYZ").is_none());
    }

    #[test]
    fn test_parse_edge_notation_codes() {
        let edging = parse_edge_notation("Shelf 560x300 EB: 2L1W").unwrap();
        assert_eq!(edging.applied_sides(), vec![L1, L2, W1]);
        let edging = parse_edge_notation("door edge all").unwrap();
        assert_eq!(edging.applied_sides().len(), 4);
    }

    #[test]
    fn test_parse_edge_notation_phrases() {
        assert_eq!(
            parse_edge_notation("banded on both long edges").unwrap().applied_sides(),
            vec![L1, L2]
        );
        assert_eq!(
            parse_edge_notation("1 long edge and 2 short edges").unwrap().applied_sides(),
            vec![L1, W1, W2]
        );
        assert_eq!(parse_edge_notation("all edges").unwrap().applied_sides().len(), 4);
        assert_eq!(parse_edge_notation("front edge only").unwrap().applied_sides(), vec![L1]);
    }

    #[test]
    fn test_parse_edge_notation_absent() {
        assert!(parse_edge_notation("Side panel 720x560 qty 2").is_none());
    }
}
