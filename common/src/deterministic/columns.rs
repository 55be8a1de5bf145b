//! 列の自動判定
//!
//! ヘッダー行の各セルを正規表現で照合し、フィールド → 列番号の対応を作る。
//! - セルごとに最初に一致したフィールドを採用
//! - 同じフィールドは最初に一致した列を採用（上書きしない）
//! - 単位付きヘッダー（"L (mm)"）は2回目の走査で拾う
//! - 回転/木目列は rotation → rotate → grain の優先順

use crate::normalize::units::unit_from_header;
use crate::types::{ColumnField, ColumnMapping, Grain};
use regex::Regex;

lazy_static::lazy_static! {
    static ref COLUMN_PATTERNS: Vec<(ColumnField, Regex)> = vec![
        (ColumnField::Label, Regex::new(
            r"(?i)^(?:label|name|part|part\s*name|part\s*id|item|component|piece|ref|reference|designation)$"
        ).unwrap()),
        (ColumnField::Length, Regex::new(
            r"(?i)^(?:l|len|length|cutting\s*length|finished\s*length|long|height|h)$"
        ).unwrap()),
        (ColumnField::Width, Regex::new(
            r"(?i)^(?:w|wid|width|cutting\s*width|finished\s*width|breadth|b)$"
        ).unwrap()),
        (ColumnField::Thickness, Regex::new(
            r"(?i)^(?:t|th|thk|thick|thickness|cutting\s*thickness|finished\s*thickness)$"
        ).unwrap()),
        (ColumnField::Qty, Regex::new(
            r"(?i)^(?:qty\.?|quantity|count|copies|pcs|pieces|q|amount|no\.?\s*of\s*(?:pcs|pieces|parts)|#\s*req(?:uired)?)$"
        ).unwrap()),
        (ColumnField::Material, Regex::new(
            r"(?i)^(?:material|mat|matl|mat'l|board|stock|sheet|substrate|material\s*(?:id|name|code))$"
        ).unwrap()),
        (ColumnField::Edgeband, Regex::new(
            r"(?i)^(?:edge|edges|edging|edgeband|edge\s*band(?:ing)?|eb|banding|edge\s*code)$"
        ).unwrap()),
        (ColumnField::Notes, Regex::new(
            r"(?i)^(?:notes?|comments?|remarks?|description|desc|info|memo)$"
        ).unwrap()),
    ];

    static ref UNIT_SUFFIX_RE: Regex = Regex::new(
        r#"(?i)\s*[\(\[,]?\s*(?:mm|cm|in|inch|inches|")\s*[\)\]]?\s*$"#
    ).unwrap();

    static ref ROTATION_HEADER_RE: Regex = Regex::new(
        r"(?i)^(?:rotation|can\s*rotate|allow\s*rotation|rotation\s*allowed)$"
    ).unwrap();
    static ref ROTATE_HEADER_RE: Regex = Regex::new(r"(?i)^rotate\??$").unwrap();
    static ref GRAIN_HEADER_RE: Regex = Regex::new(
        r"(?i)^(?:grain|grain\s*dir(?:ection)?|orientation)$"
    ).unwrap();

    static ref NO_ROTATION_RE: Regex = Regex::new(r"(?i)^(?:n|no|false|0)$").unwrap();
    static ref GRAIN_LENGTH_RE: Regex = Regex::new(r"(?i)^(?:l|length|along.?l(?:ength)?|gl)$").unwrap();
    static ref GRAIN_WIDTH_RE: Regex = Regex::new(r"(?i)^(?:w|width|along.?w(?:idth)?|gw)$").unwrap();
    static ref ROTATION_OK_RE: Regex = Regex::new(r"(?i)^(?:y|yes|true|1|none)$").unwrap();
}

/// ヘッダーセルを比較用に整える
fn normalize_header(cell: &str) -> String {
    cell.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_end_matches(':')
        .trim()
        .to_string()
}

/// ヘッダー行から列の対応を作る
pub fn detect_column_mapping(headers: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut consumed = vec![false; normalized.len()];

    for (index, header) in normalized.iter().enumerate() {
        if header.is_empty() {
            continue;
        }
        if let Some((field, _)) = COLUMN_PATTERNS.iter().find(|(_, re)| re.is_match(header)) {
            mapping.insert_if_absent(*field, index);
            consumed[index] = true;
        }
    }

    // 単位付きヘッダー
    for (index, header) in normalized.iter().enumerate() {
        if consumed[index] || header.is_empty() {
            continue;
        }
        let Some(units) = unit_from_header(header) else {
            continue;
        };
        let stem = UNIT_SUFFIX_RE.replace(header, "").trim().to_string();
        let dimension_fields = [ColumnField::Length, ColumnField::Width, ColumnField::Thickness];
        let matched = COLUMN_PATTERNS
            .iter()
            .filter(|(field, _)| dimension_fields.contains(field))
            .find(|(_, re)| re.is_match(&stem));
        if let Some((field, _)) = matched {
            if mapping.insert_if_absent(*field, index) {
                mapping.set_unit(*field, units);
            }
            consumed[index] = true;
        }
    }

    if let Some(index) = detect_rotation_column(&normalized) {
        mapping.insert_if_absent(ColumnField::Grain, index);
    }

    mapping
}

/// 回転/木目列を探す（rotation → rotate → grain）
fn detect_rotation_column(headers: &[String]) -> Option<usize> {
    [&*ROTATION_HEADER_RE, &*ROTATE_HEADER_RE, &*GRAIN_HEADER_RE]
        .iter()
        .find_map(|re| headers.iter().position(|h| re.is_match(h)))
}

/// 回転可否の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationHint {
    pub allow_rotation: bool,
    pub grain: Option<Grain>,
}

/// 回転/木目セルの値から回転可否を判定する
///
/// 未知の値は None（既定値のまま）
pub fn infer_rotation(value: &str) -> Option<RotationHint> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if NO_ROTATION_RE.is_match(value) {
        return Some(RotationHint {
            allow_rotation: false,
            grain: None,
        });
    }
    if GRAIN_LENGTH_RE.is_match(value) {
        return Some(RotationHint {
            allow_rotation: false,
            grain: Some(Grain::Length),
        });
    }
    if GRAIN_WIDTH_RE.is_match(value) {
        return Some(RotationHint {
            allow_rotation: false,
            grain: Some(Grain::Width),
        });
    }
    if ROTATION_OK_RE.is_match(value) {
        let grain = value.eq_ignore_ascii_case("none").then_some(Grain::None);
        return Some(RotationHint {
            allow_rotation: true,
            grain,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Units;

    fn headers(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_detect_basic_mapping() {
        let mapping = detect_column_mapping(&headers(&["Part", "L", "W", "Qty"]));
        assert_eq!(mapping.get(ColumnField::Label), Some(0));
        assert_eq!(mapping.get(ColumnField::Length), Some(1));
        assert_eq!(mapping.get(ColumnField::Width), Some(2));
        assert_eq!(mapping.get(ColumnField::Qty), Some(3));
    }

    #[test]
    fn test_detect_full_mapping() {
        let mapping = detect_column_mapping(&headers(&[
            "Name", "Length", "Width", "Thickness", "Quantity", "Material", "Grain", "Edging", "Notes",
        ]));
        assert_eq!(mapping.len(), 9);
        assert_eq!(mapping.get(ColumnField::Grain), Some(6));
        assert_eq!(mapping.get(ColumnField::Edgeband), Some(7));
        assert_eq!(mapping.get(ColumnField::Notes), Some(8));
    }

    #[test]
    fn test_first_header_wins() {
        let mapping = detect_column_mapping(&headers(&["Length", "Width", "Len"]));
        assert_eq!(mapping.get(ColumnField::Length), Some(0));
    }

    #[test]
    fn test_unit_suffixed_headers() {
        let mapping = detect_column_mapping(&headers(&["Part", "L (mm)", "W [in]", "Thickness, cm"]));
        assert_eq!(mapping.get(ColumnField::Length), Some(1));
        assert_eq!(mapping.get(ColumnField::Width), Some(2));
        assert_eq!(mapping.get(ColumnField::Thickness), Some(3));
        assert_eq!(mapping.unit_for(ColumnField::Length), Some(Units::Mm));
        assert_eq!(mapping.unit_for(ColumnField::Width), Some(Units::Inch));
        assert_eq!(mapping.unit_for(ColumnField::Thickness), Some(Units::Cm));
    }

    #[test]
    fn test_no_dimension_headers() {
        let mapping = detect_column_mapping(&headers(&["Name", "Description"]));
        assert!(!mapping.has_dimensions());
        assert_eq!(mapping.get(ColumnField::Label), Some(0));
        assert_eq!(mapping.get(ColumnField::Notes), Some(1));
    }

    #[test]
    fn test_rotation_column_priority() {
        let mapping = detect_column_mapping(&headers(&["L", "W", "Grain", "Rotate"]));
        assert_eq!(mapping.get(ColumnField::Grain), Some(3));
        let mapping = detect_column_mapping(&headers(&["L", "W", "Rotate", "Rotation"]));
        assert_eq!(mapping.get(ColumnField::Grain), Some(3));
    }

    #[test]
    fn test_header_normalization() {
        let mapping = detect_column_mapping(&headers(&["\"Length\"", "Width:", " qty "]));
        assert_eq!(mapping.get(ColumnField::Length), Some(0));
        assert_eq!(mapping.get(ColumnField::Width), Some(1));
        assert_eq!(mapping.get(ColumnField::Qty), Some(2));
    }

    #[test]
    fn test_infer_rotation_locked() {
        let hint = infer_rotation("L").unwrap();
        assert!(!hint.allow_rotation);
        assert_eq!(hint.grain, Some(Grain::Length));
        assert!(!infer_rotation("no").unwrap().allow_rotation);
        assert!(!infer_rotation("along-w").unwrap().allow_rotation);
        assert_eq!(infer_rotation("GW").unwrap().grain, Some(Grain::Width));
    }

    #[test]
    fn test_infer_rotation_allowed() {
        assert!(infer_rotation("Y").unwrap().allow_rotation);
        let hint = infer_rotation("none").unwrap();
        assert!(hint.allow_rotation);
        assert_eq!(hint.grain, Some(Grain::None));
    }

    #[test]
    fn test_infer_rotation_unknown() {
        assert!(infer_rotation("sideways").is_none());
        assert!(infer_rotation("").is_none());
    }
}
