//! 言語モデル応答の解読
//!
//! 応答テキストからJSONを抽出し、ゆるい形の部材オブジェクトを
//! 他の層と同じ既定値で `CutPart` に変換する。

use crate::deterministic::infer_rotation;
use crate::error::{Error, Result};
use crate::normalize::edges::{decode_edgeband_code, parse_edge_notation};
use crate::normalize::units::{parse_length_mm, parse_unit_token};
use crate::normalize::clamp_confidence;
use crate::types::{
    CutPart, EdgeSide, Edging, Operation, ParseOptions, Size, SourceMethod, Units,
};
use serde::Deserialize;
use serde_json::Value;

/// 応答からJSON部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の [...] 配列または {...} オブジェクト
pub fn extract_json(response: &str) -> Result<&str> {
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7;
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    // 先に現れた括弧の種類で閉じ括弧を決める
    if let Some(start) = response.find(['[', '{']) {
        let close = if response[start..].starts_with('[') { ']' } else { '}' };
        if let Some(end) = response.rfind(close) {
            if end >= start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("No JSON found in model response".into()))
}

/// 数値または "720mm" のような文字列
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    fn to_mm(&self, units: Units) -> Option<f64> {
        match self {
            LooseNumber::Number(v) => Some(units.to_mm(*v)),
            LooseNumber::Text(s) => parse_length_mm(s, units),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            LooseNumber::Number(v) => Some(*v),
            LooseNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LooseSize {
    #[serde(alias = "l", alias = "length")]
    #[serde(rename = "L")]
    l: Option<LooseNumber>,
    #[serde(alias = "w", alias = "width")]
    #[serde(rename = "W")]
    w: Option<LooseNumber>,
}

/// モデルが返す部材オブジェクト（キー名の揺れを吸収）
#[derive(Debug, Deserialize)]
struct LoosePart {
    #[serde(default, alias = "name", alias = "part", alias = "description")]
    label: Option<String>,
    #[serde(default, alias = "quantity", alias = "count")]
    qty: Option<LooseNumber>,
    #[serde(default)]
    size: Option<LooseSize>,
    #[serde(default, alias = "L", alias = "len")]
    length: Option<LooseNumber>,
    #[serde(default, alias = "W", alias = "wid")]
    width: Option<LooseNumber>,
    #[serde(default, alias = "thickness_mm", alias = "T", alias = "thk")]
    thickness: Option<LooseNumber>,
    #[serde(default, alias = "material_id")]
    material: Option<String>,
    #[serde(default, alias = "rotation")]
    grain: Option<String>,
    #[serde(default)]
    allow_rotation: Option<bool>,
    #[serde(default, alias = "edgebanding", alias = "edge_banding", alias = "edges")]
    edging: Option<Value>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// 応答を部材リストに変換する
///
/// 戻り値は (部材, 警告)。不変条件を満たさない部材は警告付きで除外する。
pub fn parse_llm_response(raw: &str, options: &ParseOptions) -> Result<(Vec<CutPart>, Vec<String>)> {
    let json_str = extract_json(raw)?;
    let value: Value = serde_json::from_str(json_str.trim())
        .map_err(|e| Error::Parse(format!("Model JSON parse error: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("parts") {
            Some(Value::Array(items)) => items,
            _ => return Err(Error::Parse("Model JSON has no parts array".into())),
        },
        _ => return Err(Error::Parse("Model JSON is not an array".into())),
    };

    let mut parts = Vec::new();
    let mut warnings = Vec::new();

    for (i, item) in items.into_iter().enumerate() {
        let loose: LoosePart = match serde_json::from_value(item) {
            Ok(p) => p,
            Err(e) => {
                warnings.push(format!("Model part {} ignored: {}", i + 1, e));
                continue;
            }
        };
        match to_cut_part(loose, options, parts.len() + 1) {
            Ok(part) => parts.push(part),
            Err(reason) => warnings.push(format!("Model part {} dropped: {}", i + 1, reason)),
        }
    }

    Ok((parts, warnings))
}

fn to_cut_part(loose: LoosePart, options: &ParseOptions, ordinal: usize) -> std::result::Result<CutPart, String> {
    let units = loose
        .units
        .as_deref()
        .and_then(parse_unit_token)
        .unwrap_or_else(|| options.units());

    let (length, width) = match &loose.size {
        Some(size) => (size.l.as_ref(), size.w.as_ref()),
        None => (loose.length.as_ref(), loose.width.as_ref()),
    };
    let length = length.and_then(|v| v.to_mm(units)).unwrap_or(0.0);
    let width = width.and_then(|v| v.to_mm(units)).unwrap_or(0.0);
    if length <= 0.0 || width <= 0.0 {
        return Err(format!("invalid size {} x {}", length, width));
    }

    let thickness = loose
        .thickness
        .as_ref()
        .and_then(|v| v.to_mm(units))
        .filter(|t| *t > 0.0)
        .unwrap_or_else(|| options.thickness());

    let material = loose
        .material
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| options.material());

    let mut part = CutPart::new(
        format!("P{:03}", ordinal),
        Size::new(length, width),
        thickness,
        material,
        SourceMethod::Api,
    );
    part.label = loose.label.filter(|l| !l.trim().is_empty());
    part.notes = loose.notes.filter(|n| !n.trim().is_empty());
    part.qty = loose
        .qty
        .as_ref()
        .and_then(LooseNumber::as_f64)
        .map(|q| q.round().max(1.0) as u32)
        .unwrap_or(1);

    part.allow_rotation = Some(true);
    if let Some(hint) = loose.grain.as_deref().and_then(infer_rotation) {
        part.allow_rotation = Some(hint.allow_rotation);
        part.grain = hint.grain;
    }
    if let Some(allow) = loose.allow_rotation {
        part.allow_rotation = Some(allow);
    }

    if let Some(edging) = loose.edging.as_ref().and_then(decode_edging_value) {
        part.push_op(Operation::Edging(edging));
    }

    part.audit.confidence = loose.confidence.map(clamp_confidence);

    Ok(part)
}

/// エッジ指定の値を解読する
///
/// - 文字列: 短縮コード（"2L2W"）または自由記述
/// - 配列: 辺名の列（["L1", "W1"]）
fn decode_edging_value(value: &Value) -> Option<Edging> {
    match value {
        Value::String(s) => decode_edgeband_code(s).or_else(|| parse_edge_notation(s)),
        Value::Array(items) => {
            let sides: Vec<EdgeSide> = items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| match s.trim().to_uppercase().as_str() {
                    "L1" => Some(EdgeSide::L1),
                    "L2" => Some(EdgeSide::L2),
                    "W1" => Some(EdgeSide::W1),
                    "W2" => Some(EdgeSide::W2),
                    _ => None,
                })
                .collect();
            if sides.is_empty() {
                None
            } else {
                Some(Edging::from_sides(&sides))
            }
        }
        _ => None,
    }
}
