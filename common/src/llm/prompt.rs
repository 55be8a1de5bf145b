//! カットリスト抽出プロンプト

use crate::types::{DimOrder, ParseOptions, Units};

/// 言語モデルに渡す抽出プロンプトを作る
///
/// # Arguments
/// * `text` - 前の層で読めなかった残余テキスト
/// * `options` - 既定値・単位・寸法順のヒント
pub fn build_cutlist_prompt(text: &str, options: &ParseOptions) -> String {
    let units = match options.units {
        Some(Units::Mm) => "millimetres",
        Some(Units::Cm) => "centimetres",
        Some(Units::Inch) => "inches",
        None => "millimetres unless the text says otherwise",
    };
    let dim_order = match options.dim_order_hint {
        DimOrder::LxW => "Dimension pairs are written length first (L x W).",
        DimOrder::WxL => "Dimension pairs are written width first (W x L).",
        DimOrder::Infer => "Treat the longer side of each pair as the length.",
    };

    format!(
        r#"You are a cabinet shop estimator. Extract every cut part from the text below.

## Rules
- One object per distinct part. Keep the quantity in "qty"
- Dimensions are in {units}. {dim_order}
- Default thickness is {thickness} mm, default material is "{material}"
- Put grain direction in "grain" as "length", "width" or "none"
- Put edge banding in "edging" as a code (e.g. "2L2W", "2L", "LW") or a list of sides ("L1", "L2", "W1", "W2")
- Skip headings, totals and lines that are not parts
- Add "confidence" between 0 and 1 for each part

## Output format (JSON array only, no explanation)
[
  {{
    "label": "part name",
    "qty": 1,
    "L": 720,
    "W": 560,
    "thickness_mm": 18,
    "material": "material name",
    "grain": "none",
    "edging": "2L",
    "notes": "",
    "confidence": 0.8
  }}
]

## Text
{text}"#,
        units = units,
        dim_order = dim_order,
        thickness = options.thickness(),
        material = options.material(),
        text = text.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_text_and_defaults() {
        let prompt = build_cutlist_prompt("two doors seven hundred tall", &ParseOptions::default());
        assert!(prompt.contains("two doors seven hundred tall"));
        assert!(prompt.contains("18 mm"));
        assert!(prompt.contains("\"default\""));
        assert!(prompt.contains("JSON array only"));
    }

    #[test]
    fn test_prompt_reflects_options() {
        let options = ParseOptions {
            units: Some(Units::Inch),
            dim_order_hint: DimOrder::WxL,
            default_material_id: Some("maple-ply".to_string()),
            ..ParseOptions::default()
        };
        let prompt = build_cutlist_prompt("x", &options);
        assert!(prompt.contains("inches"));
        assert!(prompt.contains("width first"));
        assert!(prompt.contains("maple-ply"));
    }
}
