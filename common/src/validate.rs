//! 部材の検証
//!
//! 部材を却下せず、警告とエラーの文言だけを返す。

use crate::types::{CutPart, Grain};

/// 想定する板厚の範囲（mm）
pub const THICKNESS_RANGE_MM: (f64, f64) = (1.0, 100.0);

/// これを超える縦横比は警告
pub const MAX_ASPECT_RATIO: f64 = 50.0;

/// 検証結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl PartValidation {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}

/// 部材を検証する
pub fn validate_part(part: &CutPart) -> PartValidation {
    let mut result = PartValidation::default();

    if part.size.l <= 0.0 || !part.size.l.is_finite() {
        result.errors.push(format!("Length must be positive (got {})", part.size.l));
    }
    if part.size.w <= 0.0 || !part.size.w.is_finite() {
        result.errors.push(format!("Width must be positive (got {})", part.size.w));
    }
    if part.thickness_mm <= 0.0 || !part.thickness_mm.is_finite() {
        result
            .errors
            .push(format!("Thickness must be positive (got {})", part.thickness_mm));
    }
    if part.qty < 1 {
        result.errors.push("Quantity must be at least 1".to_string());
    }

    let grained = matches!(part.grain, Some(Grain::Length) | Some(Grain::Width));
    if grained && part.allow_rotation == Some(true) {
        result
            .warnings
            .push("Grain direction is set but rotation is allowed".to_string());
    }

    let (min_t, max_t) = THICKNESS_RANGE_MM;
    if part.thickness_mm > 0.0 && !(min_t..=max_t).contains(&part.thickness_mm) {
        result.warnings.push(format!(
            "Unusual thickness {} mm (expected {}-{} mm)",
            part.thickness_mm, min_t, max_t
        ));
    }

    if part.size.l > 0.0 && part.size.w > 0.0 {
        let ratio = part.size.l.max(part.size.w) / part.size.l.min(part.size.w);
        if ratio > MAX_ASPECT_RATIO {
            result
                .warnings
                .push(format!("Extreme aspect ratio {:.0}:1", ratio));
        }
    }

    result
}

/// 検証結果を部材の監査情報に書き込む（重複は追加しない）
pub fn annotate_part(part: &mut CutPart) {
    let validation = validate_part(part);
    for warning in validation.warnings {
        if !part.audit.warnings.contains(&warning) {
            part.audit.warnings.push(warning);
        }
    }
    for error in validation.errors {
        if !part.audit.errors.contains(&error) {
            part.audit.errors.push(error);
        }
    }
}
