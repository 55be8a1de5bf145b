//! カットリストの型定義
//!
//! パイプライン全体で共有される型:
//! - CutPart: 正規化済みの部材（パーサーの出力単位）
//! - Operation: エッジ貼り・溝・穴などの加工情報
//! - ParseOptions: 解析オプション
//! - ColumnMapping / FailedRow: 表形式パースの中間データ

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 既定の板厚（mm）
pub const DEFAULT_THICKNESS_MM: f64 = 18.0;

/// 既定の材料ID
pub const DEFAULT_MATERIAL_ID: &str = "default";

/// 信頼度未設定の部材に使う値
pub const DEFAULT_PART_CONFIDENCE: f64 = 0.8;

/// 部材の取得元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMethod {
    Manual,
    PasteParser,
    ExcelTable,
    Ocr,
    Voice,
    Api,
}

/// 木目方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    #[default]
    None,
    Length,
    Width,
}

/// 仕上がり寸法（mm）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    #[serde(rename = "L")]
    pub l: f64,
    #[serde(rename = "W")]
    pub w: f64,
}

impl Size {
    pub fn new(l: f64, w: f64) -> Self {
        Self { l, w }
    }
}

/// 部材の4辺
///
/// L1/L2 が長辺、W1/W2 が短辺
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeSide {
    L1,
    L2,
    W1,
    W2,
}

impl EdgeSide {
    pub const ALL: [EdgeSide; 4] = [EdgeSide::L1, EdgeSide::L2, EdgeSide::W1, EdgeSide::W2];
}

/// 1辺のエッジ貼り指定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub apply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edgeband_id: Option<String>,
}

/// エッジ貼り加工
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Edging {
    pub edges: BTreeMap<EdgeSide, EdgeSpec>,
}

impl Edging {
    /// 指定した辺すべてに貼る
    pub fn from_sides(sides: &[EdgeSide]) -> Self {
        let edges = sides
            .iter()
            .map(|side| {
                (
                    *side,
                    EdgeSpec {
                        apply: true,
                        edgeband_id: None,
                    },
                )
            })
            .collect();
        Self { edges }
    }

    /// 貼る辺の一覧（L1, L2, W1, W2 の順）
    pub fn applied_sides(&self) -> Vec<EdgeSide> {
        self.edges
            .iter()
            .filter(|(_, spec)| spec.apply)
            .map(|(side, _)| *side)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.applied_sides().is_empty()
    }
}

/// 加工情報
///
/// 既知の加工はそれぞれの型で持ち、未知の加工は `Extension` に
/// JSONのまま保持する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Edging(Edging),
    Groove {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        side: Option<EdgeSide>,
        note: String,
    },
    Hole {
        pattern: String,
    },
    Routing {
        note: String,
    },
    Extension {
        kind: String,
        payload: serde_json::Value,
    },
}

/// 監査情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub source_method: SourceMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_text_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub human_verified: bool,
}

impl Audit {
    pub fn new(source_method: SourceMethod) -> Self {
        Self {
            source_method,
            source_ref: None,
            parsed_text_snippet: None,
            confidence: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            human_verified: false,
        }
    }
}

/// 部材（パーサーの出力単位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutPart {
    pub part_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub qty: u32,
    pub size: Size,
    pub thickness_mm: f64,
    pub material_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grain: Option<Grain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_rotation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ops: Option<Vec<Operation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub audit: Audit,
}

impl CutPart {
    pub fn new(
        part_id: impl Into<String>,
        size: Size,
        thickness_mm: f64,
        material_id: impl Into<String>,
        source_method: SourceMethod,
    ) -> Self {
        Self {
            part_id: part_id.into(),
            label: None,
            qty: 1,
            size,
            thickness_mm,
            material_id: material_id.into(),
            grain: None,
            allow_rotation: None,
            ops: None,
            notes: None,
            audit: Audit::new(source_method),
        }
    }

    /// エッジ貼り加工を取得
    pub fn edging(&self) -> Option<&Edging> {
        self.ops.as_ref()?.iter().find_map(|op| match op {
            Operation::Edging(edging) => Some(edging),
            _ => None,
        })
    }

    /// 加工を追加
    pub fn push_op(&mut self, op: Operation) {
        self.ops.get_or_insert_with(Vec::new).push(op);
    }

    /// 信頼度（未設定なら 0.8）
    pub fn confidence_or_default(&self) -> f64 {
        self.audit.confidence.unwrap_or(DEFAULT_PART_CONFIDENCE)
    }

    /// 寸法・数量の不変条件を満たすか
    pub fn satisfies_invariants(&self) -> bool {
        [self.size.l, self.size.w, self.thickness_mm]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
            && self.qty >= 1
    }
}

/// 入力の単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    #[default]
    Mm,
    Cm,
    Inch,
}

impl Units {
    /// mmへ変換
    pub fn to_mm(self, value: f64) -> f64 {
        match self {
            Units::Mm => value,
            Units::Cm => value * 10.0,
            Units::Inch => value * 25.4,
        }
    }
}

/// 寸法の並び順ヒント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DimOrder {
    #[default]
    #[serde(rename = "LxW")]
    LxW,
    #[serde(rename = "WxL")]
    WxL,
    #[serde(rename = "infer")]
    Infer,
}

impl DimOrder {
    /// 読み取った2値を (L, W) に並べ替える
    pub fn arrange(self, first: f64, second: f64) -> (f64, f64) {
        match self {
            DimOrder::LxW => (first, second),
            DimOrder::WxL => (second, first),
            DimOrder::Infer if second > first => (second, first),
            DimOrder::Infer => (first, second),
        }
    }
}

/// 表の区切り文字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    Tab,
    Comma,
    Semicolon,
    Pipe,
    /// 2つ以上連続する空白
    MultiSpace,
}

impl Delimiter {
    /// 自動検出の候補（優先順）
    pub const CANDIDATES: [Delimiter; 4] = [
        Delimiter::Tab,
        Delimiter::Comma,
        Delimiter::Semicolon,
        Delimiter::Pipe,
    ];

    pub fn as_char(self) -> Option<char> {
        match self {
            Delimiter::Tab => Some('\t'),
            Delimiter::Comma => Some(','),
            Delimiter::Semicolon => Some(';'),
            Delimiter::Pipe => Some('|'),
            Delimiter::MultiSpace => None,
        }
    }

    /// 行をセルに分割（各セルはtrim済み）
    pub fn split(self, line: &str) -> Vec<String> {
        match self.as_char() {
            Some(c) => line.split(c).map(|cell| cell.trim().to_string()).collect(),
            None => {
                lazy_static::lazy_static! {
                    static ref MULTI_SPACE_RE: regex::Regex = regex::Regex::new(r"\s{2,}|\t").unwrap();
                }
                MULTI_SPACE_RE
                    .split(line.trim())
                    .map(|cell| cell.trim().to_string())
                    .collect()
            }
        }
    }

    /// 行内の出現回数
    pub fn count_in(self, line: &str) -> usize {
        match self.as_char() {
            Some(c) => line.matches(c).count(),
            None => self.split(line).len().saturating_sub(1),
        }
    }
}

/// 表の列が表すフィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnField {
    Label,
    Length,
    Width,
    Thickness,
    Qty,
    Material,
    Grain,
    Edgeband,
    Notes,
}

/// フィールド → 列番号（0始まり）の対応
///
/// ヘッダー行から一度だけ作り、全データ行で使い回す。
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColumnMapping {
    columns: BTreeMap<ColumnField, usize>,
    units: BTreeMap<ColumnField, Units>,
}

impl ColumnMapping {
    pub fn get(&self, field: ColumnField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: ColumnField) -> bool {
        self.columns.contains_key(&field)
    }

    /// 未登録の場合のみ登録（先勝ち）
    pub fn insert_if_absent(&mut self, field: ColumnField, index: usize) -> bool {
        if self.columns.contains_key(&field) {
            return false;
        }
        self.columns.insert(field, index);
        true
    }

    /// ヘッダーの単位表記（"L (in)" など）を記録
    pub fn set_unit(&mut self, field: ColumnField, units: Units) {
        self.units.insert(field, units);
    }

    pub fn unit_for(&self, field: ColumnField) -> Option<Units> {
        self.units.get(&field).copied()
    }

    pub fn has_dimensions(&self) -> bool {
        self.contains(ColumnField::Length) && self.contains(ColumnField::Width)
    }

    /// 寸法列を読むのに必要な最小セル数
    pub fn required_cells(&self) -> usize {
        [ColumnField::Length, ColumnField::Width]
            .iter()
            .filter_map(|f| self.get(*f))
            .max()
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// 部材に変換できなかった行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRow {
    /// 元入力での行番号（0始まり）
    pub index: usize,
    pub raw: String,
    pub reason: String,
}

/// 解析オプション
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub format_hint: Option<crate::format::SourceFormat>,
    pub default_material_id: Option<String>,
    pub default_thickness_mm: Option<f64>,
    pub use_llm_fallback: bool,
    pub dim_order_hint: DimOrder,
    pub units: Option<Units>,
    pub delimiter: Option<Delimiter>,
    pub skip_header: bool,
    /// これを超える行は切り捨てる
    pub max_lines: usize,
    pub llm_timeout: Option<Duration>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            format_hint: None,
            default_material_id: None,
            default_thickness_mm: None,
            use_llm_fallback: true,
            dim_order_hint: DimOrder::LxW,
            units: None,
            delimiter: None,
            skip_header: true,
            max_lines: 10_000,
            llm_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl ParseOptions {
    pub fn material(&self) -> &str {
        self.default_material_id.as_deref().unwrap_or(DEFAULT_MATERIAL_ID)
    }

    pub fn thickness(&self) -> f64 {
        self.default_thickness_mm
            .filter(|t| *t > 0.0)
            .unwrap_or(DEFAULT_THICKNESS_MM)
    }

    pub fn units(&self) -> Units {
        self.units.unwrap_or_default()
    }

    /// キャッシュキー用の指紋
    pub fn fingerprint(&self) -> String {
        format!(
            "{:?}|{}|{}|{}|{:?}|{:?}|{:?}|{}|{}",
            self.format_hint,
            self.material(),
            self.thickness(),
            self.use_llm_fallback,
            self.dim_order_hint,
            self.units,
            self.delimiter,
            self.skip_header,
            self.max_lines,
        )
    }
}
