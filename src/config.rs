use crate::ai_provider::AiProvider;
use crate::error::{CutlistError, Result};
use cutlist_common::types::{DEFAULT_MATERIAL_ID, DEFAULT_THICKNESS_MM};
use cutlist_common::{DimOrder, ParseOptions, Units};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_material_id: String,
    pub default_thickness_mm: f64,
    /// 未指定なら mm（テキスト中の単位表記を優先）
    pub units: Option<Units>,
    pub dim_order: DimOrder,
    pub use_llm_fallback: bool,
    pub ai_provider: AiProvider,
    /// AIコマンドのパス（省略時はプロバイダ既定のコマンド名）
    pub provider_command: Option<String>,
    pub llm_timeout_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub max_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_material_id: DEFAULT_MATERIAL_ID.into(),
            default_thickness_mm: DEFAULT_THICKNESS_MM,
            units: None,
            dim_order: DimOrder::LxW,
            use_llm_fallback: true,
            ai_provider: AiProvider::Claude,
            provider_command: None,
            llm_timeout_seconds: 120,
            cache_ttl_seconds: 24 * 60 * 60,
            max_lines: 10_000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CutlistError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("cutlist-ingest").join("config.json"))
    }

    pub fn set_default_material(&mut self, material: String) -> Result<()> {
        let material = material.trim().to_string();
        if material.is_empty() {
            return Err(CutlistError::Config("材料IDが空です".into()));
        }
        self.default_material_id = material;
        self.save()
    }

    pub fn set_thickness(&mut self, thickness_mm: f64) -> Result<()> {
        if !(thickness_mm > 0.0 && thickness_mm.is_finite()) {
            return Err(CutlistError::Config(format!(
                "板厚は正の値で指定してください: {}",
                thickness_mm
            )));
        }
        self.default_thickness_mm = thickness_mm;
        self.save()
    }

    pub fn command(&self) -> String {
        self.provider_command
            .clone()
            .unwrap_or_else(|| self.ai_provider.command_name().to_string())
    }

    /// パイプラインに渡すオプションを作る
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            default_material_id: Some(self.default_material_id.clone()),
            default_thickness_mm: Some(self.default_thickness_mm),
            use_llm_fallback: self.use_llm_fallback,
            dim_order_hint: self.dim_order,
            units: self.units,
            max_lines: self.max_lines,
            llm_timeout: Some(Duration::from_secs(self.llm_timeout_seconds)),
            ..ParseOptions::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}
