use clap::{Parser, Subcommand, ValueEnum};
use crate::ai_provider::AiProvider;
use cutlist_common::{DimOrder, SourceFormat, Units};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cutlist")]
#[command(about = "カットリスト取り込み・3層パースツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// AIプロバイダ (claude/codex/gemini)。省略時は設定ファイルの値
    #[arg(long, global = true)]
    pub ai_provider: Option<AiProvider>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// カットリストを解析して部材JSONを出力
    Parse {
        /// ファイルまたはフォルダのパス
        #[arg(required = true)]
        path: PathBuf,

        /// AIを使わずに高速解析（フォルダは並列処理）
        #[arg(long)]
        fast: bool,

        /// 出力JSONファイル（デフォルト: 入力フォルダ/cutlist-result.json）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 入力形式を指定（例: cutlist_plus, excel, free_form）
        #[arg(long, value_parser = parse_format_hint)]
        format_hint: Option<SourceFormat>,

        /// 数値の単位
        #[arg(long)]
        units: Option<UnitsArg>,

        /// 寸法の並び順
        #[arg(long)]
        dim_order: Option<DimOrderArg>,

        /// 既定の材料ID
        #[arg(short, long)]
        material: Option<String>,

        /// 既定の板厚（mm）
        #[arg(short, long)]
        thickness: Option<f64>,

        /// キャッシュを使用（再解析をスキップ）
        #[arg(long)]
        use_cache: bool,
    },

    /// 形式判定とパース方針を表示
    Detect {
        /// ファイルのパス
        #[arg(required = true)]
        path: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// 既定の材料IDを設定
        #[arg(long)]
        set_default_material: Option<String>,

        /// 既定の板厚（mm）を設定
        #[arg(long)]
        set_thickness: Option<f64>,

        /// AIコマンドのパスを設定
        #[arg(long)]
        set_provider_command: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// 期限切れエントリを削除
        #[arg(long)]
        evict: bool,

        /// 対象フォルダ（省略時はカレント）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum UnitsArg {
    Mm,
    Cm,
    #[value(alias = "in")]
    Inch,
}

impl From<UnitsArg> for Units {
    fn from(value: UnitsArg) -> Self {
        match value {
            UnitsArg::Mm => Units::Mm,
            UnitsArg::Cm => Units::Cm,
            UnitsArg::Inch => Units::Inch,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DimOrderArg {
    #[value(name = "lxw")]
    LxW,
    #[value(name = "wxl")]
    WxL,
    Infer,
}

impl From<DimOrderArg> for DimOrder {
    fn from(value: DimOrderArg) -> Self {
        match value {
            DimOrderArg::LxW => DimOrder::LxW,
            DimOrderArg::WxL => DimOrder::WxL,
            DimOrderArg::Infer => DimOrder::Infer,
        }
    }
}

fn parse_format_hint(s: &str) -> Result<SourceFormat, String> {
    SourceFormat::from_name(s).ok_or_else(|| format!("Unknown format: {}", s))
}
