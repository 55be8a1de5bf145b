use anyhow::{Context, Result};
use clap::Parser;
use cutlist_common::{
    analyze_text_for_parser_mode, can_parse_deterministically, detect_format, get_parsing_strategy,
    LlmProvider,
};
use cutlist_ingest::{analyzer, cli, config, error, scanner};
use analyzer::{BatchSummary, CacheMode, CliLlmProvider, ResultCache};
use cli::{Cli, Commands};
use config::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const RESULT_FILE_NAME: &str = "cutlist-result.json";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut config = Config::load().context("設定ファイルの読み込みに失敗")?;
    if let Some(provider) = cli.ai_provider {
        config.ai_provider = provider;
    }

    match cli.command {
        Commands::Parse { path, fast, output, format_hint, units, dim_order, material, thickness, use_cache } => {
            println!("📐 cutlist - カットリスト解析\n");

            // 1. 入力スキャン
            println!("[1/3] 入力をスキャン中...");
            let inputs = scanner::scan_path(&path)?;
            println!("✔ {}件のカットリストを検出\n", inputs.len());

            if inputs.is_empty() {
                return Err(error::CutlistError::NoInputsFound(path.display().to_string()).into());
            }

            let mut options = config.parse_options();
            options.format_hint = format_hint.or(options.format_hint);
            if let Some(units) = units {
                options.units = Some(units.into());
            }
            if let Some(order) = dim_order {
                options.dim_order_hint = order.into();
            }
            if let Some(material) = material {
                options.default_material_id = Some(material);
            }
            if let Some(thickness) = thickness {
                options.default_thickness_mm = Some(thickness);
            }

            let mode = if fast || !options.use_llm_fallback { CacheMode::Fast } else { CacheMode::Smart };
            let provider = CliLlmProvider::from_config(&config);
            if mode == CacheMode::Smart && !provider.is_configured() {
                println!("⚠ AIコマンド `{}` が見つかりません。ローカル解析のみ実行します", provider.command());
            }

            // 2. 解析
            let folder = inputs[0].folder();
            let mut cache = if use_cache {
                let mut cache = ResultCache::load(&folder, config.cache_ttl());
                cache.evict_expired();
                Some(cache)
            } else {
                None
            };

            println!(
                "[2/3] 解析中...{}{}",
                if mode == CacheMode::Fast { " (高速モード)" } else { "" },
                if use_cache { " (キャッシュ有効)" } else { "" }
            );
            let progress = analyzer::progress_bar(inputs.len(), inputs.len() > 1);
            let reports = analyzer::analyze_inputs(
                &inputs,
                &options,
                mode,
                Some(&provider as &dyn LlmProvider),
                cache.as_mut(),
                &progress,
            )
            .await?;
            progress.finish_and_clear();

            if let Some(cache) = &cache {
                cache
                    .save(&folder)
                    .with_context(|| format!("キャッシュの保存に失敗: {}", folder.display()))?;
            }
            println!("✔ 解析完了\n");

            // 3. 結果保存
            println!("[3/3] 結果を保存中...");
            let output = output.unwrap_or_else(|| folder.join(RESULT_FILE_NAME));
            let json = if reports.len() == 1 && path.is_file() {
                serde_json::to_string_pretty(&reports[0].result)?
            } else {
                serde_json::to_string_pretty(&reports)?
            };
            std::fs::write(&output, json)
                .with_context(|| format!("結果の書き込みに失敗: {}", output.display()))?;
            println!("✔ 結果を保存: {}", output.display());

            print_summary(&reports, cli.verbose);
            println!("\n✅ 解析完了");
        }

        Commands::Detect { path } => {
            println!("🔍 cutlist - 形式判定\n");

            let text = read_single_input(&path)?;
            let detection = detect_format(&text);
            let strategy = get_parsing_strategy(detection.format);
            let mode = analyze_text_for_parser_mode(&text);

            println!("形式: {} (信頼度 {:.2}, {:?})", detection.format, detection.confidence, detection.method);
            if let Some(delimiter) = detection.delimiter() {
                println!("  区切り文字: {:?}", delimiter);
            }
            println!("パース方針: {:?}", strategy);
            println!("表として決定的に読めるか: {}", if can_parse_deterministically(&text) { "はい" } else { "いいえ" });
            println!("推奨モード: {:?} (信頼度 {:.2})", mode.recommended, mode.confidence);
            for reason in &mode.reasons {
                println!("  - {}", reason);
            }
        }

        Commands::Config { set_default_material, set_thickness, set_provider_command, show } => {
            if let Some(material) = set_default_material {
                config.set_default_material(material)?;
                println!("✔ 既定の材料IDを設定しました");
            }

            if let Some(thickness) = set_thickness {
                config.set_thickness(thickness)?;
                println!("✔ 既定の板厚を設定しました");
            }

            if let Some(command) = set_provider_command {
                config.provider_command = Some(command).filter(|c| !c.trim().is_empty());
                config.save()?;
                println!("✔ AIコマンドを設定しました");
            }

            if show {
                let provider = CliLlmProvider::from_config(&config);
                println!("設定: {}", Config::config_path()?.display());
                println!("  既定の材料ID: {}", config.default_material_id);
                println!("  既定の板厚: {} mm", config.default_thickness_mm);
                println!("  単位: {}", config.units.map(|u| format!("{:?}", u)).unwrap_or_else(|| "自動".into()));
                println!("  寸法の並び: {:?}", config.dim_order);
                println!("  AIフォールバック: {}", if config.use_llm_fallback { "有効" } else { "無効" });
                println!(
                    "  AIコマンド: {} ({})",
                    provider.command(),
                    if provider.is_configured() { "検出済み" } else { "未検出" }
                );
                println!("  AIタイムアウト: {}秒", config.llm_timeout_seconds);
                println!("  キャッシュ有効期限: {}秒", config.cache_ttl_seconds);
                println!("  最大行数: {}", config.max_lines);
            }
        }

        Commands::Cache { clear, evict, folder, info } => {
            let target = folder.unwrap_or_else(|| PathBuf::from("."));
            let cache_path = ResultCache::cache_path(&target);

            if evict {
                let mut cache = ResultCache::load(&target, config.cache_ttl());
                let removed = cache.evict_expired();
                cache.save(&target)?;
                println!("✔ 期限切れエントリを{}件削除しました", removed);
            }

            if info || !(clear || evict) {
                // デフォルトまたは--info: 情報表示
                if cache_path.exists() {
                    let cache = ResultCache::load(&target, config.cache_ttl());
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  件数: {}", cache.len());
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                    if let Some(oldest) = cache.entries().map(|e| e.created_at).min() {
                        println!("  最古のエントリ: {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match ResultCache::clear(&target) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_single_input(path: &Path) -> Result<String> {
    let inputs = scanner::scan_path(path)?;
    let input = inputs
        .first()
        .ok_or_else(|| error::CutlistError::NoInputsFound(path.display().to_string()))?;
    input
        .read_text()
        .with_context(|| format!("入力の読み込みに失敗: {}", input.path.display()))
}

fn print_summary(reports: &[analyzer::FileReport], verbose: bool) {
    let summary = BatchSummary::from_reports(reports);

    println!("\n集計:");
    println!("  ファイル: {} (部材あり {}, キャッシュ {})", summary.files, summary.files_with_parts, summary.cached);
    println!("  部材: {}", summary.parts);
    println!(
        "  内訳: 表 {} / ライン {} / AI {}",
        summary.parsed_deterministic, summary.parsed_regex, summary.parsed_llm
    );
    println!("  未解決行: {}  読み飛ばし: {}  警告: {}", summary.unresolved, summary.skipped, summary.warnings);

    for report in reports {
        let result = &report.result;
        if result.parts.is_empty() || verbose {
            let layers: Vec<&str> = result.layers_used.iter().map(|l| l.as_str()).collect();
            println!(
                "  - {}: {}件 [{}] {}",
                report.file_name,
                result.parts.len(),
                layers.join(" → "),
                result.errors.join("; ")
            );
        }
        if verbose {
            for warning in &result.warnings {
                println!("      ⚠ {}", warning);
            }
        }
    }
}
