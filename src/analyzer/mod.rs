pub mod cache;
mod cli_provider;

pub use cache::{cache_key, CacheMode, Clock, FixedClock, ResultCache, SystemClock};
pub use cli_provider::{resolve_command, CliLlmProvider};

use crate::error::Result;
use crate::scanner::CutlistInput;
use cutlist_common::{fast_parse, parse_three_layers, LlmProvider, ParseOptions, ThreeLayerParseResult};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// 1ファイル分の解析結果
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub path: PathBuf,
    pub from_cache: bool,
    pub result: ThreeLayerParseResult,
}

/// バッチ全体の集計
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub files: usize,
    pub files_with_parts: usize,
    pub cached: usize,
    pub parts: usize,
    pub parsed_deterministic: usize,
    pub parsed_regex: usize,
    pub parsed_llm: usize,
    pub unresolved: usize,
    pub skipped: usize,
    pub warnings: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[FileReport]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, report| {
            let result = &report.result;
            acc.files += 1;
            if !result.parts.is_empty() {
                acc.files_with_parts += 1;
            }
            if report.from_cache {
                acc.cached += 1;
            }
            acc.parts += result.parts.len();
            acc.parsed_deterministic += result.stats.parsed_deterministic;
            acc.parsed_regex += result.stats.parsed_regex;
            acc.parsed_llm += result.stats.parsed_llm;
            acc.unresolved += result.stats.unresolved;
            acc.skipped += result.stats.skipped;
            acc.warnings += result.warnings.len();
            acc
        })
    }
}

/// 進捗バー（非表示指定時は何も描画しない）
pub fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// 入力を読み込む（並列）
fn read_inputs(inputs: &[CutlistInput]) -> Result<Vec<String>> {
    inputs.par_iter().map(CutlistInput::read_text).collect()
}

/// カットリストを解析する
///
/// - `CacheMode::Fast`: 言語モデルなし。未キャッシュ分を rayon で並列処理
/// - `CacheMode::Smart`: 言語モデルあり。1ファイルずつ順に処理
///
/// `cache` を渡した場合はヒットしたファイルの解析を省略し、新しい結果を追加する。
pub async fn analyze_inputs(
    inputs: &[CutlistInput],
    options: &ParseOptions,
    mode: CacheMode,
    provider: Option<&dyn LlmProvider>,
    mut cache: Option<&mut ResultCache>,
    progress: &ProgressBar,
) -> Result<Vec<FileReport>> {
    let texts = read_inputs(inputs)?;
    let keys: Vec<String> = texts
        .iter()
        .map(|text| cache_key(text, options, mode))
        .collect();

    let mut results: Vec<Option<(ThreeLayerParseResult, bool)>> = keys
        .iter()
        .map(|key| {
            cache
                .as_deref()
                .and_then(|c| c.get(key))
                .map(|hit| (hit.clone(), true))
        })
        .collect();

    let pending: Vec<usize> = (0..inputs.len()).filter(|&i| results[i].is_none()).collect();
    progress.inc((inputs.len() - pending.len()) as u64);
    debug!(total = inputs.len(), pending = pending.len(), "キャッシュ照合");

    match mode {
        CacheMode::Fast => {
            let parsed: Vec<(usize, ThreeLayerParseResult)> = pending
                .par_iter()
                .map(|&i| {
                    progress.set_message(inputs[i].file_name.clone());
                    let result = fast_parse(&texts[i], options);
                    progress.inc(1);
                    (i, result)
                })
                .collect();
            for (i, result) in parsed {
                results[i] = Some((result, false));
            }
        }
        CacheMode::Smart => {
            for &i in &pending {
                progress.set_message(inputs[i].file_name.clone());
                let result = parse_three_layers(&texts[i], options, provider).await;
                progress.inc(1);
                results[i] = Some((result, false));
            }
        }
    }

    let mut reports = Vec::with_capacity(inputs.len());
    for ((input, key), slot) in inputs.iter().zip(keys).zip(results) {
        let Some((result, from_cache)) = slot else {
            continue;
        };
        if let Some(cache) = cache.as_deref_mut() {
            // 部材が取れなかった結果は残さない
            if !from_cache && !result.parts.is_empty() {
                cache.insert(key, input.file_name.clone(), result.clone());
            }
        }
        info!(
            file = %input.file_name,
            parts = result.parts.len(),
            cached = from_cache,
            "ファイル解析完了"
        );
        reports.push(FileReport {
            file_name: input.file_name.clone(),
            path: input.path.clone(),
            from_cache,
            result,
        });
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::InputKind;
    use std::time::Duration;

    fn input(dir: &std::path::Path, name: &str, content: &str) -> CutlistInput {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        CutlistInput {
            path,
            file_name: name.to_string(),
            kind: InputKind::Text,
        }
    }

    #[tokio::test]
    async fn test_analyze_fast_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![
            input(dir.path(), "a.tsv", "Part\tL\tW\nA\t100\t50"),
            input(dir.path(), "b.txt", "Shelf 560 x 300 qty 3"),
            input(dir.path(), "c.txt", "nothing here"),
        ];

        let reports = analyze_inputs(
            &inputs,
            &ParseOptions::default(),
            CacheMode::Fast,
            None,
            None,
            &ProgressBar::hidden(),
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].file_name, "a.tsv");
        assert_eq!(reports[1].result.parts[0].qty, 3);
        assert!(reports[2].result.parts.is_empty());

        let summary = BatchSummary::from_reports(&reports);
        assert_eq!(summary.files, 3);
        assert_eq!(summary.files_with_parts, 2);
        assert_eq!(summary.parts, 2);
        assert_eq!(summary.parsed_deterministic, 1);
        assert_eq!(summary.parsed_regex, 1);
    }

    #[tokio::test]
    async fn test_analyze_uses_cache_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![input(dir.path(), "a.tsv", "Part\tL\tW\nA\t100\t50")];
        let mut cache = ResultCache::load(dir.path(), Duration::from_secs(3600));
        let options = ParseOptions::default();

        let first = analyze_inputs(&inputs, &options, CacheMode::Fast, None, Some(&mut cache), &ProgressBar::hidden())
            .await
            .unwrap();
        assert!(!first[0].from_cache);
        assert_eq!(cache.len(), 1);

        let second = analyze_inputs(&inputs, &options, CacheMode::Fast, None, Some(&mut cache), &ProgressBar::hidden())
            .await
            .unwrap();
        assert!(second[0].from_cache);
        assert_eq!(second[0].result.parts, first[0].result.parts);
    }
}
