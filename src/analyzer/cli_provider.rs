//! AI CLI連携モジュール
//!
//! claude / codex / gemini のCLIをサブプロセスとして起動し、
//! 残余テキストから部材を抽出させる。
//! プロンプト生成と応答の解読は cutlist_common から使用。

use crate::ai_provider::AiProvider;
use crate::config::Config;
use crate::error::{CutlistError, Result};
use async_trait::async_trait;
use cutlist_common::llm::build_cutlist_prompt;
use cutlist_common::{LlmParseOutcome, LlmProvider, ParseOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// CLIサブプロセス経由の言語モデル
#[derive(Debug, Clone)]
pub struct CliLlmProvider {
    provider: AiProvider,
    command: String,
}

impl CliLlmProvider {
    pub fn new(provider: AiProvider, command: impl Into<String>) -> Self {
        Self {
            provider,
            command: command.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ai_provider, config.command())
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// CLIを実行して標準出力を返す
    ///
    /// 呼び出し側のタイムアウトで Future が破棄された場合は子プロセスも終了させる。
    async fn run_cli(&self, prompt: &str) -> Result<String> {
        let program = resolve_command(&self.command)
            .ok_or_else(|| CutlistError::MissingProviderCommand(self.command.clone()))?;

        // Windowsではcmd /c経由（改行はスペースに置換）
        #[cfg(windows)]
        let mut command = {
            let flat = prompt.replace('\n', " ");
            let mut c = Command::new("cmd");
            c.arg("/c").arg(&program).args(self.provider.prompt_args(&flat));
            c
        };

        #[cfg(not(windows))]
        let mut command = {
            let mut c = Command::new(&program);
            c.args(self.provider.prompt_args(prompt));
            c
        };

        let output = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CutlistError::ProviderCall(format!("{} の起動に失敗: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CutlistError::ProviderCall(format!(
                "{} failed (code {:?}): {}",
                self.command,
                output.status.code(),
                stderr.trim()
            )));
        }

        let response = String::from_utf8_lossy(&output.stdout).to_string();
        let preview: String = response.chars().take(500).collect();
        debug!(provider = self.name(), chars = response.len(), preview = %preview, "AIレスポンス");

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for CliLlmProvider {
    fn name(&self) -> &str {
        self.provider.command_name()
    }

    fn is_configured(&self) -> bool {
        resolve_command(&self.command).is_some()
    }

    async fn parse_text(
        &self,
        text: &str,
        options: &ParseOptions,
    ) -> cutlist_common::Result<LlmParseOutcome> {
        let prompt = build_cutlist_prompt(text, options);
        debug!(provider = self.name(), chars = prompt.len(), "プロンプト送信");

        let response = self.run_cli(&prompt).await.map_err(|e| {
            warn!(provider = self.name(), error = %e, "AI呼び出し失敗");
            cutlist_common::Error::Provider(e.to_string())
        })?;

        Ok(LlmParseOutcome::from_response(&response, options))
    }
}

/// コマンドを実行ファイルのパスに解決する
///
/// パス区切りを含む場合はそのファイル、それ以外は PATH から探す。
pub fn resolve_command(command: &str) -> Option<PathBuf> {
    let command = command.trim();
    if command.is_empty() {
        return None;
    }

    let direct = Path::new(command);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        executable_names(command)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

#[cfg(windows)]
fn executable_names(command: &str) -> Vec<String> {
    vec![
        command.to_string(),
        format!("{}.exe", command),
        format!("{}.cmd", command),
        format!("{}.bat", command),
    ]
}

#[cfg(not(windows))]
fn executable_names(command: &str) -> Vec<String> {
    vec![command.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_command_not_configured() {
        let provider = CliLlmProvider::new(AiProvider::Claude, "cutlist-no-such-command-4821");
        assert!(!provider.is_configured());
        assert_eq!(provider.name(), "claude");
    }

    #[test]
    fn test_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-ai");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();

        assert_eq!(resolve_command(path.to_str().unwrap()), Some(path.clone()));
        assert_eq!(resolve_command(dir.path().join("absent").to_str().unwrap()), None);
        assert_eq!(resolve_command("  "), None);
    }

    #[tokio::test]
    async fn test_parse_text_without_command_is_provider_error() {
        let provider = CliLlmProvider::new(AiProvider::Gemini, "cutlist-no-such-command-4821");
        let result = provider
            .parse_text("Shelf 560 x 300", &ParseOptions::default())
            .await;
        match result {
            Err(cutlist_common::Error::Provider(msg)) => {
                assert!(msg.contains("cutlist-no-such-command-4821"))
            }
            other => panic!("Expected Provider error, got {:?}", other),
        }
    }
}
