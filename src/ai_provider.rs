use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Claude,
    Codex,
    Gemini,
}

impl AiProvider {
    pub fn command_name(&self) -> &'static str {
        match self {
            AiProvider::Claude => "claude",
            AiProvider::Codex => "codex",
            AiProvider::Gemini => "gemini",
        }
    }

    /// 非対話モードでプロンプトを渡す引数
    pub fn prompt_args(&self, prompt: &str) -> Vec<String> {
        match self {
            AiProvider::Claude => vec![
                "-p".into(),
                prompt.into(),
                "--output-format".into(),
                "text".into(),
            ],
            AiProvider::Codex => vec!["exec".into(), prompt.into()],
            AiProvider::Gemini => vec!["-p".into(), prompt.into()],
        }
    }
}
