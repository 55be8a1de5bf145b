//! 解析結果キャッシュモジュール
//!
//! 入力テキストとオプションのSHA-256をキーにして解析結果をキャッシュし、
//! 同じカットリストの再解析（特にAI呼び出し）をスキップする。
//! 期限切れの判定は注入した `Clock` で行う。

use crate::error::Result;
use chrono::{DateTime, Utc};
use cutlist_common::{ParseOptions, ThreeLayerParseResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const CACHE_FILE_NAME: &str = ".cutlist-cache.json";

/// 現在時刻の取得元
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 実時間
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// テスト用の固定時計
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            if let Ok(delta) = chrono::Duration::from_std(by) {
                *now += delta;
            }
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// 解析モード（AIあり/なしで別キー）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Fast,
    Smart,
}

impl CacheMode {
    fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Fast => "fast",
            CacheMode::Smart => "smart",
        }
    }
}

/// キャッシュキー（テキスト + オプション指紋 + モード）
pub fn cache_key(text: &str, options: &ParseOptions, mode: CacheMode) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(options.fingerprint().as_bytes());
    hasher.update([0u8]);
    hasher.update(mode.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// キャッシュエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// ファイル名
    pub file_name: String,
    /// 保存時刻
    pub created_at: DateTime<Utc>,
    /// 解析結果
    pub result: ThreeLayerParseResult,
}

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    /// バージョン（互換性チェック用）
    version: u32,
    /// キー → 解析結果のマップ
    entries: HashMap<String, CacheEntry>,
}

impl CacheFile {
    const CURRENT_VERSION: u32 = 1;
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// 期限付きの解析結果キャッシュ
pub struct ResultCache {
    file: CacheFile,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ResultCache {
    pub fn cache_path(folder: &Path) -> PathBuf {
        folder.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み（実時間）
    pub fn load(folder: &Path, ttl: Duration) -> Self {
        Self::load_with_clock(folder, ttl, Arc::new(SystemClock))
    }

    /// キャッシュファイルを読み込み
    ///
    /// 読めない・バージョン不一致の場合は空のキャッシュから始める。
    pub fn load_with_clock(folder: &Path, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            file: Self::read_file(&Self::cache_path(folder)),
            clock,
            ttl,
        }
    }

    fn read_file(cache_path: &Path) -> CacheFile {
        if !cache_path.exists() {
            return CacheFile::default();
        }

        let file = match File::open(cache_path) {
            Ok(f) => f,
            Err(_) => return CacheFile::default(),
        };

        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, CacheFile>(reader) {
            Ok(cache) if cache.version == CacheFile::CURRENT_VERSION => cache,
            Ok(_) => {
                warn!("キャッシュバージョン不一致、再生成します");
                CacheFile::default()
            }
            Err(e) => {
                warn!(error = %e, "キャッシュファイルを読めません、再生成します");
                CacheFile::default()
            }
        }
    }

    /// キャッシュファイルを保存
    pub fn save(&self, folder: &Path) -> Result<()> {
        let file = File::create(Self::cache_path(folder))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.file)?;
        Ok(())
    }

    /// キャッシュファイルを削除（存在しなければ false）
    pub fn clear(folder: &Path) -> Result<bool> {
        let cache_path = Self::cache_path(folder);
        if cache_path.exists() {
            std::fs::remove_file(cache_path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        // 時計が戻った場合は期限内として扱う
        now.signed_duration_since(entry.created_at)
            .to_std()
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    /// キャッシュをルックアップ（期限切れは無視）
    pub fn get(&self, key: &str) -> Option<&ThreeLayerParseResult> {
        let now = self.clock.now();
        let entry = self.file.entries.get(key)?;
        if self.is_expired(entry, now) {
            debug!(key, "キャッシュ期限切れ");
            return None;
        }
        Some(&entry.result)
    }

    /// キャッシュに追加
    pub fn insert(&mut self, key: String, file_name: String, result: ThreeLayerParseResult) {
        let created_at = self.clock.now();
        self.file.entries.insert(key, CacheEntry {
            file_name,
            created_at,
            result,
        });
    }

    /// 期限切れのエントリを削除し、削除件数を返す
    pub fn evict_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .file
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.file.entries.remove(key);
        }
        expired.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.file.entries.values()
    }

    /// キャッシュ件数
    pub fn len(&self) -> usize {
        self.file.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.entries.is_empty()
    }
}
