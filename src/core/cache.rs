use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// 快取檔的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    value: Value,
    stored_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, Value>,
    file: Option<File>,
}

/// Oracle 回應快取，以標準請求簽章為鍵
///
/// 每筆回應寫入後立即 flush 並 sync，中斷時最多損失正在寫的那一行。
#[derive(Debug)]
pub struct OracleCache {
    path: Option<PathBuf>,
    state: Mutex<CacheState>,
}

impl OracleCache {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                file: None,
            }),
        }
    }

    /// 載入既有的 JSON lines 快取檔 (不存在時建立)
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = HashMap::new();
        let mut needs_newline = false;

        if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            needs_newline = !content.is_empty() && !content.ends_with('\n');
            let mut skipped = 0usize;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<CacheEntry>(line) {
                    Ok(entry) => {
                        entries.entry(entry.key).or_insert(entry.value);
                    }
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                tracing::warn!(
                    "⚠️ Skipped {} unreadable cache lines in {} (interrupted write?)",
                    skipped,
                    path.display()
                );
            }
            tracing::info!("💾 Loaded {} cached oracle responses from {}", entries.len(), path.display());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        if needs_newline {
            file.write_all(b"\n").await?;
            file.flush().await?;
        }

        Ok(Self {
            path: Some(path),
            state: Mutex::new(CacheState {
                entries,
                file: Some(file),
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().await.entries.get(key).cloned()
    }

    /// 已存在的鍵不覆寫；回傳是否為新寫入
    pub async fn put(&self, key: &str, value: Value) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.entries.contains_key(key) {
            return Ok(false);
        }

        if let Some(file) = state.file.as_mut() {
            let entry = CacheEntry {
                key: key.to_string(),
                value: value.clone(),
                stored_at: Utc::now(),
            };
            let mut line = serde_json::to_string(&entry)?;
            line.push('\n');
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await?;
        }

        state.entries.insert(key.to_string(), value);
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
