//! Plugin Registry - 설치 기록 및 리소스 디렉토리 관리
//!
//! `<data>/installed.json`에 레코드 목록을 저장하고 `<data>/plugins/<id>/`에
//! 리소스를 둔다. 모든 변경은 저장이 끝난 뒤에야 메모리에 반영된다.

use super::events::{EventBus, EventType, PluginEvent};
use super::manifest::PluginManifest;
use chrono::{DateTime, Utc};
use plugkit_foundation::{write_atomic, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 설치 기록 파일명
pub const INSTALLED_FILE: &str = "installed.json";

/// 리소스 루트 디렉토리명
pub const PLUGINS_DIR: &str = "plugins";

/// 스테이징/백업 작업 디렉토리. 플러그인 ID 네임스페이스(`plugins/`) 밖에 둔다
const SCRATCH_DIR: &str = ".staging";
const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// PluginStatus / PluginRecord
// ============================================================================

/// 플러그인 라이프사이클 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Installing,
    Active,
    Disabled,
    Error,
    Updating,
    Uninstalling,
}

impl PluginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::Error => "error",
            Self::Updating => "updating",
            Self::Uninstalling => "uninstalling",
        }
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 설치된 플러그인 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    /// 플러그인 ID (= manifest.name)
    pub id: String,

    /// 설치 시점 매니페스트
    pub manifest: PluginManifest,

    pub status: PluginStatus,

    pub install_time: DateTime<Utc>,

    /// 설치 URL (업데이트 시 다시 사용)
    pub url: String,

    // null 그대로 저장해야 복원 시 동일한 레코드가 된다
    #[serde(default)]
    pub update_check_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub update_error: Option<String>,

    #[serde(default)]
    pub install_error: Option<String>,
}

impl PluginRecord {
    /// 새로 설치된 active 레코드
    pub fn new(manifest: PluginManifest, url: impl Into<String>) -> Self {
        Self {
            id: manifest.name.clone(),
            manifest,
            status: PluginStatus::Active,
            install_time: Utc::now(),
            url: url.into(),
            update_check_date: None,
            update_error: None,
            install_error: None,
        }
    }

    pub fn with_status(mut self, status: PluginStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PluginStatus::Active
    }
}

/// installed.json 파일 구조
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistrySnapshot {
    #[serde(default = "default_snapshot_version")]
    version: u32,

    #[serde(default)]
    plugins: Vec<PluginRecord>,
}

fn default_snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

// ============================================================================
// PluginRegistry
// ============================================================================

/// 플러그인 레지스트리
pub struct PluginRegistry {
    data_dir: PathBuf,

    /// 삽입 순서 유지
    records: RwLock<Vec<PluginRecord>>,

    events: Arc<EventBus>,
}

impl PluginRegistry {
    pub fn new(data_dir: impl Into<PathBuf>, events: Arc<EventBus>) -> Self {
        Self {
            data_dir: data_dir.into(),
            records: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn snapshot_file(&self) -> PathBuf {
        self.data_dir.join(INSTALLED_FILE)
    }

    fn plugins_root(&self) -> PathBuf {
        self.data_dir.join(PLUGINS_DIR)
    }

    fn scratch_root(&self) -> PathBuf {
        self.data_dir.join(SCRATCH_DIR)
    }

    // ========================================================================
    // 로드 / 저장
    // ========================================================================

    /// installed.json 복원
    ///
    /// 크래시로 남은 전이 상태를 정리한다: installing 레코드는 버리고,
    /// updating은 active로, uninstalling 레코드는 제거를 마저 끝낸다.
    pub async fn restore(&self) -> Result<()> {
        let path = self.snapshot_file();
        let mut records = self.records.write().await;

        let loaded = match fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: RegistrySnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Storage(format!("corrupt registry snapshot {:?}: {}", path, e))
                })?;
                snapshot.plugins
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found at {:?}, starting empty", INSTALLED_FILE, path);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut normalized = false;
        let mut restored = Vec::with_capacity(loaded.len());
        for mut record in loaded {
            match record.status {
                PluginStatus::Installing => {
                    warn!("Dropping interrupted install of {}", record.id);
                    normalized = true;
                }
                PluginStatus::Uninstalling => {
                    warn!("Completing interrupted uninstall of {}", record.id);
                    self.remove_plugin_dir(&record.id).await?;
                    normalized = true;
                }
                PluginStatus::Updating => {
                    warn!("Reverting interrupted update of {}", record.id);
                    record.status = PluginStatus::Active;
                    restored.push(record);
                    normalized = true;
                }
                _ => restored.push(record),
            }
        }

        if normalized {
            self.write_snapshot(&restored).await?;
        }
        *records = restored;
        let count = records.len();
        drop(records);

        self.cleanup_staging().await;

        info!("Restored {} plugin records", count);
        self.notify(None, "restore").await;
        Ok(())
    }

    /// 현재 상태 저장
    pub async fn persist(&self) -> Result<()> {
        let records = self.records.read().await;
        self.write_snapshot(&records).await
    }

    async fn write_snapshot(&self, records: &[PluginRecord]) -> Result<()> {
        let snapshot = RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            plugins: records.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let dir = self.data_dir.clone();
        let path = self.snapshot_file();

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            write_atomic(&path, &bytes)
        })
            .await
            .map_err(|e| Error::Internal(format!("registry save task failed: {}", e)))?
            .map_err(|e| Error::Storage(format!("failed to save {}: {}", INSTALLED_FILE, e)))?;

        debug!("Saved {} with {} plugins", INSTALLED_FILE, records.len());
        Ok(())
    }

    async fn notify(&self, plugin_id: Option<&str>, action: &str) {
        self.events
            .publish(
                PluginEvent::new(EventType::RegistryChanged, plugin_id, serde_json::json!({
                    "action": action,
                })),
            )
            .await;
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 삽입 순서대로
    pub async fn list(&self) -> Vec<PluginRecord> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<PluginRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.iter().any(|r| r.id == id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    // ========================================================================
    // 변경
    // ========================================================================

    /// 같은 ID가 있으면 그 자리에서 교체, 없으면 뒤에 추가
    pub async fn upsert(&self, record: PluginRecord) -> Result<()> {
        let id = record.id.clone();
        {
            let mut records = self.records.write().await;
            let mut next = records.clone();
            match next.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => next.push(record),
            }
            self.write_snapshot(&next).await?;
            *records = next;
        }

        self.notify(Some(&id), "upsert").await;
        Ok(())
    }

    /// 레코드 수정
    ///
    /// 클로저가 false를 돌려주면 저장/알림 없이 현재 레코드만 반환한다.
    /// 레코드가 없으면 `Ok(None)`.
    pub async fn modify<F>(&self, id: &str, f: F) -> Result<Option<PluginRecord>>
    where
        F: FnOnce(&mut PluginRecord) -> bool,
    {
        let updated = {
            let mut records = self.records.write().await;
            let Some(index) = records.iter().position(|r| r.id == id) else {
                return Ok(None);
            };

            let mut candidate = records[index].clone();
            if !f(&mut candidate) {
                return Ok(Some(candidate));
            }

            let mut next = records.clone();
            next[index] = candidate.clone();
            self.write_snapshot(&next).await?;
            *records = next;
            candidate
        };

        self.notify(Some(id), "modify").await;
        Ok(Some(updated))
    }

    /// 레코드 제거. 없으면 `Ok(None)`
    pub async fn remove(&self, id: &str) -> Result<Option<PluginRecord>> {
        let removed = {
            let mut records = self.records.write().await;
            let Some(index) = records.iter().position(|r| r.id == id) else {
                return Ok(None);
            };

            let mut next = records.clone();
            let removed = next.remove(index);
            self.write_snapshot(&next).await?;
            *records = next;
            removed
        };

        self.notify(Some(id), "remove").await;
        Ok(Some(removed))
    }

    // ========================================================================
    // 리소스 디렉토리
    // ========================================================================

    /// 플러그인 리소스 디렉토리
    pub fn plugin_dir(&self, id: &str) -> PathBuf {
        self.plugins_root().join(id)
    }

    /// 임시 스테이징 디렉토리 생성
    pub async fn stage_resources(&self) -> Result<StagedResources> {
        let dir = self
            .scratch_root()
            .join(format!("new-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).await?;
        fs::create_dir_all(self.plugins_root()).await?;
        Ok(StagedResources {
            dir,
            committed: false,
        })
    }

    /// 스테이징된 리소스를 플러그인 디렉토리로 교체
    pub async fn commit_resources(&self, id: &str, mut staged: StagedResources) -> Result<()> {
        let target = self.plugin_dir(id);
        let backup = self
            .scratch_root()
            .join(format!("old-{}", uuid::Uuid::new_v4()));

        let had_previous = fs::try_exists(&target).await?;
        if had_previous {
            fs::rename(&target, &backup).await?;
        }

        if let Err(e) = fs::rename(&staged.dir, &target).await {
            if had_previous {
                let _ = fs::rename(&backup, &target).await;
            }
            return Err(Error::Storage(format!(
                "failed to move resources into {:?}: {}",
                target, e
            )));
        }
        staged.committed = true;

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&backup).await {
                warn!("Failed to remove old resources {:?}: {}", backup, e);
            }
        }

        debug!("Committed resources for {} into {:?}", id, target);
        Ok(())
    }

    /// 플러그인 리소스 디렉토리 삭제 (없으면 무시)
    pub async fn remove_plugin_dir(&self, id: &str) -> Result<()> {
        let dir = self.plugin_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// 매니페스트가 선언한 리소스가 모두 디스크에 있는지
    pub async fn resources_present(&self, record: &PluginRecord) -> bool {
        let dir = self.plugin_dir(&record.id);
        for resource in &record.manifest.resources {
            if !fs::try_exists(dir.join(&resource.path)).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }

    /// 이전 프로세스가 남긴 스테이징/백업 디렉토리 정리
    async fn cleanup_staging(&self) {
        let dir = self.scratch_root();
        match fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed leftover scratch directory {:?}", dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean scratch directory {:?}: {}", dir, e),
        }
    }
}

// ============================================================================
// StagedResources
// ============================================================================

/// 커밋 전 리소스 디렉토리. 커밋 없이 drop되면 삭제된다.
pub struct StagedResources {
    dir: PathBuf,
    committed: bool,
}

impl StagedResources {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// 상대 경로에 리소스 기록
    pub async fn write(&self, relative: &str, bytes: &[u8]) -> Result<()> {
        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(())
    }
}

impl Drop for StagedResources {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}
