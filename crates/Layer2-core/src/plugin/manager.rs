//! Plugin Manager - 플러그인 라이프사이클 관리
//!
//! install / update / disable / activate / uninstall 을 조율한다.
//!
//! - 설치는 한 번에 하나 (`InstallSlot`)
//! - 같은 ID에 대한 변경은 `IdLocks`로 직렬화
//! - 모든 상태 변화는 `EventBus`로 발행

use super::events::{EventBus, EventType, PluginEvent};
use super::fetcher::{manifest_url, resource_url, HttpFetcher, PackageFetcher};
use super::gallery::GallerySnapshot;
use super::locks::{IdLocks, InstallSlot};
use super::manifest::{validate, validate_value, PluginManifest};
use super::registry::{PluginRecord, PluginRegistry, PluginStatus, StagedResources};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use plugkit_foundation::storage::{LOCALE_KEY, THEME_KEY};
use plugkit_foundation::{
    Error, JsonStore, PlugkitConfig, Result, SettingsSink, SettingsStore,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

// ============================================================================
// View 모델
// ============================================================================

/// 마지막으로 끝난 설치 시도 (저장하지 않음)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastInstall {
    pub url: String,
    pub dt: DateTime<Utc>,
    pub error: Option<String>,
}

/// 플러그인 목록 화면에 필요한 데이터
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsOverview {
    /// ID 순 정렬
    pub plugins: Vec<PluginRecord>,

    /// 진행 중인 설치 URL, 없으면 실패한 마지막 설치 URL, 둘 다 없으면 ""
    pub last_install_url: String,

    pub last_install_error: Option<String>,

    pub installing: Option<String>,
}

/// 갤러리에 더 새 버전이 있는 플러그인
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableUpdate {
    pub id: String,
    pub installed_version: String,
    pub available_version: String,
    pub url: String,
}

// ============================================================================
// PluginManager
// ============================================================================

/// 플러그인 매니저
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    fetcher: Arc<dyn PackageFetcher>,
    settings: Arc<dyn SettingsSink>,
    events: Arc<EventBus>,

    slot: InstallSlot,
    id_locks: IdLocks,
    last_install: Mutex<Option<LastInstall>>,
}

impl PluginManager {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        fetcher: Arc<dyn PackageFetcher>,
        settings: Arc<dyn SettingsSink>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry: Arc::new(PluginRegistry::new(data_dir, events.clone())),
            fetcher,
            settings,
            events,
            slot: InstallSlot::new(),
            id_locks: IdLocks::new(),
            last_install: Mutex::new(None),
        }
    }

    /// 설정에서 생성 (HTTP fetcher, data 디렉토리의 settings.json)
    pub fn from_config(config: &PlugkitConfig) -> Result<Self> {
        let data_dir = config.resolved_data_dir();
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let settings = Arc::new(SettingsStore::open(JsonStore::new(&data_dir))?);

        Ok(Self::new(
            data_dir,
            fetcher,
            settings,
            Arc::new(EventBus::new()),
        ))
    }

    /// 레지스트리 복원 후 리소스 확인
    ///
    /// 비활성화되지 않은 플러그인의 리소스가 디스크에 없으면 error 상태로 바꾼다.
    pub async fn init(&self) -> Result<()> {
        self.registry.restore().await?;

        for record in self.registry.list().await {
            if record.status == PluginStatus::Disabled || record.status == PluginStatus::Error {
                continue;
            }
            if self.registry.resources_present(&record).await {
                continue;
            }

            warn!("Plugin {} is missing resources", record.id);
            let _lock = self.id_locks.lock(&record.id).await;
            self.registry
                .modify(&record.id, |r| {
                    r.status = PluginStatus::Error;
                    r.install_error = Some("plugin resources are missing".to_string());
                    true
                })
                .await?;
        }

        info!("Plugin manager ready ({} plugins)", self.registry.len().await);
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 설치된 플러그인 (설치 순)
    pub async fn plugins(&self) -> Vec<PluginRecord> {
        self.registry.list().await
    }

    pub async fn plugin(&self, id: &str) -> Option<PluginRecord> {
        self.registry.get(id).await
    }

    pub fn last_install(&self) -> Option<LastInstall> {
        self.last_install.lock().clone()
    }

    /// 진행 중인 설치 URL
    pub fn installing(&self) -> Option<String> {
        self.slot.installing()
    }

    /// 변경 알림 구독
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn fetcher(&self) -> Arc<dyn PackageFetcher> {
        self.fetcher.clone()
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// 목록 화면용 데이터
    pub async fn overview(&self) -> PluginsOverview {
        let mut plugins = self.registry.list().await;
        plugins.sort_by(|a, b| a.id.cmp(&b.id));

        let installing = self.installing();
        let last = self.last_install();
        let failed_url = last
            .as_ref()
            .filter(|l| l.error.is_some())
            .map(|l| l.url.clone());

        PluginsOverview {
            plugins,
            last_install_url: installing.clone().or(failed_url).unwrap_or_default(),
            last_install_error: last.and_then(|l| l.error),
            installing,
        }
    }

    // ========================================================================
    // 설치
    // ========================================================================

    /// URL에서 설치
    ///
    /// 매니페스트가 주어지면 다시 검증만 하고 받지 않는다. 실패하면 레지스트리는
    /// 그대로이고 에러는 `last_install`에 남은 뒤 그대로 반환된다.
    pub async fn install(
        &self,
        url: &str,
        manifest: Option<PluginManifest>,
    ) -> Result<PluginRecord> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("plugin url is empty".into()));
        }

        let guard = self.slot.try_acquire(url)?;
        info!("Installing plugin from {}", url);
        self.events
            .publish(
                PluginEvent::simple(EventType::InstallStarted).with_data(json!({ "url": url })),
            )
            .await;

        let result = self.install_inner(url, manifest).await;

        let error = result.as_ref().err().map(|e| e.to_string());
        *self.last_install.lock() = Some(LastInstall {
            url: url.to_string(),
            dt: Utc::now(),
            error: error.clone(),
        });
        drop(guard);

        match &result {
            Ok(record) => info!("Installed {} v{}", record.id, record.manifest.version),
            Err(e) => error!("Install from {} failed: {}", url, e),
        }

        let plugin_id = result.as_ref().ok().map(|r| r.id.clone());
        self.events
            .publish(PluginEvent::new(
                EventType::InstallFinished,
                plugin_id.as_deref(),
                json!({ "url": url, "error": error }),
            ))
            .await;

        result
    }

    async fn install_inner(
        &self,
        url: &str,
        manifest: Option<PluginManifest>,
    ) -> Result<PluginRecord> {
        let (manifest, staged) = self.fetch_package(url, manifest).await?;

        let _lock = self.id_locks.lock(&manifest.name).await;
        self.registry.commit_resources(&manifest.name, staged).await?;

        let record = PluginRecord::new(manifest, url);
        self.registry.upsert(record.clone()).await?;
        Ok(record)
    }

    /// 갤러리 항목 설치
    pub async fn install_from_gallery(
        &self,
        gallery: &GallerySnapshot,
        name: &str,
    ) -> Result<PluginRecord> {
        let entry = gallery
            .find(name)
            .ok_or_else(|| Error::NotFound(format!("plugin '{}' is not in the gallery", name)))?;
        self.install(&entry.url, Some(entry.manifest.clone())).await
    }

    /// 매니페스트 확보 + 리소스 스테이징
    async fn fetch_package(
        &self,
        url: &str,
        manifest: Option<PluginManifest>,
    ) -> Result<(PluginManifest, StagedResources)> {
        let manifest_url = manifest_url(url)?;

        let manifest = match manifest {
            Some(given) => validate_value(&serde_json::to_value(&given)?)?,
            None => {
                let raw = self.fetcher.fetch(manifest_url.as_str()).await?;
                validate(&raw.body)?
            }
        };
        debug!(
            "Manifest {} v{}: {} resources",
            manifest.name,
            manifest.version,
            manifest.resources.len()
        );

        let staged = self.registry.stage_resources().await?;
        for resource in &manifest.resources {
            let url = resource_url(&manifest_url, &resource.path)?;
            let raw = self.fetcher.fetch(url.as_str()).await?;
            staged.write(&resource.path, &raw.body).await?;
        }

        Ok((manifest, staged))
    }

    // ========================================================================
    // 상태 변경
    // ========================================================================

    /// 제거. 없으면 아무것도 하지 않는다
    pub async fn uninstall(&self, id: &str) -> Result<()> {
        let _lock = self.id_locks.lock(id).await;

        let marked = self
            .registry
            .modify(id, |r| {
                r.status = PluginStatus::Uninstalling;
                true
            })
            .await?;
        if marked.is_none() {
            debug!("Uninstall of unknown plugin {} ignored", id);
            return Ok(());
        }

        if let Err(e) = self.registry.remove_plugin_dir(id).await {
            warn!("Failed to remove resources of {}: {}", id, e);
        }
        self.registry.remove(id).await?;

        info!("Uninstalled plugin {}", id);
        Ok(())
    }

    /// 비활성화. 없거나 이미 비활성이면 no-op
    pub async fn disable(&self, id: &str) -> Result<()> {
        let _lock = self.id_locks.lock(id).await;
        let changed = self
            .registry
            .modify(id, |r| {
                if r.status == PluginStatus::Disabled {
                    return false;
                }
                r.status = PluginStatus::Disabled;
                true
            })
            .await?;

        if changed.is_some() {
            info!("Plugin {} disabled", id);
        }
        Ok(())
    }

    /// 활성화. 없거나 이미 active면 no-op
    ///
    /// error 상태는 리소스가 디스크에 모두 있을 때만 복구된다.
    pub async fn activate(&self, id: &str) -> Result<()> {
        let _lock = self.id_locks.lock(id).await;
        let Some(record) = self.registry.get(id).await else {
            return Ok(());
        };

        match record.status {
            PluginStatus::Disabled => {}
            PluginStatus::Error if self.registry.resources_present(&record).await => {}
            PluginStatus::Error => {
                warn!("Plugin {} cannot be activated: resources are missing", id);
                return Ok(());
            }
            _ => return Ok(()),
        }

        self.registry
            .modify(id, |r| {
                r.status = PluginStatus::Active;
                r.install_error = None;
                true
            })
            .await?;
        info!("Plugin {} activated", id);
        Ok(())
    }

    // ========================================================================
    // 업데이트
    // ========================================================================

    /// 저장된 URL에서 다시 받아 교체
    ///
    /// 실패하면 매니페스트/상태는 그대로 두고 `update_error`와
    /// `update_check_date`만 기록한 뒤 에러를 반환한다.
    pub async fn update(&self, id: &str) -> Result<PluginRecord> {
        let _lock = self.id_locks.lock(id).await;
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}' is not installed", id)))?;
        let prior = record.status;

        if prior == PluginStatus::Active {
            self.registry
                .modify(id, |r| {
                    r.status = PluginStatus::Updating;
                    true
                })
                .await?;
        }

        match self.fetch_update(&record).await {
            Ok(manifest) => {
                let from = record.manifest.version.clone();
                let to = manifest.version.clone();
                let updated = self
                    .registry
                    .modify(id, move |r| {
                        r.manifest = manifest;
                        if prior != PluginStatus::Disabled {
                            r.status = PluginStatus::Active;
                        }
                        r.update_check_date = Some(Utc::now());
                        r.update_error = None;
                        r.install_error = None;
                        true
                    })
                    .await?
                    .ok_or_else(|| Error::Internal(format!("plugin '{}' vanished", id)))?;

                info!("Updated {}: {} -> {}", id, from, to);
                self.events
                    .publish(
                        PluginEvent::for_plugin(EventType::PluginUpdated, id)
                            .with_data(json!({ "from": from, "to": to })),
                    )
                    .await;
                Ok(updated)
            }
            Err(e) => {
                warn!("Update of {} failed: {}", id, e);
                let message = e.to_string();
                self.registry
                    .modify(id, |r| {
                        r.status = prior;
                        r.update_error = Some(message.clone());
                        r.update_check_date = Some(Utc::now());
                        true
                    })
                    .await?;
                self.events
                    .publish(
                        PluginEvent::for_plugin(EventType::UpdateFailed, id)
                            .with_data(json!({ "error": message })),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn fetch_update(&self, record: &PluginRecord) -> Result<PluginManifest> {
        let (manifest, staged) = self.fetch_package(&record.url, None).await?;
        if manifest.name != record.id {
            return Err(Error::Validation(format!(
                "plugin name changed from '{}' to '{}'",
                record.id, manifest.name
            )));
        }
        self.registry.commit_resources(&record.id, staged).await?;
        Ok(manifest)
    }

    /// 설치된 모든 플러그인 순차 업데이트
    pub async fn update_all(&self) -> Vec<(String, Result<PluginRecord>)> {
        let mut outcomes = Vec::new();
        for record in self.registry.list().await {
            let outcome = self.update(&record.id).await;
            outcomes.push((record.id, outcome));
        }
        outcomes
    }

    /// 갤러리 버전이 더 높은 플러그인
    pub async fn available_updates(&self, gallery: &GallerySnapshot) -> Vec<AvailableUpdate> {
        let mut updates = Vec::new();
        for record in self.registry.list().await {
            let Some(entry) = gallery.find(&record.id) else {
                continue;
            };
            let (Some(installed), Some(available)) = (
                record.manifest.parsed_version(),
                entry.manifest.parsed_version(),
            ) else {
                continue;
            };
            if available > installed {
                updates.push(AvailableUpdate {
                    id: record.id.clone(),
                    installed_version: record.manifest.version.clone(),
                    available_version: entry.manifest.version.clone(),
                    url: entry.url.clone(),
                });
            }
        }
        updates
    }

    // ========================================================================
    // locale / theme
    // ========================================================================

    /// 플러그인의 locale을 앱 설정에 적용
    pub async fn apply_locale(&self, id: &str) -> Result<String> {
        let record = self.active_plugin(id).await?;
        let locale = record
            .manifest
            .locale
            .ok_or_else(|| Error::NotFound(format!("plugin '{}' provides no locale", id)))?;
        self.apply_setting(id, LOCALE_KEY, locale.name).await
    }

    /// 플러그인의 theme을 앱 설정에 적용
    pub async fn apply_theme(&self, id: &str) -> Result<String> {
        let record = self.active_plugin(id).await?;
        let theme = record
            .manifest
            .theme
            .ok_or_else(|| Error::NotFound(format!("plugin '{}' provides no theme", id)))?;
        self.apply_setting(id, THEME_KEY, theme.name).await
    }

    async fn active_plugin(&self, id: &str) -> Result<PluginRecord> {
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}' is not installed", id)))?;
        if !record.is_active() {
            return Err(Error::Conflict(format!(
                "plugin '{}' is {}, not active",
                id, record.status
            )));
        }
        Ok(record)
    }

    async fn apply_setting(&self, id: &str, key: &str, value: String) -> Result<String> {
        self.settings.set(key, json!(value))?;
        info!("Applied {} '{}' from {}", key, value, id);
        self.events
            .publish(
                PluginEvent::for_plugin(EventType::SettingApplied, id)
                    .with_data(json!({ "key": key, "value": value })),
            )
            .await;
        Ok(value)
    }
}
