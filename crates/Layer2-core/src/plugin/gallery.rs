//! Plugin Gallery - 설치 가능한 플러그인 카탈로그
//!
//! 원격 인덱스(`{plugins: [{url, manifest}]}`)를 가져와 캐시한다.
//! 동시에 들어온 `load_plugins` 호출은 진행 중인 요청 하나로 합쳐진다.

use super::events::{EventBus, EventType, PluginEvent};
use super::fetcher::{parse_url, PackageFetcher};
use super::manifest::{validate_value, PluginManifest};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use plugkit_foundation::{write_atomic, Error, PlugkitConfig, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 갤러리 캐시 파일명
pub const GALLERY_CACHE_FILE: &str = "gallery.json";

// ============================================================================
// GallerySnapshot
// ============================================================================

/// 갤러리 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    /// 설치 URL
    pub url: String,

    pub manifest: PluginManifest,
}

/// 갤러리 스냅샷. 성공한 로드마다 통째로 교체된다
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GallerySnapshot {
    pub plugins: Vec<GalleryEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl GallerySnapshot {
    pub fn new(plugins: Vec<GalleryEntry>) -> Self {
        Self {
            plugins,
            fetched_at: Utc::now(),
        }
    }

    /// 인덱스 문서 파싱
    ///
    /// 잘못된 항목은 경고만 남기고 건너뛴다. 같은 이름은 첫 항목만 유지.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let doc: Value = serde_json::from_slice(raw)
            .map_err(|e| Error::Validation(format!("gallery index is not valid JSON: {}", e)))?;
        let items = doc
            .get("plugins")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Validation("gallery index has no 'plugins' array".into()))?;

        let mut seen = HashSet::new();
        let mut plugins = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match parse_entry(item) {
                Ok(entry) => {
                    if seen.insert(entry.manifest.name.clone()) {
                        plugins.push(entry);
                    } else {
                        warn!(
                            "Skipping duplicate gallery entry {}: {}",
                            index, entry.manifest.name
                        );
                    }
                }
                Err(e) => warn!("Skipping gallery entry {}: {}", index, e),
            }
        }

        Ok(Self::new(plugins))
    }

    /// 이름으로 조회
    pub fn find(&self, name: &str) -> Option<&GalleryEntry> {
        self.plugins.iter().find(|p| p.manifest.name == name)
    }

    /// 이름/설명 검색 (대소문자 무시)
    pub fn search(&self, query: &str) -> Vec<&GalleryEntry> {
        let query = query.to_lowercase();
        self.plugins
            .iter()
            .filter(|p| {
                p.manifest.name.to_lowercase().contains(&query)
                    || p
                        .manifest
                        .description
                        .as_ref()
                        .map(|d| d.to_lowercase().contains(&query))
                        .unwrap_or(false)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

fn parse_entry(item: &Value) -> Result<GalleryEntry> {
    let url = item
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("entry has no 'url'".into()))?;
    parse_url(url)?;

    let manifest = item
        .get("manifest")
        .ok_or_else(|| Error::Validation("entry has no 'manifest'".into()))?;

    Ok(GalleryEntry {
        url: url.to_string(),
        manifest: validate_value(manifest)?,
    })
}

// ============================================================================
// PluginGallery
// ============================================================================

#[derive(Default)]
struct GalleryState {
    loading: bool,
    load_error: Option<Arc<Error>>,
    gallery: Option<Arc<GallerySnapshot>>,
}

/// 갤러리 로더
pub struct PluginGallery {
    url: Option<String>,
    fetcher: Arc<dyn PackageFetcher>,
    cache_dir: Option<PathBuf>,
    state: Mutex<GalleryState>,

    /// 로드가 끝날 때마다 증가
    done: watch::Sender<u64>,

    events: Arc<EventBus>,
}

impl PluginGallery {
    pub fn new(
        url: Option<String>,
        fetcher: Arc<dyn PackageFetcher>,
        events: Arc<EventBus>,
    ) -> Self {
        let (done, _) = watch::channel(0);
        Self {
            url,
            fetcher,
            cache_dir: None,
            state: Mutex::new(GalleryState::default()),
            done,
            events,
        }
    }

    /// 설정의 갤러리 URL/캐시 디렉토리 사용
    pub fn from_config(
        config: &PlugkitConfig,
        fetcher: Arc<dyn PackageFetcher>,
        events: Arc<EventBus>,
    ) -> Self {
        Self::new(config.gallery_url.clone(), fetcher, events)
            .with_cache_dir(config.resolved_cache_dir())
    }

    /// 빌더 패턴: 캐시 디렉토리 설정
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    // ========================================================================
    // 상태
    // ========================================================================

    pub fn loading(&self) -> bool {
        self.state.lock().loading
    }

    /// 마지막 로드 실패 (성공하면 None)
    pub fn load_error(&self) -> Option<Arc<Error>> {
        self.state.lock().load_error.clone()
    }

    pub fn gallery(&self) -> Option<Arc<GallerySnapshot>> {
        self.state.lock().gallery.clone()
    }

    // ========================================================================
    // 로드
    // ========================================================================

    /// 인덱스 로드
    ///
    /// 이미 로드 중이면 새 요청을 보내지 않고 그 결과를 기다린다.
    /// 실패해도 이전 갤러리는 유지된다.
    pub async fn load_plugins(&self) -> Result<Arc<GallerySnapshot>> {
        // 플래그 확인 전에 구독해야 리더의 완료 알림을 놓치지 않는다
        let mut done = self.done.subscribe();

        let leader = {
            let mut state = self.state.lock();
            if state.loading {
                false
            } else {
                state.loading = true;
                true
            }
        };

        if !leader {
            debug!("Gallery load already in flight, waiting");
            // sender는 self가 살아있는 동안 닫히지 않는다
            let _ = done.changed().await;
            return self.last_outcome();
        }

        // fetch 도중 future가 drop되어도 loading이 풀리고 대기자가 깨어나야 한다
        let guard = LeaderGuard {
            gallery: self,
            armed: true,
        };
        let result = self.fetch_index().await;
        let count = guard.complete(&result);

        match (&result, count) {
            (Ok(snapshot), Some(count)) => {
                info!("Gallery loaded: {} plugins", count);
                if let Err(e) = self.save_cache(snapshot).await {
                    warn!("Failed to save gallery cache: {}", e);
                }
            }
            (Err(e), _) => warn!("Gallery load failed: {}", e),
            _ => {}
        }

        self.events.publish(load_complete_event(&result, count)).await;

        result
    }

    /// 로드 결과 반영 후 대기자 깨우기
    fn finish_load(&self, result: &Result<Arc<GallerySnapshot>>) -> Option<usize> {
        let count = {
            let mut state = self.state.lock();
            state.loading = false;
            match result {
                Ok(snapshot) => {
                    state.gallery = Some(snapshot.clone());
                    state.load_error = None;
                    Some(snapshot.len())
                }
                Err(e) => {
                    state.load_error = Some(Arc::new(replay_error(e)));
                    None
                }
            }
        };
        self.done.send_modify(|generation| *generation += 1);
        count
    }

    async fn fetch_index(&self) -> Result<Arc<GallerySnapshot>> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("gallery url is not configured".into()))?;

        let package = self.fetcher.fetch(url).await?;
        Ok(Arc::new(GallerySnapshot::parse(&package.body)?))
    }

    fn last_outcome(&self) -> Result<Arc<GallerySnapshot>> {
        let state = self.state.lock();
        if let Some(err) = &state.load_error {
            return Err(replay_error(err));
        }
        state
            .gallery
            .clone()
            .ok_or_else(|| Error::Internal("gallery load finished without result".into()))
    }

    // ========================================================================
    // 캐시
    // ========================================================================

    /// 캐시된 마지막 스냅샷 복원. 이미 갤러리가 있으면 건드리지 않는다
    pub async fn load_cache(&self) -> Result<bool> {
        let Some(dir) = &self.cache_dir else {
            return Ok(false);
        };
        let path = dir.join(GALLERY_CACHE_FILE);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let snapshot: GallerySnapshot = serde_json::from_slice(&bytes)?;

        let mut state = self.state.lock();
        if state.gallery.is_some() {
            return Ok(false);
        }
        debug!(
            "Loaded cached gallery ({} plugins, fetched {})",
            snapshot.len(),
            snapshot.fetched_at
        );
        state.gallery = Some(Arc::new(snapshot));
        Ok(true)
    }

    async fn save_cache(&self, snapshot: &GallerySnapshot) -> Result<()> {
        let Some(dir) = self.cache_dir.clone() else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            write_atomic(&dir.join(GALLERY_CACHE_FILE), &bytes)
        })
        .await
        .map_err(|e| Error::Internal(format!("gallery cache task failed: {}", e)))??;
        Ok(())
    }
}

/// 리더 구간 guard
///
/// `complete` 없이 drop되면 (타임아웃, select! 등으로 취소) 로드를 실패로
/// 마무리한다. 이전 갤러리는 그대로 남는다.
struct LeaderGuard<'a> {
    gallery: &'a PluginGallery,
    armed: bool,
}

impl LeaderGuard<'_> {
    fn complete(mut self, result: &Result<Arc<GallerySnapshot>>) -> Option<usize> {
        self.armed = false;
        self.gallery.finish_load(result)
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Gallery load cancelled before completion");
        let cancelled: Result<Arc<GallerySnapshot>> =
            Err(Error::Internal("gallery load was cancelled".into()));
        self.gallery.finish_load(&cancelled);

        // drop 안에서는 await할 수 없으므로 알림은 런타임에 넘긴다
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let events = self.gallery.events.clone();
            let event = load_complete_event(&cancelled, None);
            handle.spawn(async move {
                events.publish(event).await;
            });
        }
    }
}

fn load_complete_event(
    result: &Result<Arc<GallerySnapshot>>,
    count: Option<usize>,
) -> PluginEvent {
    PluginEvent::simple(EventType::GalleryLoadComplete).with_data(serde_json::json!({
        "success": result.is_ok(),
        "count": count,
    }))
}

/// 공유 상태에 보관하거나 대기자에게 넘길 수 있게 에러를 다시 만든다
fn replay_error(err: &Error) -> Error {
    match err {
        Error::Validation(m) => Error::Validation(m.clone()),
        Error::Network { url, message } => Error::Network {
            url: url.clone(),
            message: message.clone(),
        },
        Error::NotFound(m) => Error::NotFound(m.clone()),
        Error::Conflict(m) => Error::Conflict(m.clone()),
        Error::Config(m) => Error::Config(m.clone()),
        Error::Storage(m) => Error::Storage(m.clone()),
        Error::InvalidInput(m) => Error::InvalidInput(m.clone()),
        other => Error::Internal(other.to_string()),
    }
}
