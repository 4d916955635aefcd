//! PlugKit Config - 통합 설정
//!
//! 글로벌(`<config_dir>/plugkit/config.json`)과 프로젝트(`.plugkit/config.json`)
//! 설정을 병합해서 사용한다. 프로젝트 설정이 우선.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 설정 파일명
pub const PLUGKIT_CONFIG_FILE: &str = "config.json";

/// 갤러리 URL 환경 변수
pub const ENV_GALLERY_URL: &str = "PLUGKIT_GALLERY_URL";

/// 데이터 디렉토리 환경 변수
pub const ENV_DATA_DIR: &str = "PLUGKIT_DATA_DIR";

// ============================================================================
// PlugKit Config (통합)
// ============================================================================

/// PlugKit 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlugkitConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// 플러그인 갤러리 인덱스 URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gallery_url: Option<String>,

    /// 설치 기록/리소스 디렉토리
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// 갤러리 캐시 디렉토리
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// 네트워크 설정
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl PlugkitConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Self::default()
        }
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드, 환경 변수 적용
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) =
                global.load_optional::<PlugkitConfig>(PLUGKIT_CONFIG_FILE)?
            {
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<PlugkitConfig>(PLUGKIT_CONFIG_FILE)?
            {
                config.merge(project_config);
            }
        }

        // 3. 환경 변수
        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// 지정 저장소에서만 로드
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        let mut config = Self::new();
        if let Some(file_config) = store.load_optional::<PlugkitConfig>(PLUGKIT_CONFIG_FILE)? {
            config.merge(file_config);
        }
        Ok(config)
    }

    /// 글로벌 설정 저장
    pub fn save_global(&self) -> Result<()> {
        let store = JsonStore::global()?;
        store.save(PLUGKIT_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: PlugkitConfig) {
        if other.gallery_url.is_some() {
            self.gallery_url = other.gallery_url;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.cache_dir.is_some() {
            self.cache_dir = other.cache_dir;
        }

        self.fetch.merge(other.fetch);
    }

    /// 환경 변수 적용 (테스트에서 lookup 주입)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_GALLERY_URL).filter(|v| !v.trim().is_empty()) {
            self.gallery_url = Some(url);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    // ========================================================================
    // 경로
    // ========================================================================

    /// 데이터 디렉토리 (installed.json, plugins/)
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("plugkit"))
                .unwrap_or_else(|| PathBuf::from(".plugkit-data"))
        })
    }

    /// 캐시 디렉토리 (gallery.json)
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|d| d.join("plugkit"))
                .unwrap_or_else(|| self.resolved_data_dir().join("cache"))
        })
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn gallery_url(mut self, url: impl Into<String>) -> Self {
        self.gallery_url = Some(url.into());
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

// ============================================================================
// Fetch Config
// ============================================================================

/// 네트워크 요청 설정
///
/// 자동 재시도는 없다. 요청은 timeout_secs 안에 끝나거나 실패한다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    /// 요청 전체 타임아웃 (초)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// 연결 타임아웃 (초)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// User-Agent 헤더
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// 응답 본문 최대 크기 (바이트)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn merge(&mut self, other: FetchConfig) {
        if other.timeout_secs != default_timeout_secs() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.connect_timeout_secs != default_connect_timeout_secs() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
        if other.user_agent != default_user_agent() {
            self.user_agent = other.user_agent;
        }
        if other.max_body_bytes != default_max_body_bytes() {
            self.max_body_bytes = other.max_body_bytes;
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn default_version() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("PlugKit/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_body_bytes() -> u64 {
    10 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = PlugkitConfig::new();
        assert_eq!(config.version, 1);
        assert!(config.gallery_url.is_none());
        assert_eq!(config.fetch.timeout(), Duration::from_secs(30));
        assert_eq!(config.fetch.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = PlugkitConfig::new().gallery_url("https://a/gallery.json");
        let mut other = PlugkitConfig::new().data_dir("/tmp/plugkit");
        other.fetch.timeout_secs = 5;

        base.merge(other);

        assert_eq!(base.gallery_url.as_deref(), Some("https://a/gallery.json"));
        assert_eq!(base.data_dir, Some(PathBuf::from("/tmp/plugkit")));
        assert_eq!(base.fetch.timeout_secs, 5);
        assert_eq!(base.fetch.connect_timeout_secs, 10);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PlugkitConfig::new().gallery_url("https://a/gallery.json");
        config.apply_env(|key| match key {
            ENV_GALLERY_URL => Some("https://b/gallery.json".to_string()),
            ENV_DATA_DIR => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(config.gallery_url.as_deref(), Some("https://b/gallery.json"));
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_load_from_store() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path());
        std::fs::write(
            store.file_path(PLUGKIT_CONFIG_FILE),
            r#"{"galleryUrl": "https://g/plugins.json", "fetch": {"timeoutSecs": 12}}"#,
        )
        .unwrap();

        let config = PlugkitConfig::load_from(&store).unwrap();
        assert_eq!(config.gallery_url.as_deref(), Some("https://g/plugins.json"));
        assert_eq!(config.fetch.timeout_secs, 12);
        assert_eq!(config.fetch.user_agent, default_user_agent());
    }

    #[test]
    fn test_resolved_dirs_use_explicit_values() {
        let config = PlugkitConfig::new()
            .data_dir("/data/plugkit")
            .cache_dir("/cache/plugkit");
        assert_eq!(config.resolved_data_dir(), PathBuf::from("/data/plugkit"));
        assert_eq!(config.resolved_cache_dir(), PathBuf::from("/cache/plugkit"));
    }
}
