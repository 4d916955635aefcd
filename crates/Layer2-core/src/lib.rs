//! plugkit-core: 플러그인 라이프사이클 런타임
//!
//! Layer2 - 플러그인 설치/업데이트/활성화와 갤러리
//!
//! # 주요 모듈
//!
//! - `plugin`: PluginManager, PluginRegistry, PluginGallery, 매니페스트 검증
//!
//! # 사용 예시
//!
//! ```ignore
//! use plugkit_core::{PluginManager, PluginGallery, PlugkitConfig};
//!
//! let config = PlugkitConfig::load()?;
//! let manager = PluginManager::from_config(&config)?;
//! manager.init().await?;
//!
//! // URL에서 설치
//! let record = manager.install("https://example.com/plugins/dark/", None).await?;
//!
//! // 갤러리에서 설치
//! let gallery = PluginGallery::from_config(&config, manager.fetcher(), manager.events());
//! let snapshot = gallery.load_plugins().await?;
//! manager.install_from_gallery(&snapshot, "dark-theme").await?;
//! ```

pub mod plugin;

// ============================================================================
// Re-exports
// ============================================================================

pub use plugin::{
    AvailableUpdate, EventBus, EventType, GalleryEntry, GallerySnapshot, HttpFetcher,
    LastInstall, PackageFetcher, PluginEvent, PluginGallery, PluginManager, PluginManifest,
    PluginRecord, PluginRegistry, PluginStatus, PluginVersion, PluginsOverview, RawPackage,
};

// Foundation
pub use plugkit_foundation::{Error, PlugkitConfig, Result};
