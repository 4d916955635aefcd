//! # Plugin System
//!
//! 원격 플러그인 패키지의 설치/업데이트/활성화/제거와 갤러리 카탈로그
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginManager                           │
//! │   InstallSlot (설치 1개)      IdLocks (ID 단위 직렬화)       │
//! │        │                                                    │
//! │        ▼                                                    │
//! │   PackageFetcher ──▶ validate() ──▶ PluginRegistry          │
//! │   (HttpFetcher)       (manifest)     installed.json         │
//! │                                      plugins/<id>/          │
//! │                                          │                  │
//! │                                          ▼                  │
//! │                                      EventBus ──▶ 구독자    │
//! └─────────────────────────────────────────────────────────────┘
//!
//!   PluginGallery ──▶ PackageFetcher (인덱스) ──▶ GallerySnapshot
//! ```
//!
//! ## 상태 전이
//!
//! `installing → active | error`, `active ⇄ disabled`,
//! `active → updating → active`, `active | disabled → uninstalling → (제거)`

mod events;
mod fetcher;
mod gallery;
mod locks;
mod manager;
mod manifest;
mod registry;

pub use events::{EventBus, EventType, PluginEvent, PluginEventHandler};
pub use fetcher::{
    manifest_url, parse_url, resource_url, HttpFetcher, PackageFetcher, RawPackage,
    MANIFEST_FILE,
};
pub use gallery::{GalleryEntry, GallerySnapshot, PluginGallery, GALLERY_CACHE_FILE};
pub use locks::{IdLocks, InstallGuard, InstallSlot};
pub use manager::{AvailableUpdate, LastInstall, PluginManager, PluginsOverview};
pub use manifest::{
    validate, validate_value, PluginAuthor, PluginLocale, PluginManifest, PluginResource,
    PluginTheme, PluginVersion, ResourceKind,
};
pub use registry::{
    PluginRecord, PluginRegistry, PluginStatus, StagedResources, INSTALLED_FILE, PLUGINS_DIR,
};
