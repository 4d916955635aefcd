//! # plugkit-foundation
//!
//! Foundation layer for PlugKit:
//! - Error: 라이프사이클 에러 분류 (Validation, Network, NotFound, Conflict)
//! - Config: 통합 설정 (PlugkitConfig, FetchConfig)
//! - Storage: JsonStore (범용), SettingsStore (locale/theme key-value)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  plugkit-cli                                            │
//! │                     │                                   │
//! │                     ▼                                   │
//! │  plugkit-core (PluginManager, PluginGallery)            │
//! │                     │                                   │
//! │          ┌──────────┴──────────┐                        │
//! │          ▼                     ▼                        │
//! │   PlugkitConfig          SettingsStore                  │
//! │   (config.json)          (settings.json)                │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{FetchConfig, PlugkitConfig, PLUGKIT_CONFIG_FILE};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{write_atomic, JsonStore, SettingsSink, SettingsStore};
