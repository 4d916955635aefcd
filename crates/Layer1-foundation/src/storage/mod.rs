//! Storage module for PlugKit
//!
//! - `json`: JSON - 범용 파일 저장/로드
//! - `settings`: 앱 설정 key-value 저장소 (locale, theme)

mod json;
mod settings;

// JSON Storage (범용)
pub use json::{write_atomic, JsonStore};

// Settings
pub use settings::{SettingsSink, SettingsStore, LOCALE_KEY, SETTINGS_FILE, THEME_KEY};
