//! Settings Store - 앱 설정 key-value 저장소
//!
//! 플러그인이 제공하는 locale/theme 적용은 이 저장소에 값 하나를 쓰는 것으로 끝난다.
//! 실제 반영은 설정을 읽는 쪽의 몫.

use super::JsonStore;
use crate::Result;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

/// 설정 파일명
pub const SETTINGS_FILE: &str = "settings.json";

/// locale 설정 키
pub const LOCALE_KEY: &str = "locale";

/// theme 설정 키
pub const THEME_KEY: &str = "theme";

/// 설정 쓰기 인터페이스
pub trait SettingsSink: Send + Sync {
    /// 값 저장
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// 값 조회
    fn get(&self, key: &str) -> Option<Value>;
}

/// JSON 파일 기반 설정 저장소
pub struct SettingsStore {
    store: JsonStore,
    values: RwLock<Map<String, Value>>,
}

impl SettingsStore {
    /// 디렉토리의 settings.json 로드 (없으면 빈 설정)
    pub fn open(store: JsonStore) -> Result<Self> {
        let values = store
            .load_optional::<Map<String, Value>>(SETTINGS_FILE)?
            .unwrap_or_default();

        debug!("Loaded {} settings from {:?}", values.len(), store.base_dir());

        Ok(Self {
            store,
            values: RwLock::new(values),
        })
    }

    /// 설정 값 제거
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        let mut values = self.values.write();
        let Some(removed) = values.remove(key) else {
            return Ok(None);
        };
        if let Err(e) = self.store.save(SETTINGS_FILE, &*values) {
            values.insert(key.to_string(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// 현재 locale
    pub fn locale(&self) -> Option<String> {
        self.get_str(LOCALE_KEY)
    }

    /// locale 설정
    pub fn set_locale(&self, locale: impl Into<String>) -> Result<()> {
        self.set(LOCALE_KEY, Value::String(locale.into()))
    }

    /// 현재 theme
    pub fn theme(&self) -> Option<String> {
        self.get_str(THEME_KEY)
    }

    /// theme 설정
    pub fn set_theme(&self, theme: impl Into<String>) -> Result<()> {
        self.set(THEME_KEY, Value::String(theme.into()))
    }

    /// 전체 설정 스냅샷
    pub fn all(&self) -> Map<String, Value> {
        self.values.read().clone()
    }

    fn get_str(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

impl SettingsSink for SettingsStore {
    fn set(&self, key: &str, value: Value) -> Result<()> {
        debug!("Setting {} = {}", key, value);
        // 저장이 끝날 때까지 잠금을 유지해야 디스크에 쓰는 순서가 메모리 순서와 같다
        let mut values = self.values.write();
        let previous = values.insert(key.to_string(), value);
        if let Err(e) = self.store.save(SETTINGS_FILE, &*values) {
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_and_reload() {
        let temp = TempDir::new().unwrap();

        let settings = SettingsStore::open(JsonStore::new(temp.path())).unwrap();
        settings.set_locale("de-DE").unwrap();
        settings.set_theme("solarized").unwrap();

        let reopened = SettingsStore::open(JsonStore::new(temp.path())).unwrap();
        assert_eq!(reopened.locale(), Some("de-DE".to_string()));
        assert_eq!(reopened.theme(), Some("solarized".to_string()));
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsStore::open(JsonStore::new(temp.path())).unwrap();

        settings.set_theme("dark").unwrap();
        assert!(settings.remove(THEME_KEY).unwrap().is_some());
        assert!(settings.theme().is_none());
        assert!(settings.remove(THEME_KEY).unwrap().is_none());
    }

    #[test]
    fn test_generic_values_kept() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsStore::open(JsonStore::new(temp.path())).unwrap();

        settings.set("fontSize", serde_json::json!(14)).unwrap();
        assert_eq!(settings.get("fontSize"), Some(serde_json::json!(14)));
        assert_eq!(settings.all().len(), 1);
    }

    #[test]
    fn test_failed_save_rolls_back() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsStore::open(JsonStore::new(temp.path())).unwrap();
        settings.set_theme("dark").unwrap();

        // settings.json 자리에 디렉토리가 있으면 rename이 실패한다
        let path = temp.path().join(SETTINGS_FILE);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        assert!(settings.set_theme("light").is_err());
        assert_eq!(settings.theme(), Some("dark".to_string()));

        assert!(settings.set_locale("de-DE").is_err());
        assert!(settings.locale().is_none());

        assert!(settings.remove(THEME_KEY).is_err());
        assert_eq!(settings.theme(), Some("dark".to_string()));
    }

    #[test]
    fn test_concurrent_sets_match_disk() {
        let temp = TempDir::new().unwrap();
        let settings =
            std::sync::Arc::new(SettingsStore::open(JsonStore::new(temp.path())).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let settings = settings.clone();
                std::thread::spawn(move || {
                    for round in 0..10 {
                        settings
                            .set(&format!("key{}", i), serde_json::json!(round))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = SettingsStore::open(JsonStore::new(temp.path())).unwrap();
        assert_eq!(reopened.all(), settings.all());
        assert_eq!(reopened.all().len(), 8);
    }
}
