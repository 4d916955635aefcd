//! 설치 슬롯과 ID 단위 잠금

use parking_lot::Mutex;
use plugkit_foundation::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

// ============================================================================
// InstallSlot
// ============================================================================

/// 동시에 하나의 설치만 허용하는 슬롯
#[derive(Debug, Default, Clone)]
pub struct InstallSlot {
    current: Arc<Mutex<Option<String>>>,
}

impl InstallSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 슬롯 점유. 이미 설치 중이면 Conflict
    pub fn try_acquire(&self, url: &str) -> Result<InstallGuard> {
        let mut current = self.current.lock();
        if let Some(busy) = current.as_ref() {
            return Err(Error::Conflict(format!(
                "another install is in progress: {}",
                busy
            )));
        }
        *current = Some(url.to_string());

        Ok(InstallGuard {
            slot: self.current.clone(),
        })
    }

    /// 설치 중인 URL
    pub fn installing(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

/// 슬롯 점유 guard. drop 시 해제
#[derive(Debug)]
pub struct InstallGuard {
    slot: Arc<Mutex<Option<String>>>,
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

// ============================================================================
// IdLocks
// ============================================================================

/// 같은 플러그인 ID에 대한 변경을 직렬화
#[derive(Default)]
pub struct IdLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// ID 잠금 획득 (다른 ID는 서로 막지 않는다)
    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // 아무도 잡고 있지 않은 항목 정리
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_install_slot_is_exclusive() {
        let slot = InstallSlot::new();
        let guard = slot.try_acquire("https://a/plugin.json").unwrap();
        assert_eq!(slot.installing().as_deref(), Some("https://a/plugin.json"));

        let err = slot.try_acquire("https://b/plugin.json").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        drop(guard);
        assert!(slot.installing().is_none());
        assert!(slot.try_acquire("https://b/plugin.json").is_ok());
    }

    #[tokio::test]
    async fn test_id_locks_serialize_same_id() {
        let locks = Arc::new(IdLocks::new());
        let guard = locks.lock("a").await;

        // 다른 ID는 바로 획득
        let _other = locks.lock("b").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
