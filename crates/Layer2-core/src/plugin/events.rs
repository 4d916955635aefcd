//! Plugin Events - 라이프사이클 이벤트 버스
//!
//! 매니저/레지스트리/갤러리 인스턴스마다 하나의 버스를 공유한다. 전역 버스는 없다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

// ============================================================================
// PluginEvent
// ============================================================================

/// 플러그인 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEvent {
    /// 이벤트 타입
    pub event_type: EventType,

    /// 대상 플러그인 ID (없으면 None)
    pub plugin_id: Option<String>,

    /// 이벤트 데이터
    pub data: Value,

    /// 타임스탬프
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PluginEvent {
    pub fn new(event_type: EventType, plugin_id: Option<&str>, data: Value) -> Self {
        Self {
            event_type,
            plugin_id: plugin_id.map(String::from),
            data,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 데이터 없는 이벤트
    pub fn simple(event_type: EventType) -> Self {
        Self::new(event_type, None, Value::Null)
    }

    /// 특정 플러그인 대상 이벤트
    pub fn for_plugin(event_type: EventType, plugin_id: &str) -> Self {
        Self::new(event_type, Some(plugin_id), Value::Null)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // 레지스트리
    RegistryChanged,

    // 설치 슬롯
    InstallStarted,
    InstallFinished,

    // 업데이트
    PluginUpdated,
    UpdateFailed,

    // 갤러리
    GalleryLoadComplete,

    // 설정 적용 (locale/theme)
    SettingApplied,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegistryChanged => write!(f, "registry_changed"),
            Self::InstallStarted => write!(f, "install_started"),
            Self::InstallFinished => write!(f, "install_finished"),
            Self::PluginUpdated => write!(f, "plugin_updated"),
            Self::UpdateFailed => write!(f, "update_failed"),
            Self::GalleryLoadComplete => write!(f, "gallery_load_complete"),
            Self::SettingApplied => write!(f, "setting_applied"),
        }
    }
}

// ============================================================================
// PluginEventHandler
// ============================================================================

/// 이벤트 핸들러 트레이트
#[async_trait]
pub trait PluginEventHandler: Send + Sync {
    /// 핸들러 이름
    fn name(&self) -> &str;

    /// 관심 있는 이벤트 타입들 (빈 목록이면 전부)
    fn interested_events(&self) -> Vec<EventType>;

    /// 이벤트 처리
    async fn handle(&self, event: &PluginEvent);
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스 - 발행/구독
pub struct EventBus {
    sender: broadcast::Sender<PluginEvent>,
    handlers: RwLock<HashMap<String, Arc<dyn PluginEventHandler>>>,

    /// 최근 이벤트 (최대 history_size개)
    history: RwLock<Vec<PluginEvent>>,
    history_size: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256, 100)
    }

    pub fn with_capacity(channel_capacity: usize, history_size: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::with_capacity(history_size)),
            history_size,
        }
    }

    /// 핸들러 등록 (같은 이름이면 교체)
    pub async fn register_handler(&self, handler: Arc<dyn PluginEventHandler>) {
        let name = handler.name().to_string();
        self.handlers.write().await.insert(name, handler);
    }

    pub async fn unregister_handler(&self, name: &str) {
        self.handlers.write().await.remove(name);
    }

    /// 이벤트 발행
    pub async fn publish(&self, event: PluginEvent) {
        debug!(
            "Publishing event: {} ({})",
            event.event_type,
            event.plugin_id.as_deref().unwrap_or("-")
        );

        {
            let mut history = self.history.write().await;
            if history.len() >= self.history_size {
                history.remove(0);
            }
            history.push(event.clone());
        }

        // 구독자가 없어도 OK
        let _ = self.sender.send(event.clone());

        let handlers: Vec<_> = self.handlers.read().await.values().cloned().collect();
        for handler in handlers {
            let interested = handler.interested_events();
            if interested.is_empty() || interested.contains(&event.event_type) {
                handler.handle(&event).await;
            }
        }
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    pub async fn history(&self) -> Vec<PluginEvent> {
        self.history.read().await.clone()
    }

    pub async fn history_by_type(&self, event_type: EventType) -> Vec<PluginEvent> {
        self.history
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl PluginEventHandler for CountingHandler {
        fn name(&self) -> &str {
            "counter"
        }

        fn interested_events(&self) -> Vec<EventType> {
            vec![EventType::RegistryChanged]
        }

        async fn handle(&self, _event: &PluginEvent) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_handler_filters_by_interest() {
        let bus = EventBus::new();
        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
        });
        bus.register_handler(handler.clone()).await;
        assert_eq!(bus.handler_count().await, 1);

        bus.publish(PluginEvent::for_plugin(EventType::RegistryChanged, "a"))
            .await;
        bus.publish(PluginEvent::simple(EventType::InstallStarted))
            .await;

        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.history().await.len(), 2);
        assert_eq!(
            bus.history_by_type(EventType::InstallStarted).await.len(),
            1
        );

        bus.unregister_handler("counter").await;
        assert_eq!(bus.handler_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_receives_events() {
        let bus = Arc::new(EventBus::new());
        let mut receiver = bus.subscribe();

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher
                .publish(PluginEvent::for_plugin(EventType::PluginUpdated, "a"))
                .await;
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::PluginUpdated);
        assert_eq!(event.plugin_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let bus = EventBus::with_capacity(16, 3);
        for _ in 0..5 {
            bus.publish(PluginEvent::simple(EventType::GalleryLoadComplete))
                .await;
        }
        assert_eq!(bus.history().await.len(), 3);

        bus.clear_history().await;
        assert!(bus.history().await.is_empty());
    }
}
