//! Config - 통합 설정 관리
//!
//! - `plugkit.rs` - PlugkitConfig 통합 설정 (갤러리, 디렉토리, 네트워크)

mod plugkit;

pub use plugkit::{
    FetchConfig, PlugkitConfig, ENV_DATA_DIR, ENV_GALLERY_URL, PLUGKIT_CONFIG_FILE,
};
