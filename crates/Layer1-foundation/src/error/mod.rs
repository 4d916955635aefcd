//! Error types for PlugKit
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// PlugKit 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 플러그인 라이프사이클
    // ========================================================================
    /// 매니페스트 형식 오류
    #[error("Invalid manifest: {0}")]
    Validation(String),

    /// 패키지/갤러리 다운로드 실패 (전송 오류, non-2xx 응답 포함)
    #[error("Network error: {url}: {message}")]
    Network { url: String, message: String },

    /// 존재하지 않는 대상에 대한 작업
    #[error("Not found: {0}")]
    NotFound(String),

    /// 다른 작업이 진행 중
    #[error("Conflict: {0}")]
    Conflict(String),

    // ========================================================================
    // 설정 / 저장소
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 네트워크 에러 생성 헬퍼
    pub fn network(url: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Error::Network {
            url: url.into(),
            message: cause.to_string(),
        }
    }

    /// 재시도 가능한 에러인지 확인
    ///
    /// 자동 재시도는 하지 않는다. 호출자가 수동 재시도를 제안할지 판단하는 용도.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network { .. } | Error::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_display_carries_cause() {
        let err = Error::network("https://x/a.json", "HTTP 404 Not Found");
        let text = err.to_string();
        assert!(text.contains("https://x/a.json"));
        assert!(text.contains("404"));
    }

    #[test]
    fn test_classification() {
        assert!(Error::network("u", "timeout").is_retryable());
        assert!(Error::Conflict("busy".into()).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
        assert!(!Error::NotFound("a".into()).is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
