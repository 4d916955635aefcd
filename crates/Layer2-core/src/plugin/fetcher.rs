//! Package Fetcher - 플러그인 매니페스트/리소스 다운로드
//!
//! 디스크에 쓰지 않는다. 자동 재시도 없음.

use async_trait::async_trait;
use plugkit_foundation::{Error, FetchConfig, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// 매니페스트 기본 파일명
pub const MANIFEST_FILE: &str = "plugin.json";

/// 다운로드된 원문
#[derive(Debug, Clone)]
pub struct RawPackage {
    /// 최종 요청 URL
    pub url: String,

    /// 응답 본문
    pub body: Vec<u8>,
}

/// 패키지 다운로드 인터페이스
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// URL의 문서를 그대로 가져온다
    async fn fetch(&self, url: &str) -> Result<RawPackage>;
}

// ============================================================================
// URL 헬퍼
// ============================================================================

/// http/https URL만 허용
pub fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| Error::Validation(format!("invalid url {:?}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::Validation(format!(
            "unsupported url scheme '{}' in {:?}",
            other, url
        ))),
    }
}

/// 플러그인 URL → 매니페스트 URL
///
/// `.json`으로 끝나면 그대로, 아니면 디렉토리로 보고 `plugin.json`을 붙인다.
pub fn manifest_url(url: &str) -> Result<Url> {
    let mut parsed = parse_url(url)?;
    if parsed.path().ends_with(".json") {
        return Ok(parsed);
    }

    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    parsed
        .join(MANIFEST_FILE)
        .map_err(|e| Error::Validation(format!("invalid url {:?}: {}", url, e)))
}

/// 매니페스트 URL 기준 리소스 URL
pub fn resource_url(manifest: &Url, path: &str) -> Result<Url> {
    let joined = manifest
        .join(path)
        .map_err(|e| Error::Validation(format!("invalid resource path {:?}: {}", path, e)))?;
    parse_url(joined.as_str())
}

// ============================================================================
// HttpFetcher
// ============================================================================

/// reqwest 기반 fetcher
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl PackageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RawPackage> {
        let parsed = parse_url(url)?;
        debug!("Fetching {}", parsed);

        let mut response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| Error::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(url, format!("HTTP {}", status)));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes {
                return Err(Error::network(
                    url,
                    format!("response too large ({} bytes)", len),
                ));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| Error::network(url, e))? {
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(Error::network(
                    url,
                    format!("response exceeds {} bytes", self.max_body_bytes),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes from {}", body.len(), parsed);

        Ok(RawPackage {
            url: parsed.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// 요청 하나당 (status, body)를 돌려주는 로컬 HTTP 서버
    async fn serve(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_manifest_url() {
        assert_eq!(
            manifest_url("https://x.test/plugins/a.json").unwrap().as_str(),
            "https://x.test/plugins/a.json"
        );
        assert_eq!(
            manifest_url("https://x.test/plugins/a").unwrap().as_str(),
            "https://x.test/plugins/a/plugin.json"
        );
        assert_eq!(
            manifest_url("https://x.test/plugins/a/").unwrap().as_str(),
            "https://x.test/plugins/a/plugin.json"
        );
    }

    #[test]
    fn test_resource_url() {
        let base = manifest_url("https://x.test/plugins/a/").unwrap();
        assert_eq!(
            resource_url(&base, "css/style.css").unwrap().as_str(),
            "https://x.test/plugins/a/css/style.css"
        );
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert!(matches!(
            parse_url("file:///etc/passwd"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(parse_url("not a url"), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base = serve(vec![(200, r#"{"name":"a"}"#)]).await;
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();

        let package = fetcher.fetch(&format!("{}/a.json", base)).await.unwrap();
        assert_eq!(package.body, br#"{"name":"a"}"#);
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_network_error() {
        let base = serve(vec![(404, "missing")]).await;
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();

        let err = fetcher.fetch(&format!("{}/a.json", base)).await.unwrap_err();
        match err {
            Error::Network { message, .. } => assert!(message.contains("404")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_body_limit() {
        let base = serve(vec![(200, "0123456789")]).await;
        let config = FetchConfig {
            max_body_bytes: 4,
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();

        let err = fetcher.fetch(&format!("{}/big", base)).await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher
            .fetch(&format!("http://{}/a.json", addr))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
