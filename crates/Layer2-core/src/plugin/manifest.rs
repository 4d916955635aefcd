//! Plugin Manifest - 플러그인 메타데이터 정의 및 검증
//!
//! `validate`는 순수 함수다. 네트워크나 디스크에 접근하지 않는다.

use plugkit_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

// ============================================================================
// PluginVersion
// ============================================================================

/// 플러그인 버전 (major[.minor[.patch]][-pre])
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub pre: Option<String>,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// 버전 문자열 파싱 (예: "1", "1.2", "1.2.3", "1.2.3-beta.1")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (core, pre) = match s.split_once('-') {
            Some((core, pre)) => {
                let valid = !pre.is_empty()
                    && pre
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
                if !valid {
                    return None;
                }
                (core, Some(pre.to_string()))
            }
            None => (s, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return None;
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            *slot = part.parse().ok()?;
        }

        Some(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
        })
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // 정식 릴리스가 프리릴리스보다 뒤
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

// ============================================================================
// Resources
// ============================================================================

/// 리소스 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Script,
    Style,
    Locale,
    Resource,
}

impl ResourceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "script" => Some(Self::Script),
            "style" => Some(Self::Style),
            "locale" => Some(Self::Locale),
            "resource" => Some(Self::Resource),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
            Self::Locale => "locale",
            Self::Resource => "resource",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 플러그인 리소스 파일
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResource {
    #[serde(rename = "type")]
    pub kind: ResourceKind,

    /// 매니페스트 기준 상대 경로
    pub path: String,
}

impl PluginResource {
    pub fn new(kind: ResourceKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

// ============================================================================
// 메타데이터
// ============================================================================

/// 작성자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginAuthor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// 플러그인이 제공하는 locale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginLocale {
    /// locale 코드 (예: "de-DE")
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// 플러그인이 제공하는 theme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginTheme {
    /// theme id
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ============================================================================
// PluginManifest
// ============================================================================

/// 플러그인 매니페스트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// 고유 플러그인 ID. 설치 후 변경 불가
    pub name: String,

    /// 버전 문자열 (원문 그대로 보존)
    pub version: String,

    /// 리소스 목록
    #[serde(default)]
    pub resources: Vec<PluginResource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<PluginAuthor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// 홈페이지/리포지토리 URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<PluginLocale>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<PluginTheme>,
}

impl PluginManifest {
    /// 새 매니페스트 생성
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            resources: Vec::new(),
            description: None,
            author: None,
            license: None,
            homepage: None,
            locale: None,
            theme: None,
        }
    }

    /// 파싱된 버전
    pub fn parsed_version(&self) -> Option<PluginVersion> {
        PluginVersion::parse(&self.version)
    }

    /// 빌더 패턴: 설명 설정
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// 빌더 패턴: 작성자 설정
    pub fn with_author(mut self, name: impl Into<String>) -> Self {
        self.author = Some(PluginAuthor {
            name: name.into(),
            email: None,
            url: None,
        });
        self
    }

    /// 빌더 패턴: 리소스 추가
    pub fn with_resource(mut self, kind: ResourceKind, path: impl Into<String>) -> Self {
        self.resources.push(PluginResource::new(kind, path));
        self
    }

    /// 빌더 패턴: locale 설정
    pub fn with_locale(mut self, name: impl Into<String>, title: Option<&str>) -> Self {
        self.locale = Some(PluginLocale {
            name: name.into(),
            title: title.map(String::from),
        });
        self
    }

    /// 빌더 패턴: theme 설정
    pub fn with_theme(mut self, name: impl Into<String>, title: Option<&str>) -> Self {
        self.theme = Some(PluginTheme {
            name: name.into(),
            title: title.map(String::from),
        });
        self
    }

    /// JSON 문서로 직렬화
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

// ============================================================================
// 검증
// ============================================================================

/// 원문 바이트에서 매니페스트 검증
pub fn validate(raw: &[u8]) -> Result<PluginManifest> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| Error::Validation(format!("manifest is not valid JSON: {}", e)))?;
    validate_value(&value)
}

/// 파싱된 JSON 값에서 매니페스트 검증
pub fn validate_value(value: &Value) -> Result<PluginManifest> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("manifest must be a JSON object"))?;

    let name = required_str(obj, "name")?;
    if name.trim().is_empty() {
        return Err(invalid("'name' must not be empty"));
    }
    if name != name.trim() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(invalid(format!("'name' contains invalid characters: {:?}", name)));
    }

    let version = required_str(obj, "version")?;
    if PluginVersion::parse(version).is_none() {
        return Err(invalid(format!("'version' is not a valid version: {:?}", version)));
    }

    let resources = match obj.get("resources") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_resource(i, item))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid("'resources' must be an array")),
        None => return Err(invalid("missing required field 'resources'")),
    };

    Ok(PluginManifest {
        name: name.to_string(),
        version: version.to_string(),
        resources,
        description: optional_str(obj, "description")?,
        author: parse_author(obj.get("author"))?,
        license: optional_str(obj, "license")?,
        homepage: optional_str(obj, "homepage")?,
        locale: parse_named(obj.get("locale"), "locale")?
            .map(|(name, title)| PluginLocale { name, title }),
        theme: parse_named(obj.get("theme"), "theme")?
            .map(|(name, title)| PluginTheme { name, title }),
    })
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Validation(message.into())
}

fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(invalid(format!("'{}' must be a string", key))),
        None => Err(invalid(format!("missing required field '{}'", key))),
    }
}

fn optional_str(obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(format!("'{}' must be a string", key))),
    }
}

fn parse_resource(index: usize, item: &Value) -> Result<PluginResource> {
    let obj = item
        .as_object()
        .ok_or_else(|| invalid(format!("resources[{}] must be an object", index)))?;

    let kind_str = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("resources[{}] is missing 'type'", index)))?;
    let kind = ResourceKind::parse(kind_str).ok_or_else(|| {
        invalid(format!(
            "resources[{}] has unsupported type {:?}",
            index, kind_str
        ))
    })?;

    let path = obj
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("resources[{}] is missing 'path'", index)))?;
    if !is_safe_relative_path(path) {
        return Err(invalid(format!(
            "resources[{}] path must be relative without '..': {:?}",
            index, path
        )));
    }

    Ok(PluginResource::new(kind, path))
}

/// 플러그인 디렉토리에 안전하게 join 할 수 있는 경로인지
fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.starts_with('\\')
        && !path.contains(':')
        && path
            .split(['/', '\\'])
            .all(|segment| !segment.is_empty() && segment != "..")
}

fn parse_author(value: Option<&Value>) -> Result<Option<PluginAuthor>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        // "name <email>" 같은 문자열 축약형은 이름으로만 취급
        Some(Value::String(name)) => Ok(Some(PluginAuthor {
            name: name.clone(),
            email: None,
            url: None,
        })),
        Some(Value::Object(obj)) => Ok(Some(PluginAuthor {
            name: required_str(obj, "name")
                .map_err(|_| invalid("'author.name' must be a string"))?
                .to_string(),
            email: optional_str(obj, "email")?,
            url: optional_str(obj, "url")?,
        })),
        Some(_) => Err(invalid("'author' must be an object or string")),
    }
}

fn parse_named(value: Option<&Value>, field: &str) -> Result<Option<(String, Option<String>)>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(obj)) => {
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| invalid(format!("'{}.name' must be a non-empty string", field)))?;
            Ok(Some((name.to_string(), optional_str(obj, "title")?)))
        }
        Some(_) => Err(invalid(format!("'{}' must be an object", field))),
    }
}
