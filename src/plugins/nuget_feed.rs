//! NuGet Feed - NuGet v3 protocol client
//!
//! This module provides the feed operations a push run needs:
//! - Service index discovery (cached per client)
//! - Latest published version lookup via the package base address
//! - Multipart package and symbol package upload
//!
//! The API key is sent only with uploads and is masked in every error.

use crate::core::config::PushSettings;
use crate::core::error::PublishError;
use crate::core::traits::{PackageFeed, PushRequest, PushResult};
use crate::security::redaction::redact;
use crate::validation::VersionValidator;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use semver::Version;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub const PACKAGE_BASE_ADDRESS: &str = "PackageBaseAddress/3.0.0";
pub const PACKAGE_PUBLISH: &str = "PackagePublish/2.0.0";
pub const SYMBOL_PACKAGE_PUBLISH: &str = "SymbolPackagePublish/4.9.0";

const API_KEY_HEADER: &str = "X-NuGet-ApiKey";

/// `@type` is either a single string or a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResourceType {
    One(String),
    Many(Vec<String>),
}

impl ResourceType {
    fn is(&self, wanted: &str) -> bool {
        match self {
            Self::One(t) => t == wanted,
            Self::Many(types) => types.iter().any(|t| t == wanted),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    resource_type: ResourceType,
}

/// NuGet v3 service index
#[derive(Debug, Deserialize)]
struct ServiceIndex {
    #[serde(default)]
    resources: Vec<ServiceResource>,
}

impl ServiceIndex {
    fn resource(&self, resource_type: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|r| r.resource_type.is(resource_type))
            .map(|r| r.id.as_str())
    }
}

/// Package base address `index.json`
#[derive(Debug, Deserialize)]
struct VersionsIndex {
    #[serde(default)]
    versions: Vec<String>,
}

/// NuGet v3 feed client
pub struct NuGetFeed {
    client: reqwest::Client,
    feed_url: String,
    symbol_feed_url: Option<String>,
    api_key: Option<SecretString>,
    index: OnceCell<ServiceIndex>,
    symbol_index: OnceCell<ServiceIndex>,
}

impl NuGetFeed {
    /// Create a client for the service index at `feed_url`
    pub fn new(
        feed_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nuget-push/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            feed_url: feed_url.into(),
            symbol_feed_url: None,
            api_key,
            index: OnceCell::new(),
            symbol_index: OnceCell::new(),
        })
    }

    pub fn from_settings(settings: &PushSettings) -> Result<Self, PublishError> {
        Ok(Self::new(
            settings.feed_url.clone(),
            settings.api_key.clone(),
            settings.push_timeout,
        )?
        .with_symbol_feed(settings.symbol_feed_url.clone()))
    }

    /// Push symbol packages to a separate feed
    pub fn with_symbol_feed(mut self, symbol_feed_url: Option<String>) -> Self {
        self.symbol_feed_url = symbol_feed_url;
        self
    }

    fn redact(&self, text: &str) -> String {
        match &self.api_key {
            Some(key) => redact(text, key.expose_secret()),
            None => text.to_string(),
        }
    }

    async fn fetch_index(&self, url: &str, package_id: &str) -> Result<ServiceIndex, PublishError> {
        debug!("Loading service index {}", url);
        let feed_error = |message: String| PublishError::FeedError {
            package_id: package_id.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| feed_error(format!("service index {}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PublishError::AuthenticationFailed {
                feed: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(feed_error(format!("service index {} returned HTTP {}", url, status)));
        }

        response
            .json::<ServiceIndex>()
            .await
            .map_err(|e| feed_error(format!("invalid service index {}: {}", url, e)))
    }

    async fn service_index(&self, package_id: &str) -> Result<&ServiceIndex, PublishError> {
        self.index
            .get_or_try_init(|| self.fetch_index(&self.feed_url, package_id))
            .await
    }

    async fn symbol_service_index(&self, package_id: &str) -> Result<&ServiceIndex, PublishError> {
        match &self.symbol_feed_url {
            Some(url) => {
                self.symbol_index
                    .get_or_try_init(|| self.fetch_index(url, package_id))
                    .await
            }
            None => self.service_index(package_id).await,
        }
    }

    /// Upload one file as the `package` part of a multipart PUT
    async fn upload(
        &self,
        url: &str,
        file: &Path,
        request: &PushRequest,
    ) -> Result<(), PublishError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(PublishError::MissingRequiredOption { option: "ApiKey" })?;

        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| PublishError::io(file, e))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.nupkg".to_string());
        let form = Form::new().part("package", Part::bytes(bytes).file_name(file_name));

        debug!("PUT {} ({})", url, file.display());
        let response = self
            .client
            .put(url)
            .header(API_KEY_HEADER, api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PublishError::TimeoutError {
                        operation: format!("pushing {} {}", request.package_id, request.version),
                    }
                } else {
                    PublishError::PushFailed {
                        package_id: request.package_id.clone(),
                        message: self.redact(&e.to_string()),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        match status {
            StatusCode::CONFLICT => Err(PublishError::VersionConflict {
                package_id: request.package_id.clone(),
                version: request.version.to_string(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(PublishError::AuthenticationFailed {
                    feed: url.to_string(),
                })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(PublishError::PushFailed {
                    package_id: request.package_id.clone(),
                    message: self.redact(&format!("HTTP {}: {}", status, body.trim())),
                })
            }
        }
    }
}

#[async_trait]
impl PackageFeed for NuGetFeed {
    fn source(&self) -> &str {
        &self.feed_url
    }

    async fn latest_version(&self, package_id: &str) -> Result<Option<Version>, PublishError> {
        let feed_error = |message: String| PublishError::FeedError {
            package_id: package_id.to_string(),
            message,
        };

        let index = self.service_index(package_id).await?;
        let base = index
            .resource(PACKAGE_BASE_ADDRESS)
            .ok_or_else(|| feed_error(format!("feed has no {} resource", PACKAGE_BASE_ADDRESS)))?;

        let url = format!(
            "{}/{}/index.json",
            base.trim_end_matches('/'),
            package_id.to_lowercase()
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                PublishError::TimeoutError {
                    operation: format!("querying versions of {}", package_id),
                }
            } else {
                feed_error(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("{} has never been published", package_id);
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PublishError::AuthenticationFailed { feed: url });
        }
        if !status.is_success() {
            return Err(feed_error(format!("{} returned HTTP {}", url, status)));
        }

        let versions = response
            .json::<VersionsIndex>()
            .await
            .map_err(|e| feed_error(format!("invalid version list: {}", e)))?;

        let validator = VersionValidator::new();
        let latest = versions
            .versions
            .iter()
            .filter_map(|text| match validator.parse(text) {
                Ok(version) => Some(version),
                Err(reason) => {
                    debug!("Ignoring feed version '{}': {}", text, reason);
                    None
                }
            })
            .max_by(|a, b| a.cmp_precedence(b));

        Ok(latest)
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResult, PublishError> {
        let index = self.service_index(&request.package_id).await?;
        let publish_url = index
            .resource(PACKAGE_PUBLISH)
            .ok_or_else(|| PublishError::PushFailed {
                package_id: request.package_id.clone(),
                message: format!("feed has no {} resource", PACKAGE_PUBLISH),
            })?
            .to_string();

        self.upload(&publish_url, &request.package_path, request)
            .await?;

        let Some(symbols_path) = &request.symbols_path else {
            return Ok(PushResult::default());
        };

        // The package is already on the feed; symbol problems only warn
        let symbol_url = match self.symbol_service_index(&request.package_id).await {
            Ok(index) => index.resource(SYMBOL_PACKAGE_PUBLISH).map(str::to_string),
            Err(e) => {
                warn!("Symbol feed unavailable: {}", e);
                return Ok(PushResult::default());
            }
        };

        let Some(symbol_url) = symbol_url else {
            warn!(
                "Feed has no {} resource, symbols not pushed for {}",
                SYMBOL_PACKAGE_PUBLISH, request.package_id
            );
            return Ok(PushResult::default());
        };

        match self.upload(&symbol_url, symbols_path, request).await {
            Ok(()) => Ok(PushResult {
                symbols_pushed: true,
            }),
            Err(e) => {
                warn!("Symbol push failed for {}: {}", request.package_id, e);
                Ok(PushResult::default())
            }
        }
    }
}

impl std::fmt::Debug for NuGetFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NuGetFeed")
            .field("feed_url", &self.feed_url)
            .field("symbol_feed_url", &self.symbol_feed_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    const KEY: &str = "oy2secretapikeyvalue";

    fn index_body(server: &MockServer, with_symbols: bool) -> serde_json::Value {
        let mut resources = vec![
            json!({ "@id": server.url("/flat/"), "@type": PACKAGE_BASE_ADDRESS }),
            json!({ "@id": server.url("/api/v2/package"), "@type": [PACKAGE_PUBLISH] }),
        ];
        if with_symbols {
            resources.push(json!({
                "@id": server.url("/api/v2/symbolpackage"),
                "@type": SYMBOL_PACKAGE_PUBLISH
            }));
        }
        json!({ "version": "3.0.0", "resources": resources })
    }

    fn feed(server: &MockServer) -> NuGetFeed {
        NuGetFeed::new(
            server.url("/v3/index.json"),
            Some(SecretString::new(KEY.into())),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    fn request(dir: &Path, with_symbols: bool) -> PushRequest {
        let package_path = dir.join("Foo.1.0.0.nupkg");
        std::fs::write(&package_path, b"package-bytes").unwrap();
        let symbols_path = with_symbols.then(|| {
            let path = dir.join("Foo.1.0.0.symbols.nupkg");
            std::fs::write(&path, b"symbol-bytes").unwrap();
            path
        });

        PushRequest {
            package_id: "Foo".to_string(),
            version: Version::new(1, 0, 0),
            package_path,
            symbols_path,
        }
    }

    #[tokio::test]
    async fn test_latest_version_includes_prereleases() {
        let server = MockServer::start_async().await;
        let index = server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;
        let versions = server
            .mock_async(|when, then| {
                when.method(GET).path("/flat/my.package/index.json");
                then.status(200).json_body(json!({
                    "versions": ["1.0.0", "1.10.0", "1.2.0", "2.0.0-beta.2", "not-a-version"]
                }));
            })
            .await;

        let feed = feed(&server);
        let latest = feed.latest_version("My.Package").await.unwrap();

        assert_eq!(latest, Some(Version::parse("2.0.0-beta.2").unwrap()));
        index.assert_async().await;
        versions.assert_async().await;
    }

    #[tokio::test]
    async fn test_latest_version_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/flat/foo/index.json");
                then.status(404);
            })
            .await;

        let latest = feed(&server).latest_version("Foo").await.unwrap();

        assert_eq!(latest, None);
    }

    #[tokio::test]
    async fn test_service_index_is_cached() {
        let server = MockServer::start_async().await;
        let index = server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/flat/foo/index.json");
                then.status(200).json_body(json!({ "versions": ["1.0.0"] }));
            })
            .await;

        let feed = feed(&server);
        feed.latest_version("Foo").await.unwrap();
        feed.latest_version("Foo").await.unwrap();

        index.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_service_index_failure_is_feed_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(500);
            })
            .await;

        let result = feed(&server).latest_version("Foo").await;

        assert!(matches!(result, Err(PublishError::FeedError { .. })));
    }

    #[tokio::test]
    async fn test_push_package() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;
        let upload = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/v2/package")
                    .header("x-nuget-apikey", KEY)
                    .body_contains("name=\"package\"")
                    .body_contains("package-bytes");
                then.status(201);
            })
            .await;

        let result = feed(&server)
            .push(&request(temp_dir.path(), false))
            .await
            .unwrap();

        assert!(!result.symbols_pushed);
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_push_with_symbols() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, true));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v2/package");
                then.status(201);
            })
            .await;
        let symbols = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/v2/symbolpackage")
                    .body_contains("symbol-bytes");
                then.status(201);
            })
            .await;

        let result = feed(&server)
            .push(&request(temp_dir.path(), true))
            .await
            .unwrap();

        assert!(result.symbols_pushed);
        symbols.assert_async().await;
    }

    #[tokio::test]
    async fn test_push_symbols_without_resource() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v2/package");
                then.status(202);
            })
            .await;

        let result = feed(&server)
            .push(&request(temp_dir.path(), true))
            .await
            .unwrap();

        assert!(!result.symbols_pushed);
    }

    #[tokio::test]
    async fn test_push_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v2/package");
                then.status(409);
            })
            .await;

        let result = feed(&server).push(&request(temp_dir.path(), false)).await;

        assert!(matches!(result, Err(PublishError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn test_push_unauthorized() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v2/package");
                then.status(403);
            })
            .await;

        let result = feed(&server).push(&request(temp_dir.path(), false)).await;

        assert!(matches!(
            result,
            Err(PublishError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_push_failure_redacts_key() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v2/package");
                then.status(500)
                    .body(format!("invalid key {}", KEY));
            })
            .await;

        let result = feed(&server).push(&request(temp_dir.path(), false)).await;

        match result {
            Err(PublishError::PushFailed { message, .. }) => {
                assert!(message.contains("500"));
                assert!(!message.contains(KEY));
            }
            other => panic!("expected PushFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_push_requires_api_key() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/index.json");
                then.status(200).json_body(index_body(&server, false));
            })
            .await;

        let feed = NuGetFeed::new(server.url("/v3/index.json"), None, Duration::from_secs(5))
            .unwrap();
        let result = feed.push(&request(temp_dir.path(), false)).await;

        assert!(matches!(
            result,
            Err(PublishError::MissingRequiredOption { option: "ApiKey" })
        ));
    }

    #[test]
    fn test_resource_lookup() {
        let index: ServiceIndex = serde_json::from_value(json!({
            "resources": [
                { "@id": "https://a/flat/", "@type": "PackageBaseAddress/3.0.0" },
                { "@id": "https://a/push", "@type": ["PackagePublish/2.0.0", "Other"] }
            ]
        }))
        .unwrap();

        assert_eq!(index.resource(PACKAGE_BASE_ADDRESS), Some("https://a/flat/"));
        assert_eq!(index.resource(PACKAGE_PUBLISH), Some("https://a/push"));
        assert_eq!(index.resource(SYMBOL_PACKAGE_PUBLISH), None);
    }

    #[test]
    fn test_debug_hides_key() {
        let feed = NuGetFeed::new(
            "https://feed.test/v3/index.json",
            Some(SecretString::new(KEY.into())),
            Duration::from_secs(1),
        )
        .unwrap();

        let debug = format!("{:?}", feed);
        assert!(debug.contains("feed.test"));
        assert!(!debug.contains(KEY));
    }
}
