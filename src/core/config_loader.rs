//! Configuration file loader for nuget-push
//!
//! This module provides configuration discovery, merging and resolution.

use super::config::*;
use crate::core::error::PublishError;
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Configuration file name
pub const CONFIG_FILENAME: &str = "nugetpush.json";

/// Upper bound on directories visited while searching upward
pub const MAX_ASCENT: usize = 64;

/// Environment variables mapped onto [`PushConfig`] fields
const ENV_API_KEY: &str = "NUGETPUSH_API_KEY";
const ENV_FEED_URL: &str = "NUGETPUSH_FEED_URL";
const ENV_SYMBOL_FEED_URL: &str = "NUGETPUSH_SYMBOL_FEED_URL";
const ENV_LOG_PATH: &str = "NUGETPUSH_LOG_PATH";
const ENV_PUSH_FROM_BRANCH: &str = "NUGETPUSH_PUSH_FROM_BRANCH";

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path the upward search starts from
    pub project_path: PathBuf,

    /// CLI arguments (highest priority)
    pub cli_args: Option<PushConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,

    /// Fail when no API key is configured
    pub require_api_key: bool,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and resolve settings from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. nugetpush.json found by searching upward from the project path
    /// 4. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PushSettings, PublishError> {
        let mut configs: Vec<PushConfig> = Vec::new();

        let config_file = Self::find_config_file(&options.project_path);
        if let Some(path) = &config_file {
            configs.push(Self::load_config_file(path).await?);
        }

        if let Some(env_config) = Self::load_env_config(&options.env) {
            configs.push(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged = Self::merge_configs(configs);

        Self::resolve(merged, &options.env, config_file, options.require_api_key)
    }

    /// Search the project directory and its ancestors for the config file
    ///
    /// Stops at the first match, at the filesystem root, or after
    /// [`MAX_ASCENT`] directories.
    pub fn find_config_file(start: &Path) -> Option<PathBuf> {
        let start = absolute_dir(start);

        start
            .ancestors()
            .take(MAX_ASCENT)
            .map(|dir| dir.join(CONFIG_FILENAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration from a JSON file
    async fn load_config_file(file_path: &Path) -> Result<PushConfig, PublishError> {
        let content = fs::read_to_string(file_path).await.map_err(|e| {
            PublishError::ConfigError(format!(
                "Failed to read {}: {}",
                file_path.display(),
                e
            ))
        })?;

        if content.trim().is_empty() {
            return Ok(PushConfig::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            PublishError::ConfigError(format!(
                "Failed to parse {}: {}",
                file_path.display(),
                e
            ))
        })
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Option<PushConfig> {
        let get = |name: &str| {
            env.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let config = PushConfig {
            api_key: get(ENV_API_KEY),
            feed_url: get(ENV_FEED_URL),
            symbol_feed_url: get(ENV_SYMBOL_FEED_URL),
            log_path: get(ENV_LOG_PATH).map(PathBuf::from),
            push_from_branch: get(ENV_PUSH_FROM_BRANCH),
            ..Default::default()
        };

        if config == PushConfig::default() {
            None
        } else {
            Some(config)
        }
    }

    /// Merge multiple configurations, later entries win
    fn merge_configs(configs: Vec<PushConfig>) -> PushConfig {
        let mut result = PushConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target
    fn merge_into(target: &mut PushConfig, source: PushConfig) {
        if source.api_key.is_some() {
            target.api_key = source.api_key;
        }
        if source.feed_url.is_some() {
            target.feed_url = source.feed_url;
        }
        if source.symbol_feed_url.is_some() {
            target.symbol_feed_url = source.symbol_feed_url;
        }
        if source.log_path.is_some() {
            target.log_path = source.log_path;
        }
        if source.push_from_branch.is_some() {
            target.push_from_branch = source.push_from_branch;
        }
        if source.no_repository_policy.is_some() {
            target.no_repository_policy = source.no_repository_policy;
        }
        if source.timeout_seconds.is_some() {
            target.timeout_seconds = source.timeout_seconds;
        }
    }

    /// Turn a merged config into settings, failing on missing required values
    fn resolve(
        config: PushConfig,
        env: &HashMap<String, String>,
        config_file: Option<PathBuf>,
        require_api_key: bool,
    ) -> Result<PushSettings, PublishError> {
        let feed_url = non_blank(config.feed_url)
            .ok_or(PublishError::MissingRequiredOption { option: "FeedUrl" })?;
        Self::validate_url("FeedUrl", &feed_url)?;

        let symbol_feed_url = non_blank(config.symbol_feed_url);
        if let Some(url) = &symbol_feed_url {
            Self::validate_url("SymbolFeedUrl", url)?;
        }

        let api_key = non_blank(config.api_key);
        if require_api_key && api_key.is_none() {
            return Err(PublishError::MissingRequiredOption { option: "ApiKey" });
        }

        let push_timeout = match config.timeout_seconds {
            Some(0) => {
                return Err(PublishError::ConfigError(
                    "TimeoutSeconds must be greater than zero".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_PUSH_TIMEOUT,
        };

        Ok(PushSettings {
            api_key: api_key.map(|k| SecretString::new(k.into())),
            feed_url,
            symbol_feed_url,
            log_path: config
                .log_path
                .unwrap_or_else(|| Self::default_log_path(env)),
            push_from_branch: config.push_from_branch,
            no_repository_policy: config.no_repository_policy.unwrap_or_default(),
            push_timeout,
            config_file,
        })
    }

    fn validate_url(field: &str, url: &str) -> Result<(), PublishError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| PublishError::ConfigError(format!("{} '{}' is invalid: {}", field, url, e)))?;

        match parsed.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(PublishError::ConfigError(format!(
                "{} must be an http(s) URL, got scheme '{}'",
                field, scheme
            ))),
        }
    }

    /// Default log directory: %APPDATA%/NuGetPush, ~/.nugetpush, or the temp dir
    fn default_log_path(env: &HashMap<String, String>) -> PathBuf {
        if let Some(appdata) = env.get("APPDATA").filter(|v| !v.is_empty()) {
            return PathBuf::from(appdata).join("NuGetPush");
        }
        if let Some(home) = env.get("HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(home).join(".nugetpush");
        }
        std::env::temp_dir().join("nugetpush")
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn absolute_dir(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn options(project_path: &Path) -> ConfigLoadOptions {
        ConfigLoadOptions {
            project_path: project_path.to_path_buf(),
            cli_args: None,
            env: HashMap::new(),
            require_api_key: true,
        }
    }

    fn write_config(dir: &Path, json: &str) {
        std::fs::write(dir.join(CONFIG_FILENAME), json).unwrap();
    }

    #[test]
    fn test_find_config_file_in_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("src").join("My.Lib");
        std::fs::create_dir_all(&project).unwrap();
        write_config(temp_dir.path(), "{}");

        let found = ConfigLoader::find_config_file(&project).unwrap();

        assert_eq!(
            found,
            temp_dir.path().canonicalize().unwrap().join(CONFIG_FILENAME)
        );
    }

    #[test]
    fn test_find_config_file_prefers_nearest() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("repo");
        std::fs::create_dir_all(&project).unwrap();
        write_config(temp_dir.path(), "{}");
        write_config(&project, "{}");

        let found = ConfigLoader::find_config_file(&project).unwrap();

        assert_eq!(found, project.canonicalize().unwrap().join(CONFIG_FILENAME));
    }

    #[tokio::test]
    async fn test_load_from_discovered_file() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        write_config(
            temp_dir.path(),
            r#"{"ApiKey": "file-key", "FeedUrl": "https://feed.example/v3/index.json", "PushFromBranch": "master"}"#,
        );

        let settings = ConfigLoader::load(options(&project)).await.unwrap();

        assert_eq!(settings.api_key.as_ref().unwrap().expose_secret(), "file-key");
        assert_eq!(settings.feed_url, "https://feed.example/v3/index.json");
        assert_eq!(settings.required_branch(), Some("master"));
        assert_eq!(settings.push_timeout, DEFAULT_PUSH_TIMEOUT);
        assert!(settings.config_file.is_some());
    }

    #[tokio::test]
    async fn test_cli_overrides_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        write_config(
            temp_dir.path(),
            r#"{"ApiKey": "file-key", "FeedUrl": "https://file.example/index.json", "PushFromBranch": "file-branch"}"#,
        );

        let mut opts = options(temp_dir.path());
        opts.env
            .insert(ENV_FEED_URL.to_string(), "https://env.example/index.json".to_string());
        opts.env
            .insert(ENV_PUSH_FROM_BRANCH.to_string(), "env-branch".to_string());
        opts.cli_args = Some(PushConfig {
            push_from_branch: Some("cli-branch".to_string()),
            ..Default::default()
        });

        let settings = ConfigLoader::load(opts).await.unwrap();

        assert_eq!(settings.api_key.as_ref().unwrap().expose_secret(), "file-key");
        assert_eq!(settings.feed_url, "https://env.example/index.json");
        assert_eq!(settings.required_branch(), Some("cli-branch"));
    }

    #[tokio::test]
    async fn test_missing_feed_url() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), r#"{"ApiKey": "k"}"#);

        let err = ConfigLoader::load(options(temp_dir.path())).await.unwrap_err();

        assert!(matches!(
            err,
            PublishError::MissingRequiredOption { option: "FeedUrl" }
        ));
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), r#"{"FeedUrl": "https://feed.example/index.json", "ApiKey": "  "}"#);

        let err = ConfigLoader::load(options(temp_dir.path())).await.unwrap_err();

        assert!(matches!(
            err,
            PublishError::MissingRequiredOption { option: "ApiKey" }
        ));
    }

    #[tokio::test]
    async fn test_api_key_optional_for_read_only_runs() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), r#"{"FeedUrl": "https://feed.example/index.json"}"#);

        let mut opts = options(temp_dir.path());
        opts.require_api_key = false;

        let settings = ConfigLoader::load(opts).await.unwrap();
        assert!(settings.api_key.is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), "{ not json");

        let err = ConfigLoader::load(options(temp_dir.path())).await.unwrap_err();

        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn test_invalid_feed_url_scheme() {
        let temp_dir = TempDir::new().unwrap();
        write_config(
            temp_dir.path(),
            r#"{"ApiKey": "k", "FeedUrl": "ftp://feed.example/index.json"}"#,
        );

        let err = ConfigLoader::load(options(temp_dir.path())).await.unwrap_err();

        assert!(err.to_string().contains("http(s)"));
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_config(
            temp_dir.path(),
            r#"{"ApiKey": "k", "FeedUrl": "https://feed.example/index.json", "TimeoutSeconds": 0}"#,
        );

        let err = ConfigLoader::load(options(temp_dir.path())).await.unwrap_err();

        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_load_env_config_ignores_blank_values() {
        let mut env = HashMap::new();
        env.insert(ENV_API_KEY.to_string(), " ".to_string());
        assert!(ConfigLoader::load_env_config(&env).is_none());

        env.insert(ENV_API_KEY.to_string(), "secret".to_string());
        let config = ConfigLoader::load_env_config(&env).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_merge_configs_keeps_lower_priority_values() {
        let base = PushConfig {
            api_key: Some("base".to_string()),
            timeout_seconds: Some(60),
            ..Default::default()
        };
        let top = PushConfig {
            timeout_seconds: Some(10),
            ..Default::default()
        };

        let merged = ConfigLoader::merge_configs(vec![base, top]);

        assert_eq!(merged.api_key.as_deref(), Some("base"));
        assert_eq!(merged.timeout_seconds, Some(10));
    }

    #[test]
    fn test_default_log_path() {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/home/dev".to_string());
        assert_eq!(
            ConfigLoader::default_log_path(&env),
            PathBuf::from("/home/dev/.nugetpush")
        );

        env.insert("APPDATA".to_string(), "/appdata".to_string());
        assert_eq!(
            ConfigLoader::default_log_path(&env),
            PathBuf::from("/appdata/NuGetPush")
        );
    }
}
