//! Application configuration.
//!
//! Loaded once at startup: `config.json` in the working directory (when
//! present), overlaid with environment variables and CLI flags. Immutable
//! for the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use crate::types::Label;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_INPUT_FILE: &str = "collection_list.json";

/// Request budget for the remote API. VNDB's documented quota is roughly
/// 200 requests per 5 minutes; the default stays under half of it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 300,
        }
    }
}

pub struct Config {
    pub token: Option<String>,
    pub proxy: Option<String>,
    pub sync_local: bool,
    pub download_vndb: bool,
    pub input_path: PathBuf,
    pub skip_existing: bool,
    pub concurrency: usize,
    pub dry_run: bool,
    pub no_progress_bar: bool,
    pub rate_limit: RateLimitSettings,
    /// Per-adapter mapping from source status label to engine label codes.
    labels: HashMap<String, HashMap<String, Vec<Label>>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            proxy: None,
            sync_local: false,
            download_vndb: false,
            input_path: PathBuf::from(DEFAULT_INPUT_FILE),
            skip_existing: true,
            concurrency: 5,
            dry_run: false,
            no_progress_bar: false,
            rate_limit: RateLimitSettings::default(),
            labels: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("proxy", &self.proxy)
            .field("sync_local", &self.sync_local)
            .field("download_vndb", &self.download_vndb)
            .field("input_path", &self.input_path)
            .field("skip_existing", &self.skip_existing)
            .field("concurrency", &self.concurrency)
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}

/// On-disk shape; every field optional so a sparse file works.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    token: Option<String>,
    proxy: Option<String>,
    sync_local: Option<bool>,
    download_vndb: Option<bool>,
    input_path: Option<String>,
    skip_existing: Option<bool>,
    concurrency: Option<usize>,
    rate_limit: Option<RateLimitSettings>,
    labels: Option<HashMap<String, HashMap<String, Vec<Label>>>>,
}

impl Config {
    /// Assemble the effective configuration: defaults, then the file, then
    /// the environment, then CLI flags. A present-but-malformed file is a
    /// fatal error; a missing one is fine as long as the environment or the
    /// CLI supplies what is needed.
    pub fn load(path: &Path, cli: &crate::cli::Cli) -> anyhow::Result<Self> {
        let file = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<ConfigFile>(&contents)
                .with_context(|| format!("{} is not a valid config file", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults and environment");
            ConfigFile::default()
        };

        let mut config = Config::default();

        if file.token.is_some() {
            config.token = file.token;
        }
        if file.proxy.is_some() {
            config.proxy = file.proxy;
        }
        if let Some(sync_local) = file.sync_local {
            config.sync_local = sync_local;
        }
        if let Some(download_vndb) = file.download_vndb {
            config.download_vndb = download_vndb;
        }
        if let Some(input_path) = file.input_path {
            config.input_path = expand_tilde(&input_path);
        }
        if let Some(skip_existing) = file.skip_existing {
            config.skip_existing = skip_existing;
        }
        if let Some(concurrency) = file.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(rate_limit) = file.rate_limit {
            config.rate_limit = rate_limit;
        }
        if let Some(labels) = file.labels {
            config.labels = labels;
        }

        if let Ok(proxy) = std::env::var("VNDB_PROXY") {
            if !proxy.is_empty() {
                config.proxy = Some(proxy);
            }
        }
        if let Some(sync_local) = env_flag("SYNC_LOCAL") {
            config.sync_local = sync_local;
        }
        if let Some(download_vndb) = env_flag("DOWNLOAD_VNDB") {
            config.download_vndb = download_vndb;
        }

        // clap already resolved VNDB_TOKEN into cli.token.
        if cli.token.is_some() {
            config.token = cli.token.clone();
        }
        if let Some(input) = &cli.input {
            config.input_path = expand_tilde(input);
        }
        if let Some(concurrency) = cli.concurrency {
            config.concurrency = concurrency;
        }
        config.dry_run = cli.dry_run;
        config.no_progress_bar = cli.no_progress_bar;

        config.concurrency = config.concurrency.max(1);
        Ok(config)
    }

    /// Bearer token, required as soon as any remote operation is enabled.
    pub fn require_token(&self) -> anyhow::Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no API token configured; set \"token\" in {} or the VNDB_TOKEN environment variable",
                    DEFAULT_CONFIG_FILE
                )
            })
    }

    /// Label-code table for one adapter, falling back to the built-in
    /// vocabulary when the config does not override it.
    pub fn adapter_labels(&self, adapter: &str) -> HashMap<String, Vec<Label>> {
        match self.labels.get(adapter) {
            Some(table) => table.clone(),
            None => builtin_labels(adapter),
        }
    }

    /// Default labels for sources whose rows carry no status of their own.
    pub fn default_labels(&self, adapter: &str) -> Vec<Label> {
        self.adapter_labels(adapter)
            .get("default")
            .cloned()
            .unwrap_or_default()
    }
}

/// Built-in status vocabularies. Bangumi collection types are keyed by
/// their numeric code as a string, the same shape a config-supplied table
/// uses.
fn builtin_labels(adapter: &str) -> HashMap<String, Vec<Label>> {
    let pairs: &[(&str, Label)] = match adapter {
        crate::adapter::bangumi::ADAPTER_NAME => &[
            ("1", Label::Wishlist),
            ("2", Label::Finished),
            ("3", Label::Playing),
            ("4", Label::Stalled),
            ("5", Label::Dropped),
        ],
        crate::adapter::text::ADAPTER_NAME => &[("default", Label::Playing)],
        _ => &[],
    };
    pairs
        .iter()
        .map(|(key, label)| (key.to_string(), vec![*label]))
        .collect()
}

fn env_flag(name: &str) -> Option<bool> {
    parse_flag(&std::env::var(name).ok()?)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> crate::cli::Cli {
        let mut full = vec!["vndb-sync"];
        full.extend_from_slice(args);
        crate::cli::Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.json"), &cli(&[])).unwrap();
        assert!(!config.sync_local);
        assert!(!config.download_vndb);
        assert!(config.skip_existing);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.rate_limit, RateLimitSettings::default());
        assert_eq!(config.input_path, PathBuf::from(DEFAULT_INPUT_FILE));
    }

    #[test]
    fn test_file_values_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "token": "abc",
                "proxy": "socks5://127.0.0.1:1080",
                "sync_local": true,
                "input_path": "exports/list.json",
                "concurrency": 2,
                "rate_limit": {"max_requests": 10, "window_secs": 60}
            }"#,
        )
        .unwrap();

        let config = Config::load(&path, &cli(&[])).unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert!(config.sync_local);
        assert_eq!(config.input_path, PathBuf::from("exports/list.json"));
        assert_eq!(config.concurrency, 2);
        assert_eq!(
            config.rate_limit,
            RateLimitSettings {
                max_requests: 10,
                window_secs: 60
            }
        );
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(Config::load(&path, &cli(&[])).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"token": "from-file", "concurrency": 2}"#).unwrap();

        let config = Config::load(
            &path,
            &cli(&[
                "--token",
                "from-cli",
                "--concurrency",
                "8",
                "--input",
                "other.csv",
                "--dry-run",
            ]),
        )
        .unwrap();
        assert_eq!(config.token.as_deref(), Some("from-cli"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.input_path, PathBuf::from("other.csv"));
        assert!(config.dry_run);
    }

    #[test]
    fn test_concurrency_clamped_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(
            &dir.path().join("config.json"),
            &cli(&["--concurrency", "0"]),
        )
        .unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_require_token() {
        let mut config = Config::default();
        assert!(config.require_token().is_err());
        config.token = Some(String::new());
        assert!(config.require_token().is_err());
        config.token = Some("tok".to_string());
        assert_eq!(config.require_token().unwrap(), "tok");
    }

    #[test]
    fn test_builtin_bangumi_vocabulary() {
        let labels = Config::default().adapter_labels("bangumi");
        assert_eq!(labels["1"], vec![Label::Wishlist]);
        assert_eq!(labels["2"], vec![Label::Finished]);
        assert_eq!(labels["3"], vec![Label::Playing]);
        assert_eq!(labels["4"], vec![Label::Stalled]);
        assert_eq!(labels["5"], vec![Label::Dropped]);
    }

    #[test]
    fn test_config_labels_override_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"labels": {"bangumi": {"2": [2, 5]}, "text": {"default": [4]}}}"#,
        )
        .unwrap();

        let config = Config::load(&path, &cli(&[])).unwrap();
        let bangumi = config.adapter_labels("bangumi");
        assert_eq!(bangumi["2"], vec![Label::Finished, Label::Wishlist]);
        // The override replaces the whole table.
        assert!(!bangumi.contains_key("1"));
        assert_eq!(config.default_labels("text"), vec![Label::Dropped]);
    }

    #[test]
    fn test_default_labels_for_unknown_adapter_empty() {
        assert!(Config::default().default_labels("spreadsheet").is_empty());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/exports"), home.join("exports"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("rel/path"), PathBuf::from("rel/path"));
    }
}
