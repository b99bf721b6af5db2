use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub network: Option<NetworkConfig>,
    pub retry: Option<RetryConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub lookup_url: Option<String>,
    pub repository_base_url: Option<String>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub lookup_requests_per_second: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub out_dir: Option<String>,
    pub results_name: Option<String>,
}

/// Platform config directory path: `<config_dir>/discopub/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("discopub").join("config.toml"))
}

/// Load config by cascading CWD `.discopub.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".discopub.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

fn pick<S, T>(
    base: &Option<S>,
    overlay: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bn, on) = (&base.network, &overlay.network);
    let (br, or) = (&base.retry, &overlay.retry);
    let (bo, oo) = (&base.output, &overlay.output);
    ConfigFile {
        network: Some(NetworkConfig {
            lookup_url: pick(bn, on, |n| n.lookup_url.clone()),
            repository_base_url: pick(bn, on, |n| n.repository_base_url.clone()),
            user_agent: pick(bn, on, |n| n.user_agent.clone()),
            request_timeout_secs: pick(bn, on, |n| n.request_timeout_secs),
            lookup_requests_per_second: pick(bn, on, |n| n.lookup_requests_per_second),
        }),
        retry: Some(RetryConfig {
            max_attempts: pick(br, or, |r| r.max_attempts),
            retry_backoff_ms: pick(br, or, |r| r.retry_backoff_ms),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(&base.concurrency, &overlay.concurrency, |c| c.num_workers),
        }),
        output: Some(OutputConfig {
            out_dir: pick(bo, oo, |o| o.out_dir.clone()),
            results_name: pick(bo, oo, |o| o.results_name.clone()),
        }),
    }
}

impl ConfigFile {
    /// Overwrite the fields of `config` that this file sets.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(n) = &self.network {
            if let Some(v) = &n.lookup_url {
                config.lookup_url = v.clone();
            }
            if let Some(v) = &n.repository_base_url {
                config.repository_base_url = v.clone();
            }
            if let Some(v) = &n.user_agent {
                config.user_agent = v.clone();
            }
            if let Some(v) = n.request_timeout_secs {
                config.request_timeout_secs = v;
            }
            if let Some(v) = n.lookup_requests_per_second {
                config.lookup_requests_per_second = v;
            }
        }
        if let Some(r) = &self.retry {
            if let Some(v) = r.max_attempts {
                config.max_attempts = v;
            }
            if let Some(v) = r.retry_backoff_ms {
                config.retry_backoff_ms = v;
            }
        }
        if let Some(v) = self.concurrency.as_ref().and_then(|c| c.num_workers) {
            config.num_workers = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let toml_str = "[retry]\nmax_attempts = 5\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.retry.unwrap().max_attempts, Some(5));
        assert!(parsed.network.is_none());
    }

    #[test]
    fn merge_overlay_wins_and_base_preserved() {
        let base = ConfigFile {
            network: Some(NetworkConfig {
                user_agent: Some("base-agent".into()),
                request_timeout_secs: Some(10),
                ..Default::default()
            }),
            concurrency: Some(ConcurrencyConfig {
                num_workers: Some(2),
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            network: Some(NetworkConfig {
                request_timeout_secs: Some(60),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = merge(base, overlay);
        let network = merged.network.unwrap();
        assert_eq!(network.user_agent.as_deref(), Some("base-agent"));
        assert_eq!(network.request_timeout_secs, Some(60));
        assert_eq!(merged.concurrency.unwrap().num_workers, Some(2));
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let file: ConfigFile = toml::from_str(
            r#"
            [network]
            lookup_url = "http://127.0.0.1:9/elink.fcgi"

            [concurrency]
            num_workers = 8
            "#,
        )
        .unwrap();
        let mut config = Config::default();
        file.apply_to(&mut config);

        assert_eq!(config.lookup_url, "http://127.0.0.1:9/elink.fcgi");
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.max_attempts, Config::default().max_attempts);
        assert_eq!(config.user_agent, crate::DEFAULT_USER_AGENT);
    }

    #[test]
    fn missing_or_invalid_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("absent.toml")).is_none());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[retry\nmax_attempts = ").unwrap();
        assert!(load_from_path(&bad).is_none());
    }
}
