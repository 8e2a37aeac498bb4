use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

const ENV_PREFIX: &str = "CATALOG";
const CONFIG_FILE: &str = "catalog";

/// Runtime settings: defaults, then `catalog.toml`, then `CATALOG_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_base: String,
    pub raw_base: String,
    pub db_path: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub timeout_secs: u64,
    #[serde(default)]
    pub github_token: Option<String>,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("owner", "ServiceNowDevProgram")?
        .set_default("repo", "code-snippets")?
        .set_default("branch", "main")?
        .set_default("api_base", "https://api.github.com")?
        .set_default("raw_base", "https://raw.githubusercontent.com")?
        .set_default("db_path", "data/catalog.sqlite")?
        .set_default("concurrency", 8_i64)?
        .set_default("max_retries", 5_i64)?
        .set_default("backoff_base_ms", 1000_i64)?
        .set_default("backoff_cap_ms", 20_000_i64)?
        .set_default("timeout_secs", 30_i64)?)
}

impl Settings {
    pub fn load() -> Result<Self> {
        let mut settings: Settings = defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if settings.github_token.as_deref().map_or(true, str::is_empty) {
            settings.github_token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        }
        settings.concurrency = settings.concurrency.max(1);
        Ok(settings)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_defaults() {
        let s: Settings = defaults().unwrap().build().unwrap().try_deserialize().unwrap();
        assert_eq!(s.owner, "ServiceNowDevProgram");
        assert_eq!(s.repo, "code-snippets");
        assert_eq!(s.branch, "main");
        assert_eq!(s.db_path, "data/catalog.sqlite");
        assert_eq!(s.concurrency, 8);
        assert_eq!(s.max_retries, 5);
        assert_eq!(s.backoff_cap_ms, 20_000);
        assert!(s.github_token.is_none());
    }

    #[test]
    fn overrides_win_over_defaults() {
        let s: Settings = defaults()
            .unwrap()
            .set_override("branch", "develop")
            .unwrap()
            .set_override("concurrency", 2_i64)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.branch, "develop");
        assert_eq!(s.concurrency, 2);
    }
}
