// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_VERSION: i64 = 1;
const APP_NAME: &str = "bookhub";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("BOOKHUB_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set BOOKHUB_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and move values under [api]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(url) = &self.api.base_url
            && url.trim_end_matches('/').trim().is_empty()
        {
            bail!("api.base_url in {} must not be empty", path.display());
        }
        Ok(())
    }

    /// Server address, in precedence order: [api].base_url from the config
    /// file, the BOOKHUB_API_BASE_URL environment variable, then the
    /// compiled-in default. Trailing slashes never survive.
    pub fn base_url(&self) -> String {
        let configured = self
            .api
            .base_url
            .clone()
            .or_else(|| env::var("BOOKHUB_API_BASE_URL").ok());
        configured
            .unwrap_or_else(|| bookhub_api::DEFAULT_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned()
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# bookhub client config\n# Place this file at: {}\n\nversion = 1\n\n[api]\n# REST endpoint of the catalog server.\nbase_url = \"{}\"\n",
            path.display(),
            bookhub_api::DEFAULT_BASE_URL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("BOOKHUB_API_BASE_URL");
        }
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.base_url(), "http://localhost:8080");
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[api]\nbase_url=\"http://localhost:9000\"\n")?;
        let error = Config::load(&path).expect_err("unversioned schema should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[api]"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn configured_base_url_wins_and_trims_slashes() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[api]\nbase_url = \"http://books.local:9000///\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("BOOKHUB_API_BASE_URL", "http://from-env:7000");
        }
        let config = Config::load(&path)?;
        let resolved = config.base_url();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("BOOKHUB_API_BASE_URL");
        }
        assert_eq!(resolved, "http://books.local:9000");
        Ok(())
    }

    #[test]
    fn env_base_url_applies_when_config_is_silent() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("BOOKHUB_API_BASE_URL", "http://from-env:7000/");
        }
        let config = Config::load(&path)?;
        let resolved = config.base_url();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("BOOKHUB_API_BASE_URL");
        }
        assert_eq!(resolved, "http://from-env:7000");
        Ok(())
    }

    #[test]
    fn empty_base_url_fails_validation() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[api]\nbase_url = \"///\"\n")?;
        let error = Config::load(&path).expect_err("empty base_url should fail");
        assert!(error.to_string().contains("must not be empty"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("BOOKHUB_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("BOOKHUB_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn default_path_uses_config_toml_suffix_when_no_env_override() -> Result<()> {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("BOOKHUB_CONFIG_PATH");
        }
        let path = Config::default_path()?;
        assert!(path.ends_with("config.toml"));
        Ok(())
    }

    #[test]
    fn example_config_includes_required_sections() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("version = 1"));
        assert!(example.contains("[api]"));
        assert!(example.contains("base_url"));
        Ok(())
    }
}
