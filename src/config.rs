// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::suppression::DEFAULT_SUPPRESSION_TTL_SECS;
use crate::validate::DEFAULT_NOTICE_MAX_AGE_DAYS;

pub const ENV_CONFIG_PATH: &str = "POPUP_CONFIG_PATH";
pub const ENV_API_BASE_URL: &str = "POPUP_API_BASE_URL";
pub const ENV_STORE_DIR: &str = "POPUP_STORE_DIR";
pub const ENV_LISTEN_ADDR: &str = "POPUP_LISTEN_ADDR";

fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_ttl_secs() -> i64 {
    DEFAULT_SUPPRESSION_TTL_SECS
}
fn default_max_age_days() -> i64 {
    DEFAULT_NOTICE_MAX_AGE_DAYS
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopupConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_ttl_secs")]
    pub suppression_ttl_secs: i64,
    #[serde(default = "default_max_age_days")]
    pub notice_max_age_days: i64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Directory for the file-backed suppression store; `None` keeps it in memory.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            settle_delay_ms: default_settle_delay_ms(),
            suppression_ttl_secs: default_ttl_secs(),
            notice_max_age_days: default_max_age_days(),
            request_timeout_secs: default_request_timeout_secs(),
            store_dir: None,
            listen_addr: default_listen_addr(),
        }
    }
}

impl PopupConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Load from an explicit path. TOML or JSON, picked by extension, then by content.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading popup config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, &ext)?;
        Ok(cfg.apply_env().sanitized())
    }

    /// Resolution order:
    /// 1) $POPUP_CONFIG_PATH
    /// 2) config/popup.toml
    /// 3) config/popup.json
    /// 4) defaults
    ///
    /// Env overrides are applied on top in every case.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in ["config/popup.toml", "config/popup.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default().apply_env().sanitized())
    }

    fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var(ENV_API_BASE_URL) {
            if !v.trim().is_empty() {
                self.api_base_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var(ENV_STORE_DIR) {
            if !v.trim().is_empty() {
                self.store_dir = Some(PathBuf::from(v.trim()));
            }
        }
        if let Ok(v) = std::env::var(ENV_LISTEN_ADDR) {
            if !v.trim().is_empty() {
                self.listen_addr = v.trim().to_string();
            }
        }
        self
    }

    fn sanitized(mut self) -> Self {
        if self.suppression_ttl_secs <= 0 {
            self.suppression_ttl_secs = default_ttl_secs();
        }
        if self.notice_max_age_days <= 0 {
            self.notice_max_age_days = default_max_age_days();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PopupConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing popup config json");
    }
    if hint_ext == "toml" {
        return toml::from_str(s).context("parsing popup config toml");
    }
    if let Ok(v) = serde_json::from_str(s) {
        return Ok(v);
    }
    toml::from_str(s).map_err(|e| anyhow!("unsupported popup config format: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn clear_env() {
        for k in [ENV_CONFIG_PATH, ENV_API_BASE_URL, ENV_STORE_DIR, ENV_LISTEN_ADDR] {
            env::remove_var(k);
        }
    }

    #[test]
    fn toml_partial_uses_defaults() {
        let cfg = parse_config(r#"api_base_url = "https://cms.example.org/api""#, "toml").unwrap();
        assert_eq!(cfg.api_base_url, "https://cms.example.org/api");
        assert_eq!(cfg.settle_delay_ms, 500);
        assert_eq!(cfg.suppression_ttl_secs, 8 * 3600);
        assert_eq!(cfg.notice_max_age_days, 5);
        assert!(cfg.store_dir.is_none());
    }

    #[test]
    fn json_without_hint_is_detected() {
        let cfg = parse_config(r#"{"settle_delay_ms": 0}"#, "").unwrap();
        assert_eq!(cfg.settle_delay_ms, 0);
    }

    #[test]
    fn non_positive_values_fall_back() {
        let cfg = PopupConfig {
            suppression_ttl_secs: -1,
            notice_max_age_days: 0,
            request_timeout_secs: 0,
            ..PopupConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.suppression_ttl_secs, 8 * 3600);
        assert_eq!(cfg.notice_max_age_days, 5);
        assert_eq!(cfg.request_timeout_secs, 10);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        clear_env();

        // nothing on disk → defaults
        assert_eq!(PopupConfig::load_default().unwrap(), PopupConfig::default());

        // env path wins, env overrides on top
        let p = tmp.path().join("popup.json");
        fs::write(&p, r#"{"api_base_url": "http://a", "settle_delay_ms": 10}"#).unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_API_BASE_URL, "http://b");
        let cfg = PopupConfig::load_default().unwrap();
        assert_eq!(cfg.api_base_url, "http://b");
        assert_eq!(cfg.settle_delay_ms, 10);

        // missing env path is an error
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
        assert!(PopupConfig::load_default().is_err());

        clear_env();
        env::set_current_dir(&old).unwrap();
    }
}
