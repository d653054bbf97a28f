//! Service configuration loaded from TOML, with environment overrides.
//!
//! `CONTENT_CONFIG_PATH` names the TOML file. Any IO/parse error falls back to defaults
//! (and is logged). `LMS_API_BASE_URL`, `LMS_PROXY_BASE_URL`, `LMS_API_TOKEN` and
//! `SESSION_IDLE_SECS` win over the file.
//!
//! Example:
//! ```toml
//! api_base_url = "https://lms.example.org"
//! request_timeout_secs = 30
//! session_idle_secs = 1800
//!
//! [limits]
//! document_mb = 50
//! image_mb = 10
//!
//! [folders]
//! resources = "resources"
//! ```

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  pub api_base_url: String,
  /// Base used when building proxy URLs; defaults to `api_base_url`.
  pub proxy_base_url: Option<String>,
  pub api_token: Option<String>,
  pub request_timeout_secs: u64,
  /// Sessions nobody touched for this long are dropped, unless a WebSocket is bound to them.
  pub session_idle_secs: u64,
  pub limits: UploadLimits,
  pub folders: UploadFolders,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      api_base_url: "http://localhost:5000".into(),
      proxy_base_url: None,
      api_token: None,
      request_timeout_secs: 30,
      session_idle_secs: 30 * 60,
      limits: UploadLimits::default(),
      folders: UploadFolders::default(),
    }
  }
}

impl ServiceConfig {
  pub fn proxy_base(&self) -> &str {
    self.proxy_base_url.as_deref().unwrap_or(&self.api_base_url)
  }
}

/// Upload size caps in megabytes.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
  /// Document/video resources and assignment supporting files.
  pub document_mb: u64,
  /// MCQ question and option images.
  pub image_mb: u64,
}

impl Default for UploadLimits {
  fn default() -> Self { Self { document_mb: 50, image_mb: 10 } }
}

/// Destination folders passed to the upload API.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UploadFolders {
  pub resources: String,
  pub assignments: String,
  pub mcq: String,
}

impl Default for UploadFolders {
  fn default() -> Self {
    Self { resources: "resources".into(), assignments: "assignments".into(), mcq: "mcq-images".into() }
  }
}

fn read_config_file() -> Option<ServiceConfig> {
  let path = std::env::var("CONTENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<ServiceConfig>(&s) {
      Ok(cfg) => {
        info!(target: "objective_content", %path, "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "objective_content", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "objective_content", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

fn env_non_empty(key: &str) -> Option<String> {
  std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// File (if any) + env overrides. Never fails.
pub fn load_service_config_from_env() -> ServiceConfig {
  let mut cfg = read_config_file().unwrap_or_default();
  if let Some(v) = env_non_empty("LMS_API_BASE_URL") {
    cfg.api_base_url = v;
  }
  if let Some(v) = env_non_empty("LMS_PROXY_BASE_URL") {
    cfg.proxy_base_url = Some(v);
  }
  if let Some(v) = env_non_empty("LMS_API_TOKEN") {
    cfg.api_token = Some(v);
  }
  if let Some(secs) = env_non_empty("SESSION_IDLE_SECS").and_then(|v| v.parse::<u64>().ok()) {
    cfg.session_idle_secs = secs;
  }
  cfg
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: ServiceConfig = toml::from_str(
      r#"
        api_base_url = "https://lms.example.org"
        [limits]
        image_mb = 5
      "#,
    )
    .expect("parse");
    assert_eq!(cfg.api_base_url, "https://lms.example.org");
    assert_eq!(cfg.limits.image_mb, 5);
    assert_eq!(cfg.limits.document_mb, 50);
    assert_eq!(cfg.folders.mcq, "mcq-images");
    assert_eq!(cfg.proxy_base(), "https://lms.example.org");
    assert_eq!(cfg.session_idle_secs, 1800);
  }
}
