use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_BIND: &str = "127.0.0.1:48090";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const APP_DIR_NAME: &str = "FiscalBackoffice";
const LOCAL_DB_FILE: &str = "fiscal_backoffice.sqlite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
  pub url: String,
  pub api_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
  /// Hosted service. `None` selects the embedded local backend.
  pub remote: Option<RemoteConfig>,
  /// File of the local backend. `None` keeps it in memory.
  pub local_db: Option<PathBuf>,
  pub bind: String,
  pub log_json: bool,
  pub dev_credentials: Option<(String, String)>,
  pub http_timeout: Duration,
}

impl AppConfig {
  pub fn from_env() -> Result<Self, AppError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
    let get = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

    let remote = match (get("FISCAL_BACKEND_URL"), get("FISCAL_BACKEND_KEY")) {
      (Some(url), Some(api_key)) => Some(RemoteConfig { url, api_key }),
      (None, None) => None,
      _ => {
        return Err(AppError::new(
          "CONFIG",
          "FISCAL_BACKEND_URL e FISCAL_BACKEND_KEY devem ser informados juntos",
        ))
      }
    };

    let http_timeout = match get("FISCAL_HTTP_TIMEOUT_SECS") {
      Some(raw) => raw
        .parse::<u64>()
        .map_err(|_| AppError::new("CONFIG", format!("FISCAL_HTTP_TIMEOUT_SECS invalido: {raw}")))?,
      None => DEFAULT_HTTP_TIMEOUT_SECS,
    };

    Ok(Self {
      remote,
      local_db: get("FISCAL_LOCAL_DB").map(PathBuf::from),
      bind: get("FISCAL_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
      log_json: get("FISCAL_LOG_JSON").is_some_and(|raw| parse_bool(&raw)),
      dev_credentials: get("FISCAL_DEV_USER").zip(get("FISCAL_DEV_PASSWORD")),
      http_timeout: Duration::from_secs(http_timeout),
    })
  }
}

pub fn parse_bool(raw: &str) -> bool {
  matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

pub fn resolve_app_dir() -> Result<PathBuf, AppError> {
  let base = dirs_next::data_local_dir()
    .ok_or_else(|| AppError::new("PATH", "Diretorio de dados do usuario nao encontrado"))?;
  Ok(base.join(APP_DIR_NAME))
}

/// Where the local backend lives when no explicit file was configured.
pub fn default_local_db() -> Result<PathBuf, AppError> {
  Ok(resolve_app_dir()?.join(LOCAL_DB_FILE))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(key, value)| (key.to_string(), value.to_string()))
      .collect();
    AppConfig::from_lookup(|key| map.get(key).cloned())
  }

  #[test]
  fn defaults_select_local_backend() {
    let cfg = config(&[]).unwrap();
    assert!(cfg.remote.is_none());
    assert!(cfg.local_db.is_none());
    assert_eq!(cfg.bind, DEFAULT_BIND);
    assert!(!cfg.log_json);
    assert_eq!(cfg.http_timeout, Duration::from_secs(10));
    assert!(cfg.dev_credentials.is_none());
  }

  #[test]
  fn remote_needs_url_and_key() {
    let cfg = config(&[
      ("FISCAL_BACKEND_URL", "https://exemplo.supabase.co"),
      ("FISCAL_BACKEND_KEY", "anon"),
      ("FISCAL_LOG_JSON", "Yes"),
      ("FISCAL_DEV_USER", "ana@escritorio.com.br"),
      ("FISCAL_DEV_PASSWORD", "segredo"),
    ])
    .unwrap();
    assert_eq!(cfg.remote.unwrap().api_key, "anon");
    assert!(cfg.log_json);
    assert_eq!(cfg.dev_credentials.unwrap().0, "ana@escritorio.com.br");

    let err = config(&[("FISCAL_BACKEND_URL", "https://exemplo.supabase.co")]).unwrap_err();
    assert_eq!(err.code, "CONFIG");
  }

  #[test]
  fn bools_and_timeouts_are_validated() {
    assert!(parse_bool("1"));
    assert!(parse_bool("TRUE"));
    assert!(!parse_bool("no"));
    assert!(!parse_bool("on"));
    assert_eq!(config(&[("FISCAL_HTTP_TIMEOUT_SECS", "abc")]).unwrap_err().code, "CONFIG");
    assert_eq!(
      config(&[("FISCAL_HTTP_TIMEOUT_SECS", "3")]).unwrap().http_timeout,
      Duration::from_secs(3)
    );
  }
}
