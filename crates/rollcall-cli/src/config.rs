//! Settings, layered from an optional TOML file and `ROLLCALL_*` environment
//! variables (`__` separates sections, e.g. `ROLLCALL_MOODLE__TOKEN`).

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use chrono::FixedOffset;
use rollcall_core::{
  eligibility::EligibilityRules,
  ledger::{Status, StatusAllowList},
  reconcile::RetryPolicy,
};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub ledger:      LedgerSettings,
  pub eligibility: EligibilityRules,
  pub moodle:      MoodleSettings,
  pub audit:       AuditSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
  pub path:     PathBuf,
  /// Statuses accepted by `mark` and `import`.
  pub statuses: Vec<String>,
}

impl Default for LedgerSettings {
  fn default() -> Self {
    Self {
      path:     PathBuf::from("rollcall.db"),
      statuses: Status::WELL_KNOWN.iter().map(|s| s.to_string()).collect(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MoodleSettings {
  pub base_url:     String,
  pub token:        String,
  pub course_id:    i64,
  pub role_id:      i64,
  pub timeout_secs: u64,
}

impl Default for MoodleSettings {
  fn default() -> Self {
    Self {
      base_url:     String::new(),
      token:        String::new(),
      course_id:    5,
      role_id:      5,
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
  /// Where audit lines are POSTed. Without one, they go to the log.
  pub webhook_url:      Option<String>,
  pub sheet_id:         String,
  pub max_attempts:     u32,
  pub backoff_ms:       u64,
  pub timeout_secs:     u64,
  /// Offset used to stamp audit lines.
  pub utc_offset_hours: i32,
}

impl Default for AuditSettings {
  fn default() -> Self {
    Self {
      webhook_url:      None,
      sheet_id:         String::new(),
      max_attempts:     3,
      backoff_ms:       2000,
      timeout_secs:     10,
      utc_offset_hours: -5,
    }
  }
}

impl AuditSettings {
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.max_attempts,
      backoff:      Duration::from_millis(self.backoff_ms),
    }
  }

  pub fn offset(&self) -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(self.utc_offset_hours * 3600)
      .with_context(|| format!("invalid utc_offset_hours {}", self.utc_offset_hours))
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("ROLLCALL")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Self = settings
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.ledger.path = expand_tilde(&settings.ledger.path);
    Ok(settings)
  }

  pub fn allow_list(&self) -> anyhow::Result<StatusAllowList> {
    StatusAllowList::new(&self.ledger.statuses).context("invalid ledger.statuses")
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
