//! Roster and ledger file I/O.

use std::path::Path;

use anyhow::Context as _;
use rollcall_core::record::{normalize_identity, parse_rows};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Read a JSON row file (bare array or wrapped) into `T`s.
pub async fn read_rows<T>(path: &Path) -> anyhow::Result<Vec<T>>
where
  T: for<'de> Deserialize<'de>,
{
  let text = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("reading {}", path.display()))?;
  parse_rows(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Write `value` as pretty JSON to `path`, or to stdout when `path` is `None`.
pub async fn write_json<T>(path: Option<&Path>, value: &T) -> anyhow::Result<()>
where
  T: Serialize + ?Sized,
{
  let json = serde_json::to_string_pretty(value).context("serialising output")?;
  match path {
    Some(path) => tokio::fs::write(path, json)
      .await
      .with_context(|| format!("writing {}", path.display())),
    None => {
      println!("{json}");
      Ok(())
    }
  }
}

/// Identities from a legacy processed-users export.
///
/// Items are either bare identities or objects carrying `username` or
/// `idnumber`. Anything else, and identities that normalise to empty, are
/// dropped.
pub fn legacy_identities(items: Vec<Value>) -> Vec<String> {
  items
    .into_iter()
    .filter_map(|item| match item {
      Value::String(s) => Some(s),
      Value::Number(n) => Some(n.to_string()),
      Value::Object(map) => ["username", "idnumber"]
        .iter()
        .find_map(|k| match map.get(*k) {
          Some(Value::String(s)) => Some(s.clone()),
          Some(Value::Number(n)) => Some(n.to_string()),
          _ => None,
        }),
      _ => None,
    })
    .map(|raw| normalize_identity(&raw))
    .filter(|id| !id.is_empty())
    .collect()
}
