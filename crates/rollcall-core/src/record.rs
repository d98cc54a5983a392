//! Roster records, one prospective enrollee each.
//!
//! Records use the field names of the LMS bulk-upload format on the wire
//! (`idnumber`, `firstname`, `profile_field_modalidad`, ...) so files produced
//! by earlier tooling load unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

// ─── Record ──────────────────────────────────────────────────────────────────

/// A prospective enrollee as read from a roster source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRecord {
  /// National document number; the identity key. Blank when the row has
  /// none, which the reconciler rejects.
  #[serde(
    rename = "idnumber",
    alias = "id_number",
    default,
    deserialize_with = "lenient_identity"
  )]
  pub id_number:     String,
  #[serde(rename = "firstname", alias = "first_name", default, deserialize_with = "lenient_string")]
  pub first_name:    String,
  #[serde(rename = "lastname", alias = "last_name", default, deserialize_with = "lenient_string")]
  pub last_name:     String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub email:         String,
  #[serde(rename = "phone1", alias = "phone", default, deserialize_with = "lenient_string")]
  pub phone:         String,
  #[serde(
    rename = "profile_field_modalidad",
    alias = "delivery_mode",
    default,
    deserialize_with = "lenient_string"
  )]
  pub delivery_mode: String,
  #[serde(
    rename = "profile_field_departamento",
    alias = "region",
    default,
    deserialize_with = "lenient_string"
  )]
  pub region:        String,
  #[serde(
    rename = "profile_field_municipio",
    alias = "city",
    default,
    deserialize_with = "lenient_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub city:          Option<String>,
  /// Free-form group / course intent (e.g. `Programacion`).
  #[serde(rename = "group1", alias = "group", default, deserialize_with = "lenient_string")]
  pub group:         String,
}

impl RosterRecord {
  /// A record with only the fields the eligibility filter looks at.
  pub fn new(
    id_number: impl Into<String>,
    delivery_mode: impl Into<String>,
    region: impl Into<String>,
  ) -> Self {
    Self {
      id_number:     id_number.into(),
      first_name:    String::new(),
      last_name:     String::new(),
      email:         String::new(),
      phone:         String::new(),
      delivery_mode: delivery_mode.into(),
      region:        region.into(),
      city:          None,
      group:         String::new(),
    }
  }

  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
      .trim()
      .to_owned()
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Normalise a document number: trim, drop thousands separators and the
/// trailing `.0` spreadsheet exports append to numeric cells.
pub fn normalize_identity(raw: &str) -> String {
  let mut s: String = raw.trim().chars().filter(|c| *c != ',').collect();
  if let Some(stripped) = s.strip_suffix(".0") {
    s = stripped.to_owned();
  }
  s
}

/// Like [`normalize_identity`] but rejects identities that end up empty.
pub fn parse_identity(raw: &str) -> Result<String> {
  let id = normalize_identity(raw);
  if id.is_empty() {
    return Err(Error::EmptyIdentity);
  }
  Ok(id)
}

// ─── Row files ───────────────────────────────────────────────────────────────

/// Keys under which exports wrap their row array.
const WRAPPER_KEYS: [&str; 4] = ["rows", "data", "items", "result"];

/// Parse a JSON document holding a list of rows.
///
/// Accepts a bare array or an object wrapping the array under one of
/// `rows`, `data`, `items` or `result`. A leading UTF-8 BOM is ignored. An
/// object with none of those keys is treated as a single row.
pub fn parse_rows<T>(text: &str) -> Result<Vec<T>>
where
  T: for<'de> Deserialize<'de>,
{
  let text = text.strip_prefix('\u{feff}').unwrap_or(text);
  let value: Value = serde_json::from_str(text)?;

  let rows = match value {
    Value::Array(rows) => rows,
    Value::Object(mut map) => {
      let wrapped = WRAPPER_KEYS.iter().find_map(|k| match map.remove(*k) {
        Some(Value::Array(rows)) => Some(rows),
        _ => None,
      });
      match wrapped {
        Some(rows) => rows,
        None if map.is_empty() => vec![],
        None => vec![Value::Object(map)],
      }
    }
    _ => vec![],
  };

  rows
    .into_iter()
    .map(|row| serde_json::from_value(row).map_err(Error::from))
    .collect()
}

// ─── Serde helpers ───────────────────────────────────────────────────────────

/// Accept strings, numbers and nulls; exports are not consistent about which.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match Value::deserialize(deserializer)? {
    Value::Null => String::new(),
    Value::String(s) => s,
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    other => other.to_string(),
  })
}

/// Like [`lenient_string`], but null, absent and blank values become `None`.
pub(crate) fn lenient_option<'de, D>(
  deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  lenient_string(deserializer).map(|s| Some(s).filter(|s| !s.trim().is_empty()))
}

pub(crate) fn lenient_identity<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  lenient_string(deserializer).map(|s| normalize_identity(&s))
}
