//! Conversions between domain types and the text stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings; statuses are their canonical tag.

use chrono::{DateTime, Utc};
use rollcall_core::ledger::{LedgerEntry, Status};

use crate::{
  Error, Result,
  store::{HistoryAction, HistoryEvent},
};

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_status(s: &str) -> Result<Status> { Ok(Status::new(s)?) }

pub fn encode_action(a: HistoryAction) -> &'static str {
  match a {
    HistoryAction::Created => "created",
    HistoryAction::Updated => "updated",
  }
}

pub fn decode_action(s: &str) -> Result<HistoryAction> {
  match s {
    "created" => Ok(HistoryAction::Created),
    "updated" => Ok(HistoryAction::Updated),
    other => Err(Error::UnknownAction(other.to_owned())),
  }
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// A `ledger_entries` row as read, before validation.
pub struct RawEntry {
  pub identity:   String,
  pub status:     String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawEntry {
  pub const COLUMNS: &'static str = "identity, status, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      identity:   row.get(0)?,
      status:     row.get(1)?,
      created_at: row.get(2)?,
      updated_at: row.get(3)?,
    })
  }

  pub fn into_entry(self) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
      identity:   self.identity,
      status:     decode_status(&self.status)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// A `ledger_history` row as read, before validation.
pub struct RawHistory {
  pub identity:        String,
  pub action:          String,
  pub previous_status: Option<String>,
  pub status:          String,
  pub recorded_at:     String,
}

impl RawHistory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      identity:        row.get(0)?,
      action:          row.get(1)?,
      previous_status: row.get(2)?,
      status:          row.get(3)?,
      recorded_at:     row.get(4)?,
    })
  }

  pub fn into_event(self) -> Result<HistoryEvent> {
    Ok(HistoryEvent {
      identity:        self.identity,
      action:          decode_action(&self.action)?,
      previous_status: self.previous_status.as_deref().map(decode_status).transpose()?,
      status:          decode_status(&self.status)?,
      recorded_at:     decode_dt(&self.recorded_at)?,
    })
  }
}
