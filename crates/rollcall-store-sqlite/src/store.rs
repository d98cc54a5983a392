//! [`SqliteLedger`]: the SQLite implementation of [`Ledger`].

use std::{fmt, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use serde::Serialize;
use tracing::debug;

use rollcall_core::ledger::{Ledger, LedgerEntry, Status};

use crate::{
  Result,
  encode::{RawEntry, RawHistory, decode_status, encode_action, encode_dt},
  schema::SCHEMA,
};

/// Whether an upsert created the entry or changed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
  Created,
  Updated,
}

impl fmt::Display for HistoryAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(encode_action(*self)) }
}

/// One row of an identity's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEvent {
  pub identity:        String,
  pub action:          HistoryAction,
  pub previous_status: Option<Status>,
  pub status:          Status,
  pub recorded_at:     DateTime<Utc>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A dedup ledger backed by a single SQLite file.
///
/// Cloning is cheap; clones share one connection, and every statement runs
/// on that connection's thread in submission order.
#[derive(Clone)]
pub struct SqliteLedger {
  conn: tokio_rusqlite::Connection,
}

impl SqliteLedger {
  /// Open (or create) a ledger at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let ledger = Self { conn };
    ledger.init_schema().await?;
    Ok(ledger)
  }

  /// Open an in-memory ledger, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let ledger = Self { conn };
    ledger.init_schema().await?;
    Ok(ledger)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Every upsert recorded for `identity`, oldest first.
  pub async fn history(&self, identity: &str) -> Result<Vec<HistoryEvent>> {
    let identity = identity.to_owned();

    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT identity, action, previous_status, status, recorded_at
             FROM ledger_history
            WHERE identity = ?1
            ORDER BY history_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![identity], RawHistory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_event).collect()
  }

  /// Number of entries per status, ordered by status tag.
  pub async fn counts(&self) -> Result<Vec<(Status, usize)>> {
    let raws: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT status, COUNT(*) FROM ledger_entries GROUP BY status ORDER BY status",
        )?;
        let rows = stmt
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(s, n)| -> Result<(Status, usize)> {
        Ok((decode_status(&s)?, usize::try_from(n).unwrap_or(0)))
      })
      .collect()
  }
}

// ─── Ledger impl ─────────────────────────────────────────────────────────────

impl Ledger for SqliteLedger {
  type Error = crate::Error;

  async fn exists(&self, identity: &str) -> Result<bool> {
    let identity = identity.to_owned();

    let found = self
      .conn
      .call(move |conn| {
        let found = conn
          .query_row(
            "SELECT 1 FROM ledger_entries WHERE identity = ?1",
            rusqlite::params![identity],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok(found)
      })
      .await?;
    Ok(found)
  }

  async fn upsert(&self, identity: &str, status: &Status) -> Result<LedgerEntry> {
    let identity_str = identity.to_owned();
    let status_str = status.as_str().to_owned();
    let now_str = encode_dt(Utc::now());

    let (raw, action) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let previous: Option<String> = tx
          .query_row(
            "SELECT status FROM ledger_entries WHERE identity = ?1",
            rusqlite::params![identity_str],
            |r| r.get(0),
          )
          .optional()?;

        let raw = tx.query_row(
          &format!(
            "INSERT INTO ledger_entries (identity, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(identity) DO UPDATE
               SET status = excluded.status, updated_at = excluded.updated_at
             RETURNING {}",
            RawEntry::COLUMNS
          ),
          rusqlite::params![identity_str, status_str, now_str],
          RawEntry::from_row,
        )?;

        let action = match previous {
          Some(_) => HistoryAction::Updated,
          None => HistoryAction::Created,
        };
        tx.execute(
          "INSERT INTO ledger_history (identity, action, previous_status, status, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![identity_str, encode_action(action), previous, status_str, now_str],
        )?;

        tx.commit()?;
        Ok((raw, action))
      })
      .await?;

    debug!(%identity, %status, ?action, "ledger upsert");
    raw.into_entry()
  }

  async fn list_by_status(&self, status: &Status) -> Result<Vec<String>> {
    let status_str = status.as_str().to_owned();

    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT identity FROM ledger_entries WHERE status = ?1 ORDER BY rowid",
        )?;
        let ids = stmt
          .query_map(rusqlite::params![status_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }

  async fn get(&self, identity: &str) -> Result<Option<LedgerEntry>> {
    let identity = identity.to_owned();

    let raw: Option<RawEntry> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            &format!("SELECT {} FROM ledger_entries WHERE identity = ?1", RawEntry::COLUMNS),
            rusqlite::params![identity],
            RawEntry::from_row,
          )
          .optional()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawEntry::into_entry).transpose()
  }

  async fn entries(&self) -> Result<Vec<LedgerEntry>> {
    let raws: Vec<RawEntry> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM ledger_entries ORDER BY rowid",
          RawEntry::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }
}
