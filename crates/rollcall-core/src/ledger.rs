//! The dedup ledger: which identities have been processed, and their last
//! known status.
//!
//! The [`Ledger`] trait is implemented by `MemoryLedger` (this crate) and by
//! storage backends (e.g. `rollcall-store-sqlite`). The reconciler depends on
//! the trait, never on a concrete backend.

use std::{fmt, future::Future, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// An identity's processing status.
///
/// An open tag, not a closed enum: deployments add statuses through
/// configuration. Construction validates the tag's shape and maps legacy
/// spellings onto canonical ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Status(String);

/// Longest accepted status tag.
pub const MAX_STATUS_LEN: usize = 32;

impl Status {
  pub const MIGRATED: &'static str = "migrated";
  pub const PENDING: &'static str = "pending";
  pub const SUCCEEDED: &'static str = "succeeded";
  pub const VERIFIED: &'static str = "verified";

  /// The statuses every deployment knows about.
  pub const WELL_KNOWN: [&'static str; 4] =
    [Self::PENDING, Self::MIGRATED, Self::SUCCEEDED, Self::VERIFIED];

  /// Parse and validate a status tag.
  pub fn new(raw: &str) -> Result<Self> {
    let tag = raw.trim().to_lowercase();
    let canonical = match tag.as_str() {
      "pendiente" => Self::PENDING,
      "migrado" => Self::MIGRATED,
      "exitoso" => Self::SUCCEEDED,
      "verificado" => Self::VERIFIED,
      other => other,
    };

    let well_formed = !canonical.is_empty()
      && canonical.len() <= MAX_STATUS_LEN
      && canonical
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if !well_formed {
      return Err(Error::InvalidStatus(raw.to_owned()));
    }
    Ok(Self(canonical.to_owned()))
  }

  pub fn pending() -> Self { Self(Self::PENDING.to_owned()) }

  pub fn migrated() -> Self { Self(Self::MIGRATED.to_owned()) }

  pub fn succeeded() -> Self { Self(Self::SUCCEEDED.to_owned()) }

  pub fn verified() -> Self { Self(Self::VERIFIED.to_owned()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for Status {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::new(s) }
}

impl TryFrom<String> for Status {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::new(&s) }
}

impl From<Status> for String {
  fn from(s: Status) -> Self { s.0 }
}

/// The set of statuses a deployment accepts at its boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAllowList(Vec<Status>);

impl Default for StatusAllowList {
  fn default() -> Self {
    Self(
      Status::WELL_KNOWN
        .iter()
        .map(|s| Status(s.to_string()))
        .collect(),
    )
  }
}

impl StatusAllowList {
  pub fn new<I>(tags: I) -> Result<Self>
  where
    I: IntoIterator,
    I::Item: AsRef<str>,
  {
    let statuses = tags
      .into_iter()
      .map(|t| Status::new(t.as_ref()))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self(statuses))
  }

  /// Parse `raw` and check it against the list.
  pub fn check(&self, raw: &str) -> Result<Status> {
    let status = Status::new(raw)?;
    if self.0.contains(&status) {
      Ok(status)
    } else {
      Err(Error::StatusNotAllowed(status.0))
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &Status> { self.0.iter() }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

/// One identity's processing record. At most one exists per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
  pub identity:   String,
  pub status:     Status,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a dedup ledger backend.
///
/// The ledger exclusively owns its entries; callers request status changes
/// through [`Ledger::upsert`]. Entries are never deleted.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait Ledger: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// `true` iff an entry exists for `identity`, whatever its status.
  fn exists<'a>(
    &'a self,
    identity: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Create the entry for `identity`, or update its status and
  /// `updated_at`. `created_at` is set once and never changed.
  ///
  /// Idempotent: repeating a call leaves one entry with the same status.
  fn upsert<'a>(
    &'a self,
    identity: &'a str,
    status: &'a Status,
  ) -> impl Future<Output = Result<LedgerEntry, Self::Error>> + Send + 'a;

  /// Identities currently carrying `status`. Order is unspecified.
  fn list_by_status<'a>(
    &'a self,
    status: &'a Status,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  /// Fetch one entry. Returns `None` if the identity was never seen.
  fn get<'a>(
    &'a self,
    identity: &'a str,
  ) -> impl Future<Output = Result<Option<LedgerEntry>, Self::Error>> + Send + 'a;

  /// Every entry in the ledger.
  fn entries(
    &self,
  ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send + '_;
}
