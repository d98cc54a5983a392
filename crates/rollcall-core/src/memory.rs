//! [`MemoryLedger`]: an in-process [`Ledger`] for tests and dry runs.

use std::{
  collections::HashMap,
  convert::Infallible,
  sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;

use crate::ledger::{Ledger, LedgerEntry, Status};

#[derive(Default)]
struct Inner {
  entries: Vec<LedgerEntry>,
  index:   HashMap<String, usize>,
}

/// A ledger held entirely in memory. Entries are kept in insertion order.
///
/// The mutex is never held across an await point, so writes to the same
/// identity serialise and writes to different identities cannot corrupt
/// each other.
#[derive(Default)]
pub struct MemoryLedger {
  inner: Mutex<Inner>,
}

impl MemoryLedger {
  pub fn new() -> Self { Self::default() }

  /// Seed a ledger from existing entries, e.g. a snapshot of a durable one.
  /// Later duplicates of an identity replace earlier ones.
  pub fn from_entries<I>(entries: I) -> Self
  where
    I: IntoIterator<Item = LedgerEntry>,
  {
    let mut inner = Inner::default();
    for entry in entries {
      match inner.index.get(&entry.identity).copied() {
        Some(i) => inner.entries[i] = entry,
        None => {
          let position = inner.entries.len();
          inner.index.insert(entry.identity.clone(), position);
          inner.entries.push(entry);
        }
      }
    }
    Self { inner: Mutex::new(inner) }
  }

  pub fn len(&self) -> usize { self.lock().entries.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Ledger for MemoryLedger {
  type Error = Infallible;

  async fn exists(&self, identity: &str) -> Result<bool, Infallible> {
    Ok(self.lock().index.contains_key(identity))
  }

  async fn upsert(&self, identity: &str, status: &Status) -> Result<LedgerEntry, Infallible> {
    let now = Utc::now();
    let mut inner = self.lock();

    let existing = inner.index.get(identity).copied();
    if let Some(i) = existing {
      let entry = &mut inner.entries[i];
      entry.status = status.clone();
      entry.updated_at = now;
      return Ok(entry.clone());
    }

    let entry = LedgerEntry {
      identity:   identity.to_owned(),
      status:     status.clone(),
      created_at: now,
      updated_at: now,
    };
    let position = inner.entries.len();
    inner.index.insert(identity.to_owned(), position);
    inner.entries.push(entry.clone());
    Ok(entry)
  }

  async fn list_by_status(&self, status: &Status) -> Result<Vec<String>, Infallible> {
    Ok(
      self
        .lock()
        .entries
        .iter()
        .filter(|e| &e.status == status)
        .map(|e| e.identity.clone())
        .collect(),
    )
  }

  async fn get(&self, identity: &str) -> Result<Option<LedgerEntry>, Infallible> {
    let inner = self.lock();
    Ok(inner.index.get(identity).map(|&i| inner.entries[i].clone()))
  }

  async fn entries(&self) -> Result<Vec<LedgerEntry>, Infallible> {
    Ok(self.lock().entries.clone())
  }
}
