//! Batch assigner. Splits valid records into two balanced batches.
//!
//! Assignment is round-robin over input order, starting with batch one. It
//! is not stable across reruns whose valid set differs; see DESIGN.md.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::RosterRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchLabel {
  #[serde(rename = "1")]
  One,
  #[serde(rename = "2")]
  Two,
}

impl BatchLabel {
  /// Label for the zero-based position `index` in the valid sequence.
  pub fn for_index(index: usize) -> Self {
    if index % 2 == 0 { Self::One } else { Self::Two }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::One => "1",
      Self::Two => "2",
    }
  }

  /// Value written to the LMS `lote` profile field.
  pub fn profile_value(self) -> &'static str {
    match self {
      Self::One => "Lote 1",
      Self::Two => "Lote 2",
    }
  }
}

impl fmt::Display for BatchLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A valid record paired with its batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchAssignment {
  #[serde(flatten)]
  pub record: RosterRecord,
  #[serde(rename = "profile_field_lote", serialize_with = "serialize_profile")]
  pub batch:  BatchLabel,
}

fn serialize_profile<S>(batch: &BatchLabel, s: S) -> Result<S::Ok, S::Error>
where
  S: serde::Serializer,
{
  s.serialize_str(batch.profile_value())
}

/// Assign batches round-robin. Output corresponds 1:1, in order, to input.
pub fn assign<I>(valid_records: I) -> Vec<BatchAssignment>
where
  I: IntoIterator<Item = RosterRecord>,
{
  valid_records
    .into_iter()
    .enumerate()
    .map(|(i, record)| BatchAssignment { record, batch: BatchLabel::for_index(i) })
    .collect()
}

/// Sizes of the two batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
  pub one: usize,
  pub two: usize,
}

impl BatchCounts {
  pub fn of(assignments: &[BatchAssignment]) -> Self {
    assignments.iter().fold(Self::default(), |mut acc, a| {
      match a.batch {
        BatchLabel::One => acc.one += 1,
        BatchLabel::Two => acc.two += 1,
      }
      acc
    })
  }

  pub fn total(&self) -> usize { self.one + self.two }
}
