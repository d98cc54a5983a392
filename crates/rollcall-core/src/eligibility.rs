//! Eligibility filter. Classifies roster records against the delivery-mode
//! and region business rules.
//!
//! Classification is pure: the same record always yields the same
//! [`Verdict`], reason text included. Rejections are expected outcomes, not
//! errors.

use std::{collections::BTreeSet, fmt, sync::LazyLock};

use serde::{Deserialize, Serialize};

use crate::record::RosterRecord;

/// Separator between reasons when a record fails more than one rule.
pub const REASON_SEPARATOR: &str = " | ";

pub const DEFAULT_DELIVERY_MODES: [&str; 2] = ["VIRTUAL", "PRESENCIAL"];

pub const DEFAULT_REGIONS: [&str; 5] =
  ["ANTIOQUIA", "CALDAS", "CHOCÓ", "QUINDÍO", "RISARALDA"];

static DEFAULT_RULES: LazyLock<EligibilityRules> =
  LazyLock::new(EligibilityRules::default);

// ─── Verdict ─────────────────────────────────────────────────────────────────

/// Why a record was rejected. Values carry the normalised field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RejectReason {
  InvalidDeliveryMode(String),
  RegionNotPermitted(String),
}

impl fmt::Display for RejectReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::InvalidDeliveryMode(v) => write!(f, "invalid delivery mode: {v}"),
      Self::RegionNotPermitted(v) => write!(f, "region not permitted: {v}"),
    }
  }
}

/// The outcome of classifying one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
  pub valid:   bool,
  /// Composite human-readable reason; `None` iff `valid`.
  pub reason:  Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub reasons: Vec<RejectReason>,
}

impl Verdict {
  fn from_reasons(reasons: Vec<RejectReason>) -> Self {
    if reasons.is_empty() {
      return Self { valid: true, reason: None, reasons };
    }
    let reason = reasons
      .iter()
      .map(ToString::to_string)
      .collect::<Vec<_>>()
      .join(REASON_SEPARATOR);
    Self { valid: false, reason: Some(reason), reasons }
  }
}

/// A record that failed classification, with its composite reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
  #[serde(flatten)]
  pub record: RosterRecord,
  #[serde(rename = "motivo_rechazo")]
  pub reason: String,
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Normalise a field for comparison: trim, then Unicode uppercase.
/// Diacritics are preserved (`"chocó"` → `"CHOCÓ"`).
pub fn normalize_field(raw: &str) -> String { raw.trim().to_uppercase() }

/// The allow-sets a record is checked against.
///
/// Entries are normalised on construction and on deserialisation, so
/// configuration may spell them in any case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRules")]
pub struct EligibilityRules {
  delivery_modes: BTreeSet<String>,
  regions:        BTreeSet<String>,
}

#[derive(Deserialize)]
struct RawRules {
  #[serde(default = "default_modes")]
  delivery_modes: Vec<String>,
  #[serde(default = "default_regions")]
  regions:        Vec<String>,
}

fn default_modes() -> Vec<String> {
  DEFAULT_DELIVERY_MODES.iter().map(|s| s.to_string()).collect()
}

fn default_regions() -> Vec<String> {
  DEFAULT_REGIONS.iter().map(|s| s.to_string()).collect()
}

impl From<RawRules> for EligibilityRules {
  fn from(raw: RawRules) -> Self { Self::new(raw.delivery_modes, raw.regions) }
}

impl Default for EligibilityRules {
  fn default() -> Self { Self::new(DEFAULT_DELIVERY_MODES, DEFAULT_REGIONS) }
}

impl EligibilityRules {
  pub fn new<M, R>(delivery_modes: M, regions: R) -> Self
  where
    M: IntoIterator,
    M::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<str>,
  {
    Self {
      delivery_modes: delivery_modes
        .into_iter()
        .map(|m| normalize_field(m.as_ref()))
        .collect(),
      regions:        regions
        .into_iter()
        .map(|r| normalize_field(r.as_ref()))
        .collect(),
    }
  }

  pub fn delivery_modes(&self) -> impl Iterator<Item = &str> {
    self.delivery_modes.iter().map(String::as_str)
  }

  pub fn regions(&self) -> impl Iterator<Item = &str> {
    self.regions.iter().map(String::as_str)
  }

  /// Classify a single record. Delivery-mode failures are reported before
  /// region failures.
  pub fn classify(&self, record: &RosterRecord) -> Verdict {
    let mode = normalize_field(&record.delivery_mode);
    let region = normalize_field(&record.region);

    let mut reasons = Vec::with_capacity(2);
    if !self.delivery_modes.contains(&mode) {
      reasons.push(RejectReason::InvalidDeliveryMode(mode));
    }
    if !self.regions.contains(&region) {
      reasons.push(RejectReason::RegionNotPermitted(region));
    }
    Verdict::from_reasons(reasons)
  }

  /// Split a roster into valid records (input order preserved) and
  /// rejections.
  pub fn partition<I>(&self, records: I) -> (Vec<RosterRecord>, Vec<Rejection>)
  where
    I: IntoIterator<Item = RosterRecord>,
  {
    let mut valid = Vec::new();
    let mut rejected = Vec::new();
    for record in records {
      let verdict = self.classify(&record);
      match verdict.reason {
        None => valid.push(record),
        Some(reason) => rejected.push(Rejection { record, reason }),
      }
    }
    (valid, rejected)
  }
}

/// Classify a record against the default rules.
pub fn classify(record: &RosterRecord) -> Verdict { DEFAULT_RULES.classify(record) }
