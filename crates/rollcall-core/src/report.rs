//! Combined registration report: registration approvals (report 1003) joined
//! with each student's cycle status and group (report 992).
//!
//! The join is a left join on the normalised document number. Every
//! registration row appears at least once; a registration matching several
//! cycle rows appears once per match, in cycle-report order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::record::{lenient_option, lenient_string, normalize_identity};

/// Stand-in for a cycle status or group the cycle report does not provide.
pub const ACTIVATE: &str = "Activar";

/// A row of the registration report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistrationStatus {
  #[serde(rename = "documento_numero", deserialize_with = "lenient_string")]
  pub document: String,
  #[serde(rename = "inscripcion_aprobada", deserialize_with = "lenient_string")]
  pub approval: String,
}

/// A row of the cycle report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CycleStatus {
  #[serde(rename = "documento_estudiante", deserialize_with = "lenient_string")]
  pub document:    String,
  #[serde(rename = "estado_en_ciclo", deserialize_with = "lenient_option")]
  pub cycle_state: Option<String>,
  #[serde(rename = "grupo", deserialize_with = "lenient_option")]
  pub group:       Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedRow {
  #[serde(rename = "documento_numero")]
  pub document:    String,
  #[serde(rename = "inscripcion_aprobada")]
  pub approval:    String,
  #[serde(rename = "estado_en_ciclo")]
  pub cycle_state: String,
  #[serde(rename = "grupo")]
  pub group:       String,
}

/// Render a group as reported by spreadsheets: integral numbers lose their
/// fraction (`"3.0"` → `"3"`), other numbers are rounded half to even, and a
/// missing or blank group becomes [`ACTIVATE`]. Non-numeric text is kept.
pub fn format_group(raw: Option<&str>) -> String {
  let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
    return ACTIVATE.to_owned();
  };
  match s.parse::<f64>() {
    Ok(f) if f.is_finite() => (f.round_ties_even() as i64).to_string(),
    _ => s.to_owned(),
  }
}

/// Left-join `registrations` with `cycles` on the normalised document.
pub fn combine<R, C>(registrations: R, cycles: C) -> Vec<CombinedRow>
where
  R: IntoIterator<Item = RegistrationStatus>,
  C: IntoIterator<Item = CycleStatus>,
{
  let mut by_document: HashMap<String, Vec<CycleStatus>> = HashMap::new();
  for cycle in cycles {
    let key = normalize_identity(&cycle.document);
    if !key.is_empty() {
      by_document.entry(key).or_default().push(cycle);
    }
  }

  let mut out = Vec::new();
  for reg in registrations {
    let key = normalize_identity(&reg.document);
    let row = |cycle_state: Option<&str>, group: Option<&str>| CombinedRow {
      document:    reg.document.clone(),
      approval:    reg.approval.clone(),
      cycle_state: cycle_state.unwrap_or(ACTIVATE).to_owned(),
      group:       format_group(group),
    };
    match by_document.get(&key) {
      Some(matches) => out.extend(
        matches
          .iter()
          .map(|c| row(c.cycle_state.as_deref(), c.group.as_deref())),
      ),
      None => out.push(row(None, None)),
    }
  }
  out
}
