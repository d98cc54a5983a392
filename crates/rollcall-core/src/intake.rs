//! Conversion of raw registration rows into roster records.

use serde::Deserialize;

use crate::record::{RosterRecord, lenient_identity, lenient_string};

/// Value of `inscripcion_aprobada` for approved registrations.
pub const APPROVED: &str = "APROBADO";

/// Programme of interest (upper-cased) → LMS group name.
const PROGRAM_GROUPS: [(&str, &str); 6] = [
  ("INTELIGENCIA ARTIFICIAL", "Inteligencia Artificial"),
  ("ANÁLISIS DE DATOS", "Analisis_datos"),
  ("PROGRAMACIÓN", "Programacion"),
  ("CIBERSEGURIDAD", "Ciberseguridad1"),
  ("ARQUITECTURA EN LA NUBE", "Arquitectura_Nube"),
  ("BLOCKCHAIN", "Blockchain"),
];

/// One row of a registration export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistrationRow {
  #[serde(rename = "documento_numero", deserialize_with = "lenient_identity")]
  pub document:  String,
  #[serde(rename = "nombres", deserialize_with = "lenient_string")]
  pub names:     String,
  #[serde(rename = "apellidos", deserialize_with = "lenient_string")]
  pub surnames:  String,
  #[serde(rename = "telefono_celular", deserialize_with = "lenient_string")]
  pub mobile:    String,
  #[serde(rename = "correo_electronico", deserialize_with = "lenient_string")]
  pub email:     String,
  #[serde(rename = "departamento", deserialize_with = "lenient_string")]
  pub region:    String,
  #[serde(rename = "municipio", deserialize_with = "lenient_string")]
  pub city:      String,
  #[serde(rename = "modalidad_formacion", deserialize_with = "lenient_string")]
  pub mode:      String,
  #[serde(rename = "programa_interes", deserialize_with = "lenient_string")]
  pub program:   String,
  #[serde(rename = "inscripcion_aprobada", deserialize_with = "lenient_string")]
  pub approval:  String,
}

impl RegistrationRow {
  pub fn is_approved(&self) -> bool { self.approval == APPROVED }

  pub fn into_record(self) -> RosterRecord {
    RosterRecord {
      group:         group_for_program(&self.program),
      id_number:     self.document,
      first_name:    self.names,
      last_name:     self.surnames,
      email:         self.email,
      phone:         self.mobile,
      delivery_mode: self.mode,
      region:        self.region,
      city:          Some(self.city).filter(|c| !c.is_empty()),
    }
  }
}

/// LMS group for a programme of interest. Unknown programmes pass through
/// unchanged.
pub fn group_for_program(program: &str) -> String {
  let key = program.trim().to_uppercase();
  PROGRAM_GROUPS
    .iter()
    .find(|(p, _)| *p == key)
    .map(|(_, g)| g.to_string())
    .unwrap_or_else(|| program.to_owned())
}

/// Keep approved rows with a non-empty document and convert them, in order.
pub fn approved_records<I>(rows: I) -> Vec<RosterRecord>
where
  I: IntoIterator<Item = RegistrationRow>,
{
  rows
    .into_iter()
    .filter(|r| r.is_approved() && !r.document.is_empty())
    .map(RegistrationRow::into_record)
    .collect()
}
