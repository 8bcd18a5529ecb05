//! Mutadores puros sobre `InspectionState`.
//!
//! Cada operacion valida todo antes de modificar el estado: si devuelve
//! `Err`, el estado queda intacto. Al terminar con exito la operacion ya
//! actualizo `updatedAt` de los runs tocados y recalculo la completitud del
//! workspace.
pub mod lifecycle;
pub mod set_ops;

use chrono::{DateTime, Utc};

pub use lifecycle::*;
pub use set_ops::*;

/// Quien ejecuta la operacion y el instante que se estampa en los runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
  pub performed_by: String,
  pub now: DateTime<Utc>,
}

impl OperationContext {
  pub fn new(performed_by: impl Into<String>) -> Self {
    Self::at(performed_by, Utc::now())
  }

  pub fn at(performed_by: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self { performed_by: performed_by.into(), now }
  }
}
