// step_id.rs
use crate::InspectionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Los seis pasos del flujo de inspeccion, en su orden fijo.
///
/// El orden de declaracion define `Ord`, de modo que `a < b` equivale a que
/// `a` va antes que `b` en el flujo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
  ScanQr,
  InspectionInfo,
  VerifyPackingLabel,
  VerifyProductLabel,
  LotNumber,
  FinalReview,
}

impl StepId {
  pub const ORDERED: [StepId; 6] = [StepId::ScanQr,
                                    StepId::InspectionInfo,
                                    StepId::VerifyPackingLabel,
                                    StepId::VerifyProductLabel,
                                    StepId::LotNumber,
                                    StepId::FinalReview];

  pub fn index(self) -> usize {
    self as usize
  }

  /// Paso siguiente; `None` despues de `final_review`.
  pub fn next(self) -> Option<StepId> {
    Self::ORDERED.get(self.index() + 1).copied()
  }

  /// Pasos con checklist pass/fail.
  pub fn is_gate(self) -> bool {
    matches!(self, StepId::VerifyPackingLabel | StepId::VerifyProductLabel)
  }

  pub fn is_last(self) -> bool {
    self == StepId::FinalReview
  }

  pub fn as_str(self) -> &'static str {
    match self {
      StepId::ScanQr => "scan_qr",
      StepId::InspectionInfo => "inspection_info",
      StepId::VerifyPackingLabel => "verify_packing_label",
      StepId::VerifyProductLabel => "verify_product_label",
      StepId::LotNumber => "lot_number",
      StepId::FinalReview => "final_review",
    }
  }
}

impl Default for StepId {
  fn default() -> Self {
    StepId::ScanQr
  }
}

impl fmt::Display for StepId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StepId {
  type Err = InspectionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    StepId::ORDERED.iter()
                   .copied()
                   .find(|step| step.as_str() == s.trim())
                   .ok_or_else(|| InspectionError::Validation(format!("Paso desconocido: {}", s)))
  }
}

/// Posicion del paso dentro del flujo (0..=5).
pub fn get_step_index(step_id: StepId) -> usize {
  step_id.index()
}

pub fn get_next_step_id(step_id: StepId) -> Option<StepId> {
  step_id.next()
}

/// Decision asociada a un envio de paso.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepOutcome {
  Pass,
  Fail,
  Hold,
}

impl fmt::Display for StepOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      StepOutcome::Pass => "PASS",
      StepOutcome::Fail => "FAIL",
      StepOutcome::Hold => "HOLD",
    };
    f.write_str(s)
  }
}

impl FromStr for StepOutcome {
  type Err = InspectionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "PASS" => Ok(StepOutcome::Pass),
      "FAIL" => Ok(StepOutcome::Fail),
      "HOLD" => Ok(StepOutcome::Hold),
      other => Err(InspectionError::Validation(format!("Resultado desconocido: {}", other))),
    }
  }
}
