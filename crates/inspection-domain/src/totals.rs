// totals.rs
//! Agregador de totales del workspace.
//!
//! Los contadores se mantienen de forma incremental: toda transicion de
//! estado de un run pasa por `apply_status_transition`. La completitud del
//! workspace, en cambio, se recalcula completa tras cada mutacion.
use crate::{InspectionRun, InspectionState, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
  /// Runs creados en la vida del workspace; no baja con `group`.
  pub runs_created: u64,
  pub runs_completed: u64,
  pub runs_on_hold: u64,
}

impl Totals {
  /// Suma un run que entra a la coleccion con `status`.
  pub(crate) fn count_in(&mut self, status: RunStatus) {
    match status {
      RunStatus::Completed => self.runs_completed += 1,
      RunStatus::Hold => self.runs_on_hold += 1,
      _ => {}
    }
  }

  /// Resta un run que sale de la coleccion con `status` (limitado a 0).
  pub(crate) fn count_out(&mut self, status: RunStatus) {
    match status {
      RunStatus::Completed => self.runs_completed = self.runs_completed.saturating_sub(1),
      RunStatus::Hold => self.runs_on_hold = self.runs_on_hold.saturating_sub(1),
      _ => {}
    }
  }
}

/// Unica via para cambiar `run.status`.
///
/// En cada arista que entra o sale de `completed`/`hold` ajusta el contador
/// correspondiente, sin bajar de 0. No hace nada si `previous == next`.
pub fn apply_status_transition(totals: &mut Totals, run: &mut InspectionRun, previous: RunStatus, next: RunStatus) {
  if previous == next {
    return;
  }
  totals.count_out(previous);
  totals.count_in(next);
  run.status = next;
}

/// Recalcula `completedAt/completedBy` a partir de todos los runs.
///
/// El workspace esta completo si tiene runs y cada uno esta `completed`, o
/// `canceled` con motivo no vacio. Si ya estaba marcado se conserva la marca
/// original.
pub fn refresh_workspace_completion(state: &mut InspectionState, performed_by: &str, now: DateTime<Utc>) {
  let complete = !state.runs_by_id.is_empty()
                 && state.runs_by_id.values().all(|run| match run.status {
                                                RunStatus::Completed => true,
                                                RunStatus::Canceled => run.cancel_reason().is_some(),
                                                _ => false,
                                              });
  if complete {
    if state.completed_at.is_none() {
      info!(runs = state.runs_by_id.len(), performed_by, "inspección del workspace completada");
      state.completed_at = Some(now);
      state.completed_by = Some(performed_by.to_string());
    }
  } else {
    state.completed_at = None;
    state.completed_by = None;
  }
}
