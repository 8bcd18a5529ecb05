// lifecycle.rs
//! Operaciones de ciclo de vida sobre un run: creacion, registro de pasos,
//! vinculo con QR, hold/release y cancelacion.
use super::OperationContext;
use chrono::{DateTime, Utc};
use inspection_domain::{create_history_id, create_run_id, refresh_workspace_completion, validate_step_payload,
                        HistoryKind, InspectionError, InspectionRun, InspectionState, NewRunInput, RunId, RunStatus,
                        ScanQrPayload, StepHistoryEntry, StepId, StepOutcome, StepPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

/// Estado y paso actual resultantes de registrar un paso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTransition {
  pub status: RunStatus,
  pub current_step_id: StepId,
}

/// Datos de un QR escaneado para `bind_run_to_qr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrBinding {
  pub qr_value: String,
  #[serde(default)]
  pub qr_code_id: Option<String>,
  #[serde(default)]
  pub short_code: Option<String>,
}

pub(crate) fn stamp(now: DateTime<Utc>) -> JsonValue {
  JsonValue::String(now.to_rfc3339())
}

/// Politica de estado tras registrar `step_id` con `outcome`.
///
/// - HOLD: `hold`, el paso no avanza.
/// - FAIL en paso gate: `needs_reverify`, el paso no avanza.
/// - PASS en `final_review`: `completed`, el paso no avanza.
/// - PASS en cualquier otro paso: `active` y avanza al siguiente.
///
/// FAIL en un paso sin checklist es un error de validacion.
pub fn compute_run_status_after_step(step_id: StepId, outcome: StepOutcome) -> Result<StepTransition, InspectionError> {
  let transition = match outcome {
    StepOutcome::Hold => StepTransition { status: RunStatus::Hold, current_step_id: step_id },
    StepOutcome::Fail if step_id.is_gate() => StepTransition { status: RunStatus::NeedsReverify,
                                                               current_step_id: step_id },
    StepOutcome::Fail => {
      return Err(InspectionError::Validation(format!("{}: FAIL solo aplica a pasos con checklist", step_id)));
    }
    StepOutcome::Pass => match step_id.next() {
      Some(next) => StepTransition { status: RunStatus::Active, current_step_id: next },
      None => StepTransition { status: RunStatus::Completed, current_step_id: step_id },
    },
  };
  Ok(transition)
}

/// Verifica que `step_id` sea el paso que el run espera.
///
/// Falla con `IllegalTransition` si el run es terminal, si `step_id` no es
/// `currentStepId` o si ya hay datos de un paso posterior (envio repetido o
/// desfasado).
pub fn ensure_sequential(run: &InspectionRun, step_id: StepId) -> Result<(), InspectionError> {
  if run.is_terminal() {
    return Err(InspectionError::IllegalTransition(format!("run {} está {}: no admite más pasos",
                                                          run.id,
                                                          run.status())));
  }
  if step_id != run.current_step_id {
    return Err(InspectionError::IllegalTransition(format!("run {} espera {}, se recibió {}",
                                                          run.id, run.current_step_id, step_id)));
  }
  let later = run.steps.steps_after(step_id);
  if let Some(first) = later.first() {
    return Err(InspectionError::IllegalTransition(format!("run {} ya tiene datos de {} posteriores a {}",
                                                          run.id, first, step_id)));
  }
  Ok(())
}

/// Crea un run por cada entrada, en orden, al final de `runOrder`.
///
/// No deduplica: dos llamadas con las mismas entradas crean el doble de
/// runs.
pub fn create_inspection_runs(state: &mut InspectionState,
                              inputs: &[NewRunInput],
                              ctx: &OperationContext)
                              -> Result<Vec<InspectionRun>, InspectionError> {
  if inputs.is_empty() {
    return Err(InspectionError::Validation("se requiere al menos un run".into()));
  }
  let mut created = Vec::with_capacity(inputs.len());
  for input in inputs {
    let run = InspectionRun::new(create_run_id(), input, ctx.now);
    created.push(run.clone());
    state.push_run(run);
  }
  debug!(count = created.len(), performed_by = %ctx.performed_by, "runs de inspección creados");
  refresh_workspace_completion(state, &ctx.performed_by, ctx.now);
  Ok(created)
}

/// Registra el paso `step_id` de un run con el payload no confiable
/// `candidate`. Devuelve una copia del run actualizado.
pub fn record_step(state: &mut InspectionState,
                   run_id: &RunId,
                   step_id: StepId,
                   candidate: &JsonValue,
                   outcome: StepOutcome,
                   ctx: &OperationContext)
                   -> Result<InspectionRun, InspectionError> {
  ensure_sequential(state.run(run_id)?, step_id)?;
  let payload = validate_step_payload(step_id, candidate)?;
  if let Some(gate) = payload.gate_outcome() {
    if outcome != StepOutcome::Hold && gate.as_step_outcome() != outcome {
      return Err(InspectionError::Validation(format!("{}: el resultado {} no coincide con el checklist ({})",
                                                     step_id, outcome, gate)));
    }
  }
  let transition = compute_run_status_after_step(step_id, outcome)?;

  let entry = StepHistoryEntry { id: create_history_id(),
                                 run_id: run_id.clone(),
                                 step_id,
                                 outcome,
                                 kind: HistoryKind::Step,
                                 recorded_at: ctx.now,
                                 recorded_by: ctx.performed_by.clone(),
                                 payload: payload.redacted() };
  let run = state.run_mut(run_id)?;
  if let StepPayload::ScanQr(qr) = &payload {
    run.qr_value = Some(qr.qr_value.trim().to_string());
    run.qr_code_id = qr.qr_code_id.clone();
    run.short_code = qr.short_code.clone();
  }
  run.steps.insert(payload);
  run.history.push(entry);
  run.current_step_id = transition.current_step_id;
  run.touch(ctx.now);
  let previous = state.transition_status(run_id, transition.status)?;
  debug!(run_id = %run_id, step = %step_id, %outcome, from = %previous, to = %transition.status, "paso registrado");

  refresh_workspace_completion(state, &ctx.performed_by, ctx.now);
  Ok(state.run(run_id)?.clone())
}

/// Vincula un QR al run y lo usa como envio de `scan_qr`.
///
/// Si el run aun esperaba `scan_qr`, avanza a `inspection_info` y queda
/// `active` como con un PASS. Si ya estaba mas adelante solo se
/// reemplazan los datos de QR; paso y estado se conservan.
pub fn bind_run_to_qr(state: &mut InspectionState,
                      run_id: &RunId,
                      qr: &QrBinding,
                      ctx: &OperationContext)
                      -> Result<InspectionRun, InspectionError> {
  let run = state.run(run_id)?;
  if run.is_terminal() {
    return Err(InspectionError::IllegalTransition(format!("run {} está {}: no admite vincular QR",
                                                          run.id,
                                                          run.status())));
  }
  let awaiting_scan = run.current_step_id == StepId::ScanQr;

  let qr_value = qr.qr_value.trim().to_string();
  let candidate = serde_json::to_value(ScanQrPayload { qr_value: qr_value.clone(),
                                                       qr_validated: true,
                                                       validated_at: ctx.now,
                                                       qr_code_id: qr.qr_code_id.clone(),
                                                       short_code: qr.short_code.clone() })?;
  let payload = validate_step_payload(StepId::ScanQr, &candidate)?;
  let transition = if awaiting_scan {
    Some(compute_run_status_after_step(StepId::ScanQr, StepOutcome::Pass)?)
  } else {
    None
  };

  let entry = StepHistoryEntry { id: create_history_id(),
                                 run_id: run_id.clone(),
                                 step_id: StepId::ScanQr,
                                 outcome: StepOutcome::Pass,
                                 kind: HistoryKind::QrBound,
                                 recorded_at: ctx.now,
                                 recorded_by: ctx.performed_by.clone(),
                                 payload: payload.redacted() };
  let run = state.run_mut(run_id)?;
  run.qr_value = Some(qr_value);
  run.qr_code_id = qr.qr_code_id.clone();
  run.short_code = qr.short_code.clone();
  run.steps.insert(payload);
  run.history.push(entry);
  if let Some(t) = transition {
    run.current_step_id = t.current_step_id;
  }
  run.touch(ctx.now);
  if let Some(t) = transition {
    state.transition_status(run_id, t.status)?;
  }
  debug!(run_id = %run_id, advanced = awaiting_scan, "QR vinculado al run");

  refresh_workspace_completion(state, &ctx.performed_by, ctx.now);
  Ok(state.run(run_id)?.clone())
}

/// Pone el run en `hold`. Un run ya en hold vuelve a estampar motivo y
/// fecha.
pub fn hold_inspection_run(state: &mut InspectionState,
                           run_id: &RunId,
                           reason: Option<&str>,
                           ctx: &OperationContext)
                           -> Result<InspectionRun, InspectionError> {
  let run = state.run(run_id)?;
  if run.is_terminal() {
    return Err(InspectionError::IllegalTransition(format!("run {} está {}: no se puede poner en hold",
                                                          run.id,
                                                          run.status())));
  }
  let reason = reason.map(str::trim)
                     .filter(|r| !r.is_empty())
                     .map(|r| JsonValue::String(r.to_string()))
                     .unwrap_or(JsonValue::Null);
  let run = state.run_mut(run_id)?;
  run.metadata.insert("holdReason".into(), reason);
  run.metadata.insert("holdSetAt".into(), stamp(ctx.now));
  run.metadata.insert("holdSetBy".into(), JsonValue::String(ctx.performed_by.clone()));
  run.touch(ctx.now);
  state.transition_status(run_id, RunStatus::Hold)?;
  debug!(run_id = %run_id, "run en hold");

  refresh_workspace_completion(state, &ctx.performed_by, ctx.now);
  Ok(state.run(run_id)?.clone())
}

/// Libera un run en `hold` de vuelta a `active`. Sobre un run que no esta
/// en hold no hace nada.
pub fn release_inspection_hold(state: &mut InspectionState,
                               run_id: &RunId,
                               ctx: &OperationContext)
                               -> Result<InspectionRun, InspectionError> {
  let run = state.run(run_id)?;
  if run.status() != RunStatus::Hold {
    return Ok(run.clone());
  }
  let run = state.run_mut(run_id)?;
  run.metadata.insert("holdReleasedAt".into(), stamp(ctx.now));
  run.metadata.insert("holdReleasedBy".into(), JsonValue::String(ctx.performed_by.clone()));
  run.touch(ctx.now);
  state.transition_status(run_id, RunStatus::Active)?;
  debug!(run_id = %run_id, "hold liberado");

  refresh_workspace_completion(state, &ctx.performed_by, ctx.now);
  Ok(state.run(run_id)?.clone())
}

/// Cancela el run con un motivo obligatorio, desde cualquier estado.
///
/// Un run ya cancelado con motivo no cambia: se conservan motivo, fecha,
/// autor y estado de origen de la primera cancelacion.
pub fn cancel_inspection_run(state: &mut InspectionState,
                             run_id: &RunId,
                             reason: &str,
                             ctx: &OperationContext)
                             -> Result<InspectionRun, InspectionError> {
  let current = state.run(run_id)?;
  let previous = current.status();
  let reason = reason.trim();
  if reason.is_empty() {
    return Err(InspectionError::Validation("el motivo de cancelación es obligatorio".into()));
  }
  if previous == RunStatus::Canceled && current.cancel_reason().is_some() {
    return Ok(current.clone());
  }
  let run = state.run_mut(run_id)?;
  run.metadata.insert("cancelReason".into(), JsonValue::String(reason.to_string()));
  run.metadata.insert("canceledAt".into(), stamp(ctx.now));
  run.metadata.insert("canceledBy".into(), JsonValue::String(ctx.performed_by.clone()));
  if previous != RunStatus::Canceled || !run.metadata.contains_key("canceledFromStatus") {
    run.metadata.insert("canceledFromStatus".into(), JsonValue::String(previous.as_str().to_string()));
  }
  run.touch(ctx.now);
  state.transition_status(run_id, RunStatus::Canceled)?;
  debug!(run_id = %run_id, from = %previous, "run cancelado");

  refresh_workspace_completion(state, &ctx.performed_by, ctx.now);
  Ok(state.run(run_id)?.clone())
}
