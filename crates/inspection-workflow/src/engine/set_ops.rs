// set_ops.rs
//! Operaciones de conjunto: partir un run en dos y agrupar runs
//! equivalentes en uno.
use super::lifecycle::stamp;
use super::OperationContext;
use inspection_domain::{create_history_id, create_run_id, refresh_workspace_completion, HistoryKind, InspectionError,
                        InspectionRun, InspectionState, RunId, StepHistoryEntry, StepOutcome};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use tracing::debug;

/// Separa `quantity` contenedores del run en un run nuevo.
///
/// El run nuevo hereda pasos, historial, estado y paso actual, y se inserta
/// justo despues del original. Devuelve una copia del run nuevo.
pub fn split_inspection_run(state: &mut InspectionState,
                            run_id: &RunId,
                            quantity: i64,
                            ctx: &OperationContext)
                            -> Result<InspectionRun, InspectionError> {
  let run = state.run(run_id)?;
  let count = i64::from(run.container_count);
  if count <= 1 {
    return Err(InspectionError::Validation(format!("run {} tiene un solo contenedor: no se puede partir", run_id)));
  }
  if quantity < 1 || quantity > count - 1 {
    return Err(InspectionError::Validation(format!("cantidad {} fuera de rango [1, {}]", quantity, count - 1)));
  }
  let quantity = quantity as u32;
  let clone = run.split_clone(create_run_id(), quantity, ctx.now);
  let clone_id = clone.id.clone();

  let original = state.run_mut(run_id)?;
  original.container_count -= quantity;
  original.touch(ctx.now);
  state.insert_run_after(run_id, clone);
  debug!(run_id = %run_id, new_run_id = %clone_id, quantity, "run partido");

  refresh_workspace_completion(state, &ctx.performed_by, ctx.now);
  Ok(state.run(&clone_id)?.clone())
}

fn grouped_ids(run: &InspectionRun) -> Vec<String> {
  run.metadata
     .get("groupedRunIds")
     .and_then(|v| v.as_array())
     .map(|ids| ids.iter().filter_map(|id| id.as_str().map(str::to_string)).collect())
     .unwrap_or_default()
}

/// Agrupa runs equivalentes en el primero de `run_ids`.
///
/// Todos deben compartir tipo de contenedor, estado, paso actual y pasos
/// estructuralmente iguales; si no, `Validation` y el estado no cambia. El
/// sobreviviente suma los contenedores y los historiales; los demas se
/// eliminan de la coleccion. Devuelve una copia del sobreviviente.
pub fn group_inspection_runs(state: &mut InspectionState,
                             run_ids: &[RunId],
                             ctx: &OperationContext)
                             -> Result<InspectionRun, InspectionError> {
  if run_ids.len() < 2 {
    return Err(InspectionError::Validation("agrupar requiere al menos dos runs".into()));
  }
  let mut seen = HashSet::new();
  if let Some(dup) = run_ids.iter().find(|id| !seen.insert(*id)) {
    return Err(InspectionError::Validation(format!("run {} repetido en el grupo", dup)));
  }

  let survivor_id = &run_ids[0];
  let survivor = state.run(survivor_id)?;
  let mut absorbed_count: u32 = 0;
  let mut merged_ids = grouped_ids(survivor);
  let mut absorbed_history: Vec<StepHistoryEntry> = Vec::new();
  for id in &run_ids[1..] {
    let other = state.run(id)?;
    if other.container_type != survivor.container_type {
      return Err(InspectionError::Validation(format!("run {}: tipo de contenedor {} distinto de {}",
                                                     id, other.container_type, survivor.container_type)));
    }
    if other.status() != survivor.status() {
      return Err(InspectionError::Validation(format!("run {}: estado {} distinto de {}",
                                                     id,
                                                     other.status(),
                                                     survivor.status())));
    }
    if other.current_step_id != survivor.current_step_id {
      return Err(InspectionError::Validation(format!("run {}: paso actual {} distinto de {}",
                                                     id, other.current_step_id, survivor.current_step_id)));
    }
    if other.steps != survivor.steps {
      return Err(InspectionError::Validation(format!("run {}: datos de pasos distintos", id)));
    }
    absorbed_count = absorbed_count.saturating_add(other.container_count);
    merged_ids.push(id.to_string());
    merged_ids.extend(grouped_ids(other));
    absorbed_history.extend(other.history.iter().cloned());
  }
  let mut unique = HashSet::new();
  merged_ids.retain(|id| unique.insert(id.clone()));

  let synthetic = StepHistoryEntry { id: create_history_id(),
                                     run_id: survivor_id.clone(),
                                     step_id: survivor.current_step_id,
                                     outcome: StepOutcome::Pass,
                                     kind: HistoryKind::Grouped,
                                     recorded_at: ctx.now,
                                     recorded_by: ctx.performed_by.clone(),
                                     payload: json!({
                                       "groupedRunIds": &run_ids[1..],
                                       "containerCount": survivor.container_count.saturating_add(absorbed_count),
                                     }) };

  for id in &run_ids[1..] {
    state.remove_run(id)?;
  }
  let survivor = state.run_mut(survivor_id)?;
  survivor.container_count = survivor.container_count.saturating_add(absorbed_count);
  survivor.metadata.insert("groupedRunIds".into(),
                           JsonValue::Array(merged_ids.into_iter().map(JsonValue::String).collect()));
  survivor.metadata.insert("groupedAt".into(), stamp(ctx.now));
  survivor.metadata.insert("groupedBy".into(), JsonValue::String(ctx.performed_by.clone()));
  survivor.history.push(synthetic);
  survivor.history.extend(absorbed_history);
  survivor.history.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
  survivor.touch(ctx.now);
  debug!(run_id = %survivor_id, absorbed = run_ids.len() - 1, "runs agrupados");

  refresh_workspace_completion(state, &ctx.performed_by, ctx.now);
  Ok(state.run(survivor_id)?.clone())
}
