// normalize.rs
//! Reparacion de documentos de estado persistidos.
//!
//! Acepta JSON arbitrario o de versiones anteriores y siempre produce un
//! `InspectionState` que cumple las invariantes. Cada reparacion aplicada se
//! anota en `NormalizationReport` y se registra con `warn!`.
use crate::run::{RunMetadata, StepHistoryEntry, StepMap};
use crate::totals::Totals;
use crate::{create_history_id, ContainerType, InspectionRun, InspectionState, RunId, RunStatus, StepId, StepPayload};
use chrono::{DateTime, Utc};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashSet;
use tracing::warn;

/// Reparaciones aplicadas al normalizar un documento.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationReport {
  pub repairs: Vec<String>,
}

impl NormalizationReport {
  pub fn is_clean(&self) -> bool {
    self.repairs.is_empty()
  }

  fn note(&mut self, repair: String) {
    warn!(repair = %repair, "normalización de estado de inspección");
    self.repairs.push(repair);
  }
}

/// Repara `raw` y devuelve solo el estado.
pub fn normalize_inspection_state(raw: &JsonValue) -> InspectionState {
  normalize_with_report(raw).0
}

/// Repara `raw` y devuelve el estado junto con las reparaciones aplicadas.
///
/// Los ids de `runOrder` sin run en `runsById` se descartan. Los runs que
/// no figuran en `runOrder` no se descartan: se conservan y se agregan al
/// final del orden (por `createdAt`, luego id).
///
/// `completedAt`/`completedBy` quedan presentes solo si todos los runs son
/// terminales. Un estampado sobrante se limpia y uno faltante se completa
/// con `updatedAt` del documento (o el `updatedAt` mas reciente de los
/// runs) y `completedBy` del documento o `"unknown"`.
pub fn normalize_with_report(raw: &JsonValue) -> (InspectionState, NormalizationReport) {
  let mut report = NormalizationReport::default();
  let mut state = InspectionState::new();

  let doc = match raw {
    JsonValue::Object(obj) => obj,
    JsonValue::Null => return (state, report),
    other => {
      report.note(format!("documento de tipo inesperado ({}), se usa estado vacío", json_kind(other)));
      return (state, report);
    }
  };

  let mut dropped_runs = false;
  for (key, value) in collect_raw_runs(doc, &mut report) {
    match normalize_run(&key, value, &mut report) {
      Some(run) => {
        state.runs_by_id.insert(run.id.clone(), run);
      }
      None => dropped_runs = true,
    }
  }

  if let Some(order) = doc.get("runOrder").and_then(|v| v.as_array()) {
    for id in order {
      match id.as_str() {
        Some(s) => state.run_order.push(RunId::from(s)),
        None => report.note(format!("runOrder: entrada no textual descartada ({})", id)),
      }
    }
  } else if !state.runs_by_id.is_empty() {
    report.note("runOrder ausente, se deriva de runsById".to_string());
  }
  let listed: HashSet<RunId> = state.run_order.iter().cloned().collect();
  for id in listed.iter().filter(|id| !state.runs_by_id.contains_key(*id)) {
    report.note(format!("runOrder: id {} sin run, descartado", id));
  }
  if listed.len() != state.run_order.len() {
    report.note("runOrder: ids duplicados descartados".to_string());
  }
  let unlisted = state.runs_by_id.keys().filter(|id| !listed.contains(*id)).count();
  if unlisted > 0 && doc.get("runOrder").is_some() {
    report.note(format!("runOrder: {} runs sin posición agregados al final", unlisted));
  }
  state.ensure_run_order();

  state.totals = normalize_totals(doc.get("totals"), &state, dropped_runs, &mut report);

  state.completed_at = doc.get("completedAt").and_then(parse_ts);
  state.completed_by = doc.get("completedBy").and_then(|v| v.as_str()).map(str::to_string);
  let all_terminal = !state.runs_by_id.is_empty()
                     && state.runs_by_id.values().all(|r| {
                                                  r.status == RunStatus::Completed
                                                  || (r.status == RunStatus::Canceled && r.cancel_reason().is_some())
                                                });
  if state.completed_at.is_some() && !all_terminal {
    report.note("completedAt presente con runs pendientes, se limpia".to_string());
    state.completed_at = None;
    state.completed_by = None;
  }
  if state.completed_at.is_none() {
    state.completed_by = None;
  }
  if all_terminal && state.completed_at.is_none() {
    let stamped = doc.get("updatedAt")
                     .and_then(parse_ts)
                     .or_else(|| state.runs_by_id.values().map(|r| r.updated_at).max());
    report.note("completedAt ausente con todos los runs terminales, se estampa".to_string());
    state.completed_at = stamped;
    state.completed_by = Some(doc.get("completedBy")
                                 .and_then(|v| v.as_str())
                                 .filter(|s| !s.trim().is_empty())
                                 .unwrap_or("unknown")
                                 .to_string());
  }

  (state, report)
}

/// Pares (clave, run crudo) desde `runsById` o, en documentos antiguos,
/// desde un arreglo `runs`.
fn collect_raw_runs<'a>(doc: &'a JsonMap<String, JsonValue>,
                        report: &mut NormalizationReport)
                        -> Vec<(String, &'a JsonValue)> {
  if let Some(map) = doc.get("runsById").and_then(|v| v.as_object()) {
    return map.iter().map(|(k, v)| (k.clone(), v)).collect();
  }
  if let Some(list) = doc.get("runs").and_then(|v| v.as_array()) {
    report.note("formato antiguo: arreglo 'runs' convertido a runsById".to_string());
    let mut out = Vec::new();
    for v in list {
      match v.get("id").and_then(|id| id.as_str()) {
        Some(id) => out.push((id.to_string(), v)),
        None => report.note("run sin id en arreglo 'runs', descartado".to_string()),
      }
    }
    return out;
  }
  Vec::new()
}

fn json_kind(v: &JsonValue) -> &'static str {
  match v {
    JsonValue::Null => "null",
    JsonValue::Bool(_) => "bool",
    JsonValue::Number(_) => "number",
    JsonValue::String(_) => "string",
    JsonValue::Array(_) => "array",
    JsonValue::Object(_) => "object",
  }
}

fn parse_ts(v: &JsonValue) -> Option<DateTime<Utc>> {
  v.as_str()
   .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
   .map(|dt| dt.with_timezone(&Utc))
}

fn opt_text(obj: &JsonMap<String, JsonValue>, key: &str) -> Option<String> {
  obj.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn parse_status(raw: &str) -> Option<RunStatus> {
  match raw.trim() {
    "on_hold" | "onHold" => Some(RunStatus::Hold),
    "cancelled" => Some(RunStatus::Canceled),
    "needsReverify" => Some(RunStatus::NeedsReverify),
    other => other.parse().ok(),
  }
}

fn normalize_run(key: &str, value: &JsonValue, report: &mut NormalizationReport) -> Option<InspectionRun> {
  let Some(obj) = value.as_object() else {
    report.note(format!("run {}: no es un objeto, descartado", key));
    return None;
  };
  let id = RunId::from(key);
  if let Some(inner) = obj.get("id").and_then(|v| v.as_str()) {
    if inner != key {
      report.note(format!("run {}: id interno '{}' difiere de la clave, se usa la clave", key, inner));
    }
  }

  let updated = obj.get("updatedAt").and_then(parse_ts);
  let created = obj.get("createdAt").and_then(parse_ts).or(updated).unwrap_or_default();
  let updated_at = updated.unwrap_or(created);

  let container_type = match obj.get("containerType").and_then(|v| v.as_str()) {
    Some(raw) => raw.parse().unwrap_or_else(|_| {
                                report.note(format!("run {}: containerType '{}' desconocido, se usa 'other'", key, raw));
                                ContainerType::Other
                              }),
    None => {
      report.note(format!("run {}: containerType ausente, se usa 'other'", key));
      ContainerType::Other
    }
  };

  let raw_count = obj.get("containerCount")
                     .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
                     .unwrap_or(1);
  if raw_count < 1 {
    report.note(format!("run {}: containerCount {} elevado a 1", key, raw_count));
  }
  let container_count = raw_count.clamp(1, u32::MAX as i64) as u32;

  let steps = normalize_steps(key, obj.get("steps"), report);

  let current_step_id = match obj.get("currentStepId").and_then(|v| v.as_str()).map(str::parse::<StepId>) {
    Some(Ok(step)) => step,
    other => {
      let derived = steps.keys()
                         .last()
                         .map(|last| last.next().unwrap_or(last))
                         .unwrap_or(StepId::ScanQr);
      if other.is_some() {
        report.note(format!("run {}: currentStepId inválido, se usa {}", key, derived));
      } else {
        report.note(format!("run {}: currentStepId ausente, se usa {}", key, derived));
      }
      derived
    }
  };
  let mut steps = steps;
  for future in steps.steps_after(current_step_id) {
    report.note(format!("run {}: datos de {} posteriores a {} descartados", key, future, current_step_id));
    steps.remove(future);
  }

  let status = match obj.get("status").and_then(|v| v.as_str()) {
    Some(raw) => parse_status(raw).unwrap_or_else(|| {
                                    report.note(format!("run {}: estado '{}' desconocido, se usa active", key, raw));
                                    RunStatus::Active
                                  }),
    None => {
      report.note(format!("run {}: estado ausente, se usa active", key));
      RunStatus::Active
    }
  };

  let history = normalize_history(&id, obj.get("history"), report);
  let metadata: RunMetadata = obj.get("metadata")
                                 .and_then(|v| v.as_object())
                                 .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                                 .unwrap_or_default();

  Some(InspectionRun { id,
                       created_at: created,
                       updated_at,
                       qr_code_id: opt_text(obj, "qrCodeId"),
                       qr_value: opt_text(obj, "qrValue"),
                       short_code: opt_text(obj, "shortCode"),
                       item_key: opt_text(obj, "itemKey"),
                       sku: opt_text(obj, "sku"),
                       material_name: opt_text(obj, "materialName"),
                       container_type,
                       container_count,
                       current_step_id,
                       status,
                       steps,
                       history,
                       metadata })
}

fn normalize_steps(key: &str, raw: Option<&JsonValue>, report: &mut NormalizationReport) -> StepMap {
  let mut steps = StepMap::new();
  let Some(obj) = raw.and_then(|v| v.as_object()) else {
    return steps;
  };
  for (name, value) in obj {
    let step_id = match name.parse::<StepId>() {
      Ok(step_id) => step_id,
      Err(_) => {
        report.note(format!("run {}: paso desconocido '{}' descartado", key, name));
        continue;
      }
    };
    match StepPayload::from_json(step_id, value) {
      Ok(payload) => {
        steps.insert(payload);
      }
      Err(e) => report.note(format!("run {}: payload de {} ilegible, descartado ({})", key, step_id, e)),
    }
  }
  steps
}

fn normalize_history(run_id: &RunId, raw: Option<&JsonValue>, report: &mut NormalizationReport) -> Vec<StepHistoryEntry> {
  let Some(items) = raw.and_then(|v| v.as_array()) else {
    return Vec::new();
  };
  let mut out = Vec::with_capacity(items.len());
  for item in items {
    let Some(obj) = item.as_object() else {
      report.note(format!("run {}: entrada de historial no es objeto, descartada", run_id));
      continue;
    };
    let mut obj = obj.clone();
    obj.entry("id").or_insert_with(|| JsonValue::String(create_history_id()));
    obj.entry("runId").or_insert_with(|| JsonValue::String(run_id.to_string()));
    obj.entry("recordedBy").or_insert_with(|| JsonValue::String("unknown".into()));
    match serde_json::from_value::<StepHistoryEntry>(JsonValue::Object(obj)) {
      Ok(entry) => out.push(entry),
      Err(e) => report.note(format!("run {}: entrada de historial ilegible, descartada ({})", run_id, e)),
    }
  }
  out
}

fn normalize_totals(raw: Option<&JsonValue>,
                    state: &InspectionState,
                    dropped_runs: bool,
                    report: &mut NormalizationReport)
                    -> Totals {
  let runs = state.runs_by_id.len() as u64;
  let completed = state.runs_by_id.values().filter(|r| r.status == RunStatus::Completed).count() as u64;
  let on_hold = state.runs_by_id.values().filter(|r| r.status == RunStatus::Hold).count() as u64;

  let Some(raw) = raw.filter(|t| t.is_object()) else {
    report.note("totals ausentes, se derivan de los runs".to_string());
    return Totals { runs_created: runs, runs_completed: completed, runs_on_hold: on_hold };
  };
  let field = |name: &str| raw.get(name).and_then(|v| v.as_u64());

  let runs_created = match field("runsCreated") {
    Some(c) if c >= runs => c,
    Some(c) => {
      report.note(format!("totals.runsCreated={} menor que {} runs, se ajusta", c, runs));
      runs
    }
    None => {
      report.note("totals.runsCreated ausente, se usa el número de runs".to_string());
      runs
    }
  };
  let (persisted_completed, persisted_hold) = (field("runsCompleted"), field("runsOnHold"));
  if persisted_completed != Some(completed) || persisted_hold != Some(on_hold) {
    report.note(format!("totals desalineados (completed {:?}->{}, hold {:?}->{}), se recalculan",
                        persisted_completed, completed, persisted_hold, on_hold));
  } else if dropped_runs {
    report.note("runs descartados; contadores de estado recalculados".to_string());
  }
  Totals { runs_created, runs_completed: completed, runs_on_hold: on_hold }
}
