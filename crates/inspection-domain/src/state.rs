// state.rs
use crate::totals::{apply_status_transition, Totals};
use crate::{InspectionError, InspectionRun, RunId, RunStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};

/// Contenedor de estado de inspeccion de un workspace.
///
/// Su forma JSON (`runsById`, `runOrder`, `totals`, `completedAt`,
/// `completedBy`) es el esquema persistido; para leer documentos se usa
/// `normalize_inspection_state`, nunca un `Deserialize` directo.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionState {
  pub(crate) runs_by_id: BTreeMap<RunId, InspectionRun>,
  pub(crate) run_order: Vec<RunId>,
  pub(crate) totals: Totals,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub(crate) completed_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub(crate) completed_by: Option<String>,
}

/// Conteos por estado y por paso actual, para tableros y CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
  pub runs: usize,
  pub containers: u64,
  pub by_status: BTreeMap<String, usize>,
  pub by_step: BTreeMap<String, usize>,
  pub totals: Totals,
  pub workspace_completed: bool,
}

impl InspectionState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Lee un documento persistido (posiblemente antiguo) y lo repara.
  pub fn from_json(raw: &JsonValue) -> Self {
    crate::normalize::normalize_inspection_state(raw)
  }

  pub fn to_json(&self) -> Result<JsonValue, InspectionError> {
    Ok(serde_json::to_value(self)?)
  }

  pub fn len(&self) -> usize {
    self.runs_by_id.len()
  }

  pub fn is_empty(&self) -> bool {
    self.runs_by_id.is_empty()
  }

  pub fn contains(&self, run_id: &RunId) -> bool {
    self.runs_by_id.contains_key(run_id)
  }

  pub fn run(&self, run_id: &RunId) -> Result<&InspectionRun, InspectionError> {
    self.runs_by_id
        .get(run_id)
        .ok_or_else(|| InspectionError::NotFound(format!("run {}", run_id)))
  }

  pub fn run_mut(&mut self, run_id: &RunId) -> Result<&mut InspectionRun, InspectionError> {
    self.runs_by_id
        .get_mut(run_id)
        .ok_or_else(|| InspectionError::NotFound(format!("run {}", run_id)))
  }

  /// Runs en orden de `runOrder`.
  pub fn runs(&self) -> impl Iterator<Item = &InspectionRun> {
    self.run_order.iter().filter_map(move |id| self.runs_by_id.get(id))
  }

  pub fn run_order(&self) -> &[RunId] {
    &self.run_order
  }

  pub fn totals(&self) -> Totals {
    self.totals
  }

  pub fn completed_at(&self) -> Option<DateTime<Utc>> {
    self.completed_at
  }

  pub fn completed_by(&self) -> Option<&str> {
    self.completed_by.as_deref()
  }

  /// Cambia el estado de un run pasando por el agregador de totales.
  /// Devuelve el estado previo.
  pub fn transition_status(&mut self, run_id: &RunId, next: RunStatus) -> Result<RunStatus, InspectionError> {
    let run = self.runs_by_id
                  .get_mut(run_id)
                  .ok_or_else(|| InspectionError::NotFound(format!("run {}", run_id)))?;
    let previous = run.status;
    apply_status_transition(&mut self.totals, run, previous, next);
    Ok(previous)
  }

  /// Agrega un run al final. Cuenta en `runsCreated` y, segun su estado, en
  /// los contadores de hold/completed.
  pub fn push_run(&mut self, run: InspectionRun) {
    self.totals.runs_created += 1;
    self.totals.count_in(run.status);
    self.run_order.push(run.id.clone());
    self.runs_by_id.insert(run.id.clone(), run);
  }

  /// Igual que `push_run` pero inserta justo despues de `anchor` en
  /// `runOrder` (al final si `anchor` no esta).
  pub fn insert_run_after(&mut self, anchor: &RunId, run: InspectionRun) {
    self.totals.runs_created += 1;
    self.totals.count_in(run.status);
    let pos = self.run_order
                  .iter()
                  .position(|id| id == anchor)
                  .map(|p| p + 1)
                  .unwrap_or(self.run_order.len());
    self.run_order.insert(pos, run.id.clone());
    self.runs_by_id.insert(run.id.clone(), run);
  }

  /// Quita un run de la coleccion. Descuenta hold/completed segun su estado
  /// previo; `runsCreated` no cambia.
  pub fn remove_run(&mut self, run_id: &RunId) -> Result<InspectionRun, InspectionError> {
    let run = self.runs_by_id
                  .remove(run_id)
                  .ok_or_else(|| InspectionError::NotFound(format!("run {}", run_id)))?;
    self.totals.count_out(run.status);
    self.run_order.retain(|id| id != run_id);
    Ok(run)
  }

  /// Re-deriva `runOrder` desde `runsById`: conserva el orden existente,
  /// quita ids colgantes y duplicados, y agrega al final los runs sin
  /// posicion (por `createdAt`, luego id).
  pub fn ensure_run_order(&mut self) {
    let mut seen = HashSet::new();
    let runs = &self.runs_by_id;
    self.run_order.retain(|id| runs.contains_key(id) && seen.insert(id.clone()));
    let mut missing: Vec<&InspectionRun> = self.runs_by_id.values().filter(|r| !seen.contains(&r.id)).collect();
    missing.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    let missing: Vec<RunId> = missing.into_iter().map(|r| r.id.clone()).collect();
    self.run_order.extend(missing);
  }

  pub fn summary(&self) -> StateSummary {
    let mut by_status = BTreeMap::new();
    let mut by_step = BTreeMap::new();
    let mut containers = 0u64;
    for run in self.runs_by_id.values() {
      *by_status.entry(run.status.as_str().to_string()).or_insert(0) += 1;
      *by_step.entry(run.current_step_id.as_str().to_string()).or_insert(0) += 1;
      containers += u64::from(run.container_count);
    }
    StateSummary { runs: self.runs_by_id.len(),
                   containers,
                   by_status,
                   by_step,
                   totals: self.totals,
                   workspace_completed: self.completed_at.is_some() }
  }

  /// Lista de invariantes violadas; vacia si el estado es consistente.
  pub fn verify_invariants(&self) -> Vec<String> {
    let mut violations = Vec::new();
    let order: HashSet<&RunId> = self.run_order.iter().collect();
    if order.len() != self.run_order.len() {
      violations.push("runOrder contiene duplicados".to_string());
    }
    if order.len() != self.runs_by_id.len() || self.runs_by_id.keys().any(|id| !order.contains(id)) {
      violations.push("runOrder no coincide con las claves de runsById".to_string());
    }
    let completed = self.runs_by_id.values().filter(|r| r.status == RunStatus::Completed).count() as u64;
    let on_hold = self.runs_by_id.values().filter(|r| r.status == RunStatus::Hold).count() as u64;
    if self.totals.runs_completed != completed {
      violations.push(format!("runsCompleted={} pero hay {} runs completados", self.totals.runs_completed, completed));
    }
    if self.totals.runs_on_hold != on_hold {
      violations.push(format!("runsOnHold={} pero hay {} runs en hold", self.totals.runs_on_hold, on_hold));
    }
    for run in self.runs_by_id.values() {
      if run.container_count < 1 {
        violations.push(format!("run {} con containerCount 0", run.id));
      }
      if run.has_future_steps() {
        violations.push(format!("run {} tiene pasos posteriores a {}", run.id, run.current_step_id));
      }
    }
    violations
  }
}
