// Archivo: service.rs
// Propósito: implementar `InspectionService`, la capa que envuelve cada
// mutador puro del motor en un ciclo lectura-normalización-mutación-
// escritura contra el documento del workspace, seguido de auditoría y
// revalidación.
use crate::config::{AuditFailurePolicy, ConcurrencyPolicy, InspectionConfig};
use crate::engine::{self, OperationContext, QrBinding};
use crate::errors::WorkflowError;
use chrono::Utc;
use inspection_domain::{normalize_with_report, InspectionError, InspectionRun, InspectionState, NewRunInput,
                        NormalizationReport, RunId, StateSummary, StepId, StepOutcome};
use inspection_store::{state_digest, ActivityRecord, AuditSink, NoopRevalidator, PersistResult, RevalidationHook,
                       TracingAuditSink, WorkspaceMeta, WorkspaceRepository, INSPECTION_MODULE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tipos de actividad que el servicio envia al sink de auditoria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
  InspectionRunsCreated,
  InspectionStepRecorded,
  InspectionRunBoundToQr,
  InspectionRunHeld,
  InspectionRunReleased,
  InspectionRunCanceled,
  InspectionRunSplit,
  InspectionRunsGrouped,
}

impl ActivityType {
  pub fn as_str(self) -> &'static str {
    match self {
      ActivityType::InspectionRunsCreated => "inspection_runs_created",
      ActivityType::InspectionStepRecorded => "inspection_step_recorded",
      ActivityType::InspectionRunBoundToQr => "inspection_run_bound_to_qr",
      ActivityType::InspectionRunHeld => "inspection_run_held",
      ActivityType::InspectionRunReleased => "inspection_run_released",
      ActivityType::InspectionRunCanceled => "inspection_run_canceled",
      ActivityType::InspectionRunSplit => "inspection_run_split",
      ActivityType::InspectionRunsGrouped => "inspection_runs_grouped",
    }
  }
}

impl fmt::Display for ActivityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Resultado estructurado `{success, data | error}` para capas de API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult<T> {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<T>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_kind: Option<String>,
}

/// Traduce el resultado de una operacion del servicio a `ActionResult`.
pub fn into_action_result<T>(result: Result<T, WorkflowError>) -> ActionResult<T> {
  match result {
    Ok(data) => ActionResult { success: true, data: Some(data), error: None, error_kind: None },
    Err(e) => ActionResult { success: false,
                             data: None,
                             error: Some(e.to_string()),
                             error_kind: Some(e.kind().to_string()) },
  }
}

/// Servicio de alto nivel sobre el estado de inspeccion de los workspaces.
///
/// Cada operacion publica lee el documento, lo normaliza, aplica un mutador
/// puro del motor y escribe el documento completo. Los rechazos del motor
/// suben antes de cualquier escritura.
pub struct InspectionService<R>
  where R: WorkspaceRepository
{
  repo: Arc<R>,
  audit: Arc<dyn AuditSink>,
  revalidator: Arc<dyn RevalidationHook>,
  config: InspectionConfig,
}

impl<R> InspectionService<R> where R: WorkspaceRepository
{
  /// Crea el servicio con auditoria por `tracing` y sin revalidacion.
  pub fn new(repo: Arc<R>, config: InspectionConfig) -> Self {
    Self { repo,
           audit: Arc::new(TracingAuditSink),
           revalidator: Arc::new(NoopRevalidator),
           config }
  }

  pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
    self.audit = audit;
    self
  }

  pub fn with_revalidator(mut self, revalidator: Arc<dyn RevalidationHook>) -> Self {
    self.revalidator = revalidator;
    self
  }

  pub fn config(&self) -> &InspectionConfig {
    &self.config
  }

  pub fn repository(&self) -> &Arc<R> {
    &self.repo
  }

  /// Crea el workspace si no existe.
  pub fn ensure_workspace(&self, workspace_id: &str) -> Result<WorkspaceMeta, WorkflowError> {
    if self.repo.workspace_exists(workspace_id)? {
      return Ok(self.repo.get_workspace_meta(workspace_id)?);
    }
    Ok(self.repo.create_workspace(workspace_id)?)
  }

  /// Estado normalizado del workspace, sin escribir las reparaciones.
  pub fn load_state(&self, workspace_id: &str) -> Result<InspectionState, WorkflowError> {
    Ok(self.load_state_with_report(workspace_id)?.0)
  }

  pub fn load_state_with_report(&self,
                                workspace_id: &str)
                                -> Result<(InspectionState, NormalizationReport), WorkflowError> {
    let snapshot = self.repo.load_module(workspace_id, INSPECTION_MODULE)?;
    Ok(normalize_with_report(&snapshot.state))
  }

  pub fn summary(&self, workspace_id: &str) -> Result<StateSummary, WorkflowError> {
    Ok(self.load_state(workspace_id)?.summary())
  }

  pub fn create_inspection_runs(&self,
                                workspace_id: &str,
                                inputs: &[NewRunInput],
                                performed_by: &str)
                                -> Result<Vec<InspectionRun>, WorkflowError> {
    self.mutate(workspace_id, performed_by, ActivityType::InspectionRunsCreated, |state, ctx| {
          let created = engine::create_inspection_runs(state, inputs, ctx)?;
          let ids: Vec<&RunId> = created.iter().map(|r| &r.id).collect();
          let meta = json!({ "count": created.len(), "runIds": ids });
          Ok((created, meta))
        })
  }

  pub fn record_step(&self,
                     workspace_id: &str,
                     run_id: &RunId,
                     step_id: StepId,
                     payload: &JsonValue,
                     outcome: StepOutcome,
                     performed_by: &str)
                     -> Result<InspectionRun, WorkflowError> {
    self.mutate(workspace_id, performed_by, ActivityType::InspectionStepRecorded, |state, ctx| {
          let run = engine::record_step(state, run_id, step_id, payload, outcome, ctx)?;
          let meta = json!({
            "runId": run_id,
            "stepId": step_id,
            "outcome": outcome,
            "status": run.status(),
            "currentStepId": run.current_step_id,
          });
          Ok((run, meta))
        })
  }

  pub fn bind_run_to_qr(&self,
                        workspace_id: &str,
                        run_id: &RunId,
                        qr: &QrBinding,
                        performed_by: &str)
                        -> Result<InspectionRun, WorkflowError> {
    self.mutate(workspace_id, performed_by, ActivityType::InspectionRunBoundToQr, |state, ctx| {
          let run = engine::bind_run_to_qr(state, run_id, qr, ctx)?;
          let meta = json!({ "runId": run_id, "qrCodeId": qr.qr_code_id, "shortCode": qr.short_code });
          Ok((run, meta))
        })
  }

  pub fn hold_inspection_run(&self,
                             workspace_id: &str,
                             run_id: &RunId,
                             reason: Option<&str>,
                             performed_by: &str)
                             -> Result<InspectionRun, WorkflowError> {
    self.mutate(workspace_id, performed_by, ActivityType::InspectionRunHeld, |state, ctx| {
          let run = engine::hold_inspection_run(state, run_id, reason, ctx)?;
          Ok((run, json!({ "runId": run_id, "reason": reason })))
        })
  }

  pub fn release_inspection_hold(&self,
                                 workspace_id: &str,
                                 run_id: &RunId,
                                 performed_by: &str)
                                 -> Result<InspectionRun, WorkflowError> {
    self.mutate(workspace_id, performed_by, ActivityType::InspectionRunReleased, |state, ctx| {
          let run = engine::release_inspection_hold(state, run_id, ctx)?;
          Ok((run, json!({ "runId": run_id })))
        })
  }

  pub fn cancel_inspection_run(&self,
                               workspace_id: &str,
                               run_id: &RunId,
                               reason: &str,
                               performed_by: &str)
                               -> Result<InspectionRun, WorkflowError> {
    self.mutate(workspace_id, performed_by, ActivityType::InspectionRunCanceled, |state, ctx| {
          let run = engine::cancel_inspection_run(state, run_id, reason, ctx)?;
          Ok((run, json!({ "runId": run_id, "reason": reason.trim() })))
        })
  }

  pub fn split_inspection_run(&self,
                              workspace_id: &str,
                              run_id: &RunId,
                              quantity: i64,
                              performed_by: &str)
                              -> Result<InspectionRun, WorkflowError> {
    self.mutate(workspace_id, performed_by, ActivityType::InspectionRunSplit, |state, ctx| {
          let run = engine::split_inspection_run(state, run_id, quantity, ctx)?;
          Ok((run.clone(), json!({ "runId": run_id, "newRunId": run.id, "quantity": quantity })))
        })
  }

  pub fn group_inspection_runs(&self,
                               workspace_id: &str,
                               run_ids: &[RunId],
                               performed_by: &str)
                               -> Result<InspectionRun, WorkflowError> {
    self.mutate(workspace_id, performed_by, ActivityType::InspectionRunsGrouped, |state, ctx| {
          let run = engine::group_inspection_runs(state, run_ids, ctx)?;
          let meta = json!({ "survivorRunId": run.id, "runIds": run_ids, "containerCount": run.container_count });
          Ok((run, meta))
        })
  }

  /// Ciclo lectura-modificacion-escritura.
  ///
  /// Con `Optimistic` la escritura exige la version leida; ante un conflicto
  /// se relee y se vuelve a aplicar `op` hasta `conflict_retries` veces. Con
  /// `LastWriteWins` se escribe sin comparar. Tras escribir se audita y se
  /// revalida una vez.
  fn mutate<T, F>(&self,
                  workspace_id: &str,
                  performed_by: &str,
                  activity: ActivityType,
                  mut op: F)
                  -> Result<T, WorkflowError>
    where F: FnMut(&mut InspectionState, &OperationContext) -> Result<(T, JsonValue), InspectionError>
  {
    let mut attempt: u32 = 0;
    loop {
      let snapshot = self.repo.load_module(workspace_id, INSPECTION_MODULE)?;
      let (mut state, report) = normalize_with_report(&snapshot.state);
      if !report.is_clean() {
        debug!(workspace_id, repairs = report.repairs.len(), "estado reparado al cargar");
      }
      let ctx = OperationContext::at(performed_by, Utc::now());
      let (value, metadata) = op(&mut state, &ctx)?;

      let document = state.to_json()?;
      let expected = match self.config.concurrency {
        ConcurrencyPolicy::Optimistic => Some(snapshot.version),
        ConcurrencyPolicy::LastWriteWins => None,
      };
      match self.repo
                .save_module(workspace_id, INSPECTION_MODULE, &document, performed_by, ctx.now, expected)?
      {
        PersistResult::Ok { new_version } => {
          debug!(workspace_id, %activity, new_version, "estado de inspección guardado");
          self.log_activity(workspace_id, performed_by, activity, metadata, &document, new_version)?;
          self.revalidate(workspace_id);
          return Ok(value);
        }
        PersistResult::Conflict if attempt < self.config.conflict_retries => {
          attempt += 1;
          warn!(workspace_id, %activity, attempt, "conflicto de versión, reintentando sobre lectura fresca");
        }
        PersistResult::Conflict => {
          return Err(WorkflowError::Conflict(format!("workspace {} modificado durante {} (versión leída {})",
                                                     workspace_id, activity, snapshot.version)));
        }
      }
    }
  }

  fn log_activity(&self,
                  workspace_id: &str,
                  performed_by: &str,
                  activity: ActivityType,
                  metadata: JsonValue,
                  document: &JsonValue,
                  version: i64)
                  -> Result<(), WorkflowError> {
    let mut metadata = match metadata {
      JsonValue::Object(map) => map,
      other => {
        let mut map = serde_json::Map::new();
        map.insert("details".into(), other);
        map
      }
    };
    metadata.insert("stateDigest".into(), JsonValue::String(state_digest(document)));
    metadata.insert("version".into(), json!(version));
    let record = ActivityRecord { workspace_id: workspace_id.to_string(),
                                  activity_type: activity.as_str().to_string(),
                                  performed_by: performed_by.to_string(),
                                  module: INSPECTION_MODULE.to_string(),
                                  metadata: JsonValue::Object(metadata),
                                  recorded_at: Utc::now() };
    match self.audit.log_activity(&record) {
      Ok(()) => Ok(()),
      Err(e) => match self.config.audit_failure {
        AuditFailurePolicy::Propagate => Err(WorkflowError::Audit(e.to_string())),
        AuditFailurePolicy::LogAndContinue => {
          warn!(workspace_id, %activity, error = %e, "fallo de auditoría ignorado");
          Ok(())
        }
      },
    }
  }

  fn revalidate(&self, workspace_id: &str) {
    let path = self.config.revalidate_path_for(workspace_id);
    if let Err(e) = self.revalidator.revalidate(&path) {
      warn!(workspace_id, path = %path, error = %e, "revalidación fallida");
    }
  }
}
