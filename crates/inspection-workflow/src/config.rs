use crate::errors::WorkflowError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Como se protege el ciclo lectura-modificacion-escritura frente a
/// escritores concurrentes sobre el mismo workspace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
  /// La escritura compara la version leida; si cambio, `Conflict`.
  #[default]
  Optimistic,
  /// Escritura incondicional: el ultimo en escribir gana y los cambios
  /// concurrentes se pierden.
  LastWriteWins,
}

impl FromStr for ConcurrencyPolicy {
  type Err = WorkflowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "optimistic" => Ok(ConcurrencyPolicy::Optimistic),
      "last_write_wins" | "lww" => Ok(ConcurrencyPolicy::LastWriteWins),
      other => Err(WorkflowError::Config(format!("política de concurrencia desconocida: {}", other))),
    }
  }
}

/// Que hacer si el sink de auditoria falla despues de escribir.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailurePolicy {
  /// El error sube al llamador (la escritura ya quedo aplicada).
  #[default]
  Propagate,
  /// Se registra con `warn!` y la operacion se da por exitosa.
  LogAndContinue,
}

impl FromStr for AuditFailurePolicy {
  type Err = WorkflowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "propagate" => Ok(AuditFailurePolicy::Propagate),
      "log_and_continue" | "log" => Ok(AuditFailurePolicy::LogAndContinue),
      other => Err(WorkflowError::Config(format!("política de auditoría desconocida: {}", other))),
    }
  }
}

pub const DEFAULT_REVALIDATE_PATH: &str = "/workspaces/{workspace_id}/inspection";

/// Configuracion del servicio de inspeccion
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionConfig {
  pub concurrency: ConcurrencyPolicy,
  /// Reintentos tras un conflicto de version, cada uno sobre una lectura
  /// fresca. Solo aplica con `Optimistic`.
  pub conflict_retries: u32,
  pub audit_failure: AuditFailurePolicy,
  /// Plantilla de ruta a revalidar; `{workspace_id}` se sustituye.
  pub revalidate_path: String,
}

impl Default for InspectionConfig {
  fn default() -> Self {
    InspectionConfig { concurrency: ConcurrencyPolicy::Optimistic,
                       conflict_retries: 0,
                       audit_failure: AuditFailurePolicy::Propagate,
                       revalidate_path: DEFAULT_REVALIDATE_PATH.to_string() }
  }
}

impl InspectionConfig {
  /// Lee la configuracion de variables de entorno (cargando `.env` si
  /// existe). Las variables ausentes toman el valor por defecto.
  pub fn from_env() -> Result<Self, WorkflowError> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Igual que `from_env` pero con una fuente de variables inyectada.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkflowError>
    where F: Fn(&str) -> Option<String>
  {
    let mut config = InspectionConfig::default();
    if let Some(raw) = lookup("INSPECTION_CONCURRENCY") {
      config.concurrency = raw.parse()?;
    }
    if let Some(raw) = lookup("INSPECTION_CONFLICT_RETRIES") {
      config.conflict_retries =
        raw.trim()
           .parse()
           .map_err(|_| WorkflowError::Config(format!("INSPECTION_CONFLICT_RETRIES inválido: {}", raw)))?;
    }
    if let Some(raw) = lookup("INSPECTION_AUDIT_FAILURE") {
      config.audit_failure = raw.parse()?;
    }
    if let Some(raw) = lookup("INSPECTION_REVALIDATE_PATH") {
      if raw.trim().is_empty() {
        return Err(WorkflowError::Config("INSPECTION_REVALIDATE_PATH vacío".into()));
      }
      config.revalidate_path = raw;
    }
    Ok(config)
  }

  /// Ruta concreta a revalidar para `workspace_id`.
  pub fn revalidate_path_for(&self, workspace_id: &str) -> String {
    self.revalidate_path.replace("{workspace_id}", workspace_id)
  }
}
