use inspection_domain::InspectionError;
use inspection_store::StoreError;
use thiserror::Error;

// Errores comunes del servicio de inspeccion.
//
// Agrupa los errores del dominio (rechazos de los mutadores puros), los de
// la capa de almacenamiento y los propios del ciclo lectura-modificacion-
// escritura (conflictos de version, auditoria, configuracion).
#[derive(Error, Debug)]
pub enum WorkflowError {
  /// Rechazos del motor: run inexistente, validacion, transicion ilegal.
  #[error("Error de inspección: {0}")]
  Inspection(#[from] InspectionError),

  /// Errores originados por el repositorio de workspaces.
  #[error("Error de almacenamiento: {0}")]
  Store(#[from] StoreError),

  /// Otro escritor modifico el workspace entre la lectura y la escritura.
  #[error("Conflicto de concurrencia: {0}")]
  Conflict(String),

  /// El sink de auditoria fallo despues de una escritura exitosa.
  #[error("Error de auditoría: {0}")]
  Audit(String),

  /// Errores de serializacion/deserializacion JSON.
  #[error("Error de serializacion: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Valor de configuracion invalido.
  #[error("Error de configuración: {0}")]
  Config(String),
}

impl WorkflowError {
  /// Nombre estable del tipo de error para respuestas `{success: false}`.
  pub fn kind(&self) -> &'static str {
    match self {
      WorkflowError::Inspection(e) => e.kind(),
      WorkflowError::Store(StoreError::NotFound(_)) => "not_found",
      WorkflowError::Store(_) => "storage_error",
      WorkflowError::Conflict(_) => "conflict",
      WorkflowError::Audit(_) => "audit_error",
      WorkflowError::Serialization(_) => "serialization_error",
      WorkflowError::Config(_) => "config_error",
    }
  }
}
