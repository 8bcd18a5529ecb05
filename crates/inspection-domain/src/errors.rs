// errors.rs
use thiserror::Error;

/// Taxonomia de errores del motor de inspeccion.
///
/// Todos se producen de forma sincrona dentro de los mutadores puros, antes
/// de cualquier escritura.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InspectionError {
  /// Workspace o run inexistente.
  #[error("No encontrado: {0}")]
  NotFound(String),
  /// Payload mal formado, motivo vacio, cantidad fuera de rango, grupo
  /// incompatible.
  #[error("Error de validación: {0}")]
  Validation(String),
  /// Paso fuera de secuencia o mutacion sobre un run terminal.
  #[error("Transición ilegal: {0}")]
  IllegalTransition(String),
  #[error("Error de serialización: {0}")]
  Serialization(String),
}

impl InspectionError {
  /// Nombre estable del tipo de error, usado por `ActionResult`.
  pub fn kind(&self) -> &'static str {
    match self {
      InspectionError::NotFound(_) => "not_found",
      InspectionError::Validation(_) => "validation_error",
      InspectionError::IllegalTransition(_) => "illegal_transition",
      InspectionError::Serialization(_) => "serialization_error",
    }
  }
}

impl From<serde_json::Error> for InspectionError {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, InspectionError>;
