// Archivo: errors.rs
// Propósito: definir los errores del almacenamiento de workspaces y el alias
// Result<T> usado por las APIs del crate.
use thiserror::Error;
/// Errores comunes de la capa de almacenamiento.
///
/// - `NotFound`: workspace inexistente.
/// - `Conflict`: el workspace ya existe o la versión no coincide.
/// - `Storage`: error al acceder al almacenamiento externo.
/// - `Other`: cualquier otro error (auditoría, revalidación).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Workspace no encontrado.
    #[error("No encontrado: {0}")]
    NotFound(String),
    /// Conflicto de creación o de versión.
    #[error("Conflicto: {0}")]
    Conflict(String),
    /// Error genérico de almacenamiento (BD, pool, mutex).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
    /// Otro tipo de error.
    #[error("Otro: {0}")]
    Other(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Storage(format!("serialización: {}", e))
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, StoreError>;
