// Archivo: repository.rs
// Propósito: definir el trait `WorkspaceRepository` y los colaboradores
// externos del servicio (`AuditSink`, `RevalidationHook`). Describe el
// contrato que deben implementar las persistencias (SQLite, Postgres,
// in-memory, etc.).
use crate::domain::{ActivityRecord, ModuleSnapshot, PersistResult, WorkspaceMeta};
use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// Contrato mínimo del almacenamiento de workspaces.
///
/// Cada workspace guarda un documento JSON por módulo y una única versión
/// compartida. El almacenamiento no ofrece transacciones entre lecturas y
/// escrituras; la versión es el único token de concurrencia.
pub trait WorkspaceRepository: Send + Sync {
    /// Crea un workspace vacío (versión 0). `Conflict` si ya existe.
    fn create_workspace(&self, workspace_id: &str) -> Result<WorkspaceMeta>;

    /// Verifica si existe un workspace con el id dado.
    fn workspace_exists(&self, workspace_id: &str) -> Result<bool>;

    /// Obtiene metadatos ligeros del workspace. `NotFound` si no existe.
    fn get_workspace_meta(&self, workspace_id: &str) -> Result<WorkspaceMeta>;

    /// Lee el estado crudo de `module`. `NotFound` si el workspace no
    /// existe; `state` es `Null` si el módulo aún no tiene estado.
    fn load_module(&self, workspace_id: &str, module: &str) -> Result<ModuleSnapshot>;

    /// Escribe el estado de `module` tal cual.
    ///
    /// Con `expected_version = Some(v)` la escritura solo se aplica si la
    /// versión actual es `v` (en otro caso `PersistResult::Conflict`); con
    /// `None` se escribe sin comparar (último en escribir gana).
    fn save_module(&self,
                   workspace_id: &str,
                   module: &str,
                   state: &JsonValue,
                   updated_by: &str,
                   updated_at: DateTime<Utc>,
                   expected_version: Option<i64>)
                   -> Result<PersistResult>;

    /// Lista los workspaces existentes ordenados por id.
    fn list_workspaces(&self) -> Result<Vec<WorkspaceMeta>>;
}

/// Registro de actividad. Se invoca de forma síncrona tras cada escritura
/// exitosa.
pub trait AuditSink: Send + Sync {
    fn log_activity(&self, record: &ActivityRecord) -> Result<()>;
}

/// Invalidación de caché/UI. Un fallo aquí no revierte la escritura.
pub trait RevalidationHook: Send + Sync {
    fn revalidate(&self, path: &str) -> Result<()>;
}
