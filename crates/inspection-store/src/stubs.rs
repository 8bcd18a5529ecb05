// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un repositorio de workspaces en memoria, un sink de auditoría que
// acumula registros, un revalidador que anota rutas y un sink que solo emite
// eventos `tracing`. No son durables y se usan para demos o pruebas locales.
use crate::domain::{ActivityRecord, ModuleSnapshot, ModuleStates, PersistResult, WorkspaceMeta};
use crate::errors::{Result, StoreError};
use crate::repository::{AuditSink, RevalidationHook, WorkspaceRepository};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Fila de workspace en memoria.
#[derive(Debug, Clone)]
struct WorkspaceRow {
    version: i64,
    modules: ModuleStates,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    updated_by: Option<String>,
}

impl WorkspaceRow {
    fn meta(&self, id: &str) -> WorkspaceMeta {
        WorkspaceMeta { id: id.to_string(),
                        version: self.version,
                        modules: self.modules.keys().cloned().collect(),
                        created_at: self.created_at,
                        updated_at: self.updated_at,
                        updated_by: self.updated_by.clone() }
    }
}

// Minimal in-memory repository for wiring examples (not durable)
pub struct InMemoryWorkspaceRepository {
    /// Workspaces indexados por id.
    workspaces: Mutex<BTreeMap<String, WorkspaceRow>>,
}

impl InMemoryWorkspaceRepository {
    /// Crea una nueva instancia del repositorio en memoria.
    pub fn new() -> Self {
        Self { workspaces: Mutex::new(BTreeMap::new()) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `StoreError::Storage`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> std::result::Result<MutexGuard<'a, T>, StoreError> {
        m.lock().map_err(|e| StoreError::Storage(format!("mutex poisoned: {:?}", e)))
    }
}

impl Default for InMemoryWorkspaceRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceRepository for InMemoryWorkspaceRepository {
    fn create_workspace(&self, workspace_id: &str) -> Result<WorkspaceMeta> {
        let mut workspaces = self.lock(&self.workspaces)?;
        if workspaces.contains_key(workspace_id) {
            return Err(StoreError::Conflict(format!("workspace {} ya existe", workspace_id)));
        }
        let row = WorkspaceRow { version: 0,
                                 modules: ModuleStates::new(),
                                 created_at: Utc::now(),
                                 updated_at: None,
                                 updated_by: None };
        let meta = row.meta(workspace_id);
        workspaces.insert(workspace_id.to_string(), row);
        Ok(meta)
    }

    fn workspace_exists(&self, workspace_id: &str) -> Result<bool> {
        Ok(self.lock(&self.workspaces)?.contains_key(workspace_id))
    }

    fn get_workspace_meta(&self, workspace_id: &str) -> Result<WorkspaceMeta> {
        let workspaces = self.lock(&self.workspaces)?;
        workspaces.get(workspace_id)
                  .map(|row| row.meta(workspace_id))
                  .ok_or_else(|| StoreError::NotFound(format!("workspace {}", workspace_id)))
    }

    fn load_module(&self, workspace_id: &str, module: &str) -> Result<ModuleSnapshot> {
        let workspaces = self.lock(&self.workspaces)?;
        let row = workspaces.get(workspace_id)
                            .ok_or_else(|| StoreError::NotFound(format!("workspace {}", workspace_id)))?;
        Ok(ModuleSnapshot { workspace_id: workspace_id.to_string(),
                            module: module.to_string(),
                            state: row.modules.get(module).cloned().unwrap_or(JsonValue::Null),
                            version: row.version,
                            updated_by: row.updated_by.clone(),
                            updated_at: row.updated_at })
    }

    /// Escribe el módulo aplicando control optimista cuando se pasa
    /// `expected_version`.
    fn save_module(&self,
                   workspace_id: &str,
                   module: &str,
                   state: &JsonValue,
                   updated_by: &str,
                   updated_at: DateTime<Utc>,
                   expected_version: Option<i64>)
                   -> Result<PersistResult> {
        let mut workspaces = self.lock(&self.workspaces)?;
        let row = workspaces.get_mut(workspace_id)
                            .ok_or_else(|| StoreError::NotFound(format!("workspace {}", workspace_id)))?;
        if let Some(expected) = expected_version {
            if row.version != expected {
                debug!(workspace_id, expected, current = row.version, "conflicto de versión en memoria");
                return Ok(PersistResult::Conflict);
            }
        }
        row.modules.insert(module.to_string(), state.clone());
        row.version = row.version.saturating_add(1);
        row.updated_at = Some(updated_at);
        row.updated_by = Some(updated_by.to_string());
        Ok(PersistResult::Ok { new_version: row.version })
    }

    fn list_workspaces(&self) -> Result<Vec<WorkspaceMeta>> {
        let workspaces = self.lock(&self.workspaces)?;
        Ok(workspaces.iter().map(|(id, row)| row.meta(id)).collect())
    }
}

/// Sink de auditoría en memoria. Con `set_failing(true)` cada llamada
/// devuelve error, útil para probar la política de fallos.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<ActivityRecord>>,
    failing: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Copia de los registros acumulados.
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn log_activity(&self, record: &ActivityRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Other("audit sink no disponible".into()));
        }
        self.records
            .lock()
            .map_err(|e| StoreError::Storage(format!("mutex poisoned: {:?}", e)))?
            .push(record.clone());
        Ok(())
    }
}

/// Sink que solo emite la actividad como evento `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_activity(&self, record: &ActivityRecord) -> Result<()> {
        info!(workspace_id = %record.workspace_id,
              activity = %record.activity_type,
              performed_by = %record.performed_by,
              module = %record.module,
              metadata = %record.metadata,
              "actividad registrada");
        Ok(())
    }
}

/// Revalidador en memoria: anota cada ruta recibida.
#[derive(Debug, Default)]
pub struct RecordingRevalidator {
    paths: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingRevalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RevalidationHook for RecordingRevalidator {
    fn revalidate(&self, path: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Other(format!("revalidación fallida para {}", path)));
        }
        self.paths
            .lock()
            .map_err(|e| StoreError::Storage(format!("mutex poisoned: {:?}", e)))?
            .push(path.to_string());
        Ok(())
    }
}

/// Revalidador que no hace nada más que registrar la ruta en `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRevalidator;

impl RevalidationHook for NoopRevalidator {
    fn revalidate(&self, path: &str) -> Result<()> {
        debug!(path, "revalidación omitida");
        Ok(())
    }
}
